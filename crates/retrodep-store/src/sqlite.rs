//! SQLite-backed production store.
//!
//! The preprocessing pipeline materializes five tables:
//!
//! - `nodes(node_id, name_id, py_mask, first_upload)`
//! - `names(name_id, name)` for diagnostics
//! - `node_deps(node_id, deps)` with `deps` a JSON array of name ids
//! - `edge_headers(src_id, dep_name_id, mi, ma, n, total)` with the three
//!   per-chunk arrays stored as JSON
//! - `edge_chunks(src_id, dep_name_id, chunk, dst_ids)` with `dst_ids` a
//!   JSON array of node ids in ascending first-upload order
//!
//! `rusqlite::Connection` is not `Sync`, so the handle lives behind a
//! mutex; chunk fetches are single short point queries and never hold the
//! lock across other work.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use retrodep_error::{Result, RetroError};
use retrodep_types::{DepsRow, Epoch, HeaderRow, InterpreterMask, NameId, NodeId, NodeRow};

use crate::GraphStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an existing graph database read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path.as_ref(), flags).map_err(RetroError::store)?;
        debug!(path = %path.as_ref().display(), "opened graph database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a fresh database at `path` with the graph schema applied.
    ///
    /// This is the preprocessing pipeline's output stage; the production
    /// reader uses [`SqliteStore::open`].
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(RetroError::store)?;
        conn.execute_batch(SCHEMA).map_err(RetroError::store)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a fresh in-memory database with the graph schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(RetroError::store)?;
        conn.execute_batch(SCHEMA).map_err(RetroError::store)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert one node row (in-memory / pipeline use).
    pub fn insert_node(&self, row: &NodeRow) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO nodes (node_id, name_id, py_mask, first_upload) VALUES (?1, ?2, ?3, ?4)",
                (
                    row.node.get(),
                    row.name.get(),
                    row.py_mask.bits(),
                    row.first_upload.get(),
                ),
            )
            .map_err(RetroError::store)?;
        Ok(())
    }

    /// Insert one package-name row (in-memory / pipeline use).
    pub fn insert_name(&self, name: NameId, text: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO names (name_id, name) VALUES (?1, ?2)",
                (name.get(), text),
            )
            .map_err(RetroError::store)?;
        Ok(())
    }

    /// Insert one direct-dependency row (in-memory / pipeline use).
    pub fn insert_deps(&self, row: &DepsRow) -> Result<()> {
        let deps = serde_json::to_string(&row.deps)
            .map_err(|err| RetroError::internal(format!("deps encode: {err}")))?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO node_deps (node_id, deps) VALUES (?1, ?2)",
                (row.node.get(), deps),
            )
            .map_err(RetroError::store)?;
        Ok(())
    }

    /// Insert one edge-group header row (in-memory / pipeline use).
    pub fn insert_header(&self, row: &HeaderRow) -> Result<()> {
        let mi = serde_json::to_string(&row.mi)
            .map_err(|err| RetroError::internal(format!("header encode: {err}")))?;
        let ma = serde_json::to_string(&row.ma)
            .map_err(|err| RetroError::internal(format!("header encode: {err}")))?;
        let n = serde_json::to_string(&row.n)
            .map_err(|err| RetroError::internal(format!("header encode: {err}")))?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO edge_headers (src_id, dep_name_id, mi, ma, n, total) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (row.src.get(), row.dep.get(), mi, ma, n, row.total),
            )
            .map_err(RetroError::store)?;
        Ok(())
    }

    /// Insert one chunk body (in-memory / pipeline use).
    pub fn insert_chunk(
        &self,
        src: NodeId,
        dep: NameId,
        chunk: usize,
        dst_ids: &[NodeId],
    ) -> Result<()> {
        let body = serde_json::to_string(dst_ids)
            .map_err(|err| RetroError::internal(format!("chunk encode: {err}")))?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO edge_chunks (src_id, dep_name_id, chunk, dst_ids) \
                 VALUES (?1, ?2, ?3, ?4)",
                (src.get(), dep.get(), chunk as u32, body),
            )
            .map_err(RetroError::store)?;
        Ok(())
    }
}

const SCHEMA: &str = "
CREATE TABLE nodes (
    node_id      INTEGER PRIMARY KEY,
    name_id      INTEGER NOT NULL,
    py_mask      INTEGER NOT NULL,
    first_upload INTEGER NOT NULL
);
CREATE TABLE names (
    name_id INTEGER PRIMARY KEY,
    name    TEXT NOT NULL
);
CREATE TABLE node_deps (
    node_id INTEGER PRIMARY KEY,
    deps    TEXT NOT NULL
);
CREATE TABLE edge_headers (
    src_id      INTEGER NOT NULL,
    dep_name_id INTEGER NOT NULL,
    mi          TEXT NOT NULL,
    ma          TEXT NOT NULL,
    n           TEXT NOT NULL,
    total       INTEGER NOT NULL,
    PRIMARY KEY (src_id, dep_name_id)
);
CREATE TABLE edge_chunks (
    src_id      INTEGER NOT NULL,
    dep_name_id INTEGER NOT NULL,
    chunk       INTEGER NOT NULL,
    dst_ids     TEXT NOT NULL,
    PRIMARY KEY (src_id, dep_name_id, chunk)
);
";

fn decode_ids(json: &str, what: &str) -> Result<Vec<u32>> {
    serde_json::from_str(json)
        .map_err(|err| RetroError::corrupt(format!("{what} is not a JSON id array: {err}")))
}

fn decode_epochs(json: &str, what: &str) -> Result<Vec<Epoch>> {
    let raw: Vec<i64> = serde_json::from_str(json)
        .map_err(|err| RetroError::corrupt(format!("{what} is not a JSON epoch array: {err}")))?;
    Ok(raw.into_iter().map(Epoch::new).collect())
}

impl GraphStore for SqliteStore {
    fn load_nodes(&self) -> Result<Vec<NodeRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT node_id, name_id, py_mask, first_upload FROM nodes")
            .map_err(RetroError::store)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NodeRow {
                    node: NodeId::new(row.get(0)?),
                    name: NameId::new(row.get(1)?),
                    py_mask: InterpreterMask::from_bits(row.get(2)?),
                    first_upload: Epoch::new(row.get(3)?),
                })
            })
            .map_err(RetroError::store)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RetroError::store)?;
        Ok(rows)
    }

    fn load_names(&self) -> Result<Vec<(NameId, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name_id, name FROM names")
            .map_err(RetroError::store)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((NameId::new(row.get(0)?), row.get::<_, String>(1)?))
            })
            .map_err(RetroError::store)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RetroError::store)?;
        Ok(rows)
    }

    fn load_deps(&self) -> Result<Vec<DepsRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT node_id, deps FROM node_deps")
            .map_err(RetroError::store)?;
        let raw = stmt
            .query_map([], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(RetroError::store)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RetroError::store)?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(|(node, deps)| {
                let deps = decode_ids(&deps, "node_deps.deps")?
                    .into_iter()
                    .map(NameId::new)
                    .collect();
                Ok(DepsRow {
                    node: NodeId::new(node),
                    deps,
                })
            })
            .collect()
    }

    fn load_headers(&self) -> Result<Vec<HeaderRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT src_id, dep_name_id, mi, ma, n, total FROM edge_headers")
            .map_err(RetroError::store)?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u64>(5)?,
                ))
            })
            .map_err(RetroError::store)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RetroError::store)?;
        drop(stmt);
        drop(conn);

        raw.into_iter()
            .map(|(src, dep, mi, ma, n, total)| {
                Ok(HeaderRow {
                    src: NodeId::new(src),
                    dep: NameId::new(dep),
                    mi: decode_epochs(&mi, "edge_headers.mi")?,
                    ma: decode_epochs(&ma, "edge_headers.ma")?,
                    n: decode_ids(&n, "edge_headers.n")?,
                    total,
                })
            })
            .collect()
    }

    fn fetch_chunk(&self, src: NodeId, dep: NameId, chunk: usize) -> Result<Option<Vec<NodeId>>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT dst_ids FROM edge_chunks \
                 WHERE src_id = ?1 AND dep_name_id = ?2 AND chunk = ?3",
                (src.get(), dep.get(), chunk as u32),
                |row| row.get(0),
            )
            .optional()
            .map_err(RetroError::store)?;
        drop(conn);

        body.map(|json| {
            Ok(decode_ids(&json, "edge_chunks.dst_ids")?
                .into_iter()
                .map(NodeId::new)
                .collect())
        })
        .transpose()
    }
}
