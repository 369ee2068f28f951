use crate::config::Config;
use crate::error::EngineError;
use crate::graph::SymbolGraph;
use crate::model::{Attributes, Confidence, Layer, RefKind, Reference, Symbol, SymbolKind};
use crate::source::GraphSource;
use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

mod migrations;
mod reasoning;

pub use migrations::SCHEMA_VERSION;
pub use reasoning::{
    DerivedRef, ServiceConnection, ServiceNode, ServiceTopology, StoredLineagePath,
};

/// Column list matching `symbol_from_row`.
pub(crate) const SYMBOL_COLUMNS: &str =
    "s.id, s.kind, s.name, s.qualified_name, s.file_path, s.line_start, s.line_end, s.label, s.attributes";

const REF_COLUMNS: &str = "r.source_id, r.target_id, r.kind, r.confidence, r.evidence";

/// Upper bound of ids bound into one `IN (...)` list.
const ID_CHUNK: usize = 500;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub symbols: usize,
    pub references: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub schema_version: Option<i64>,
    pub symbols: i64,
    pub references: i64,
    pub derived_refs: i64,
    pub lineage_paths: i64,
    pub service_nodes: i64,
    pub service_connections: i64,
    pub by_kind: BTreeMap<String, i64>,
    pub by_layer: BTreeMap<String, i64>,
    pub by_ref_kind: BTreeMap<String, i64>,
}

/// Single-writer, many-reader SQLite store for the symbol graph.
pub struct Db {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Db {
    /// Create the store (and its directory) if needed, then migrate.
    pub fn create(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create db directory {}", parent.display()))?;
            }
        }
        Self::connect(db_path)
    }

    /// Open an existing store. A missing file is the one hard failure: the index must be rebuilt.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.is_file() {
            return Err(EngineError::MissingStore {
                path: db_path.to_path_buf(),
            }
            .into());
        }
        Self::connect(db_path)
    }

    fn connect(db_path: &Path) -> Result<Self> {
        let config = Config::get();
        tracing::debug!(
            pool_size = config.pool_size,
            min_idle = config.pool_min_idle,
            "initializing connection pool"
        );

        // Open write connection first and run migrations
        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let max_size = config.pool_size.max(1);
        let read_pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.pool_min_idle.min(max_size)))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        tracing::info!(path = %db_path.display(), "symbol store opened");

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.write_conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Full rebuild: the store ends up holding exactly the graph's symbols and references.
    pub fn replace_graph(&self, graph: &SymbolGraph) -> Result<WriteStats> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            DELETE FROM refs;
            DELETE FROM symbols_fts;
            DELETE FROM symbols;
            ",
        )?;
        let symbols = graph.symbols();
        let stats = WriteStats {
            symbols: insert_symbols(&tx, &symbols)?,
            references: insert_references(&tx, graph.references().iter())?,
        };
        tx.commit()?;
        tracing::info!(
            symbols = stats.symbols,
            references = stats.references,
            "graph rebuilt"
        );
        Ok(stats)
    }

    /// Incremental update: drop everything defined in `files` (and the references
    /// leaving those symbols), then write the graph's symbols for those files.
    pub fn replace_files(&self, files: &[String], graph: &SymbolGraph) -> Result<WriteStats> {
        let file_set: HashSet<&str> = files.iter().map(String::as_str).collect();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for file in files {
            tx.execute(
                "DELETE FROM refs WHERE source_id IN (SELECT id FROM symbols WHERE file_path = ?1)",
                params![file],
            )?;
            tx.execute(
                "DELETE FROM symbols_fts WHERE rowid IN (SELECT rowid FROM symbols WHERE file_path = ?1)",
                params![file],
            )?;
            tx.execute("DELETE FROM symbols WHERE file_path = ?1", params![file])?;
        }

        let symbols: Vec<&Symbol> = graph
            .symbols()
            .into_iter()
            .filter(|symbol| file_set.contains(symbol.file_path.as_str()))
            .collect();
        let references = graph.references().iter().filter(|reference| {
            graph
                .symbol(&reference.source_id)
                .is_some_and(|source| file_set.contains(source.file_path.as_str()))
        });
        let stats = WriteStats {
            symbols: insert_symbols(&tx, &symbols)?,
            references: insert_references(&tx, references)?,
        };
        tx.commit()?;
        tracing::info!(
            files = files.len(),
            symbols = stats.symbols,
            references = stats.references,
            "files reindexed"
        );
        Ok(stats)
    }

    /// Rematerialize the whole graph from the store.
    pub fn load_graph(&self) -> Result<SymbolGraph> {
        let conn = self.read_conn()?;
        let mut graph = SymbolGraph::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s ORDER BY s.id"
            ))?;
            let rows = stmt.query_map([], symbol_from_row)?;
            for row in rows {
                graph.add_symbol(row?);
            }
        }
        let mut stmt = conn.prepare(&format!("SELECT {REF_COLUMNS} FROM refs r ORDER BY r.id"))?;
        let rows = stmt.query_map([], reference_from_row)?;
        for row in rows {
            if let Some(reference) = row? {
                graph.add_reference(reference);
            }
        }
        Ok(graph)
    }

    pub fn get_symbol(&self, id: &str) -> Result<Option<Symbol>> {
        self.read_conn()?
            .query_row(
                &format!("SELECT {SYMBOL_COLUMNS} FROM symbols s WHERE s.id = ?1"),
                params![id],
                symbol_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Symbols for the given ids, ordered by id. Unknown ids are skipped.
    pub fn symbols_by_ids(&self, ids: &[String]) -> Result<Vec<Symbol>> {
        let mut unique: Vec<&String> = ids.iter().collect();
        unique.sort_unstable();
        unique.dedup();
        let conn = self.read_conn()?;
        let mut symbols = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s WHERE s.id IN ({}) ORDER BY s.id",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), symbol_from_row)?;
            for row in rows {
                symbols.push(row?);
            }
        }
        symbols.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(symbols)
    }

    pub fn references_from(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>> {
        self.references_where("r.source_id", &[id.to_string()], kinds)
    }

    pub fn references_to(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>> {
        self.references_where("r.target_id", &[id.to_string()], kinds)
    }

    /// Incoming references of every id in `ids` (one query per chunk, for level-by-level BFS).
    pub fn references_to_any(&self, ids: &[String]) -> Result<Vec<Reference>> {
        self.references_where("r.target_id", ids, None)
    }

    fn references_where(
        &self,
        column: &str,
        ids: &[String],
        kinds: Option<&[RefKind]>,
    ) -> Result<Vec<Reference>> {
        if ids.is_empty() || kinds.is_some_and(|k| k.is_empty()) {
            return Ok(Vec::new());
        }
        let conn = self.read_conn()?;
        let mut references = Vec::new();
        for chunk in ids.chunks(ID_CHUNK) {
            let mut sql = format!(
                "SELECT {REF_COLUMNS} FROM refs r WHERE {column} IN ({})",
                placeholders(chunk.len())
            );
            let mut values: Vec<SqlValue> =
                chunk.iter().map(|id| SqlValue::Text(id.clone())).collect();
            if let Some(kinds) = kinds {
                sql.push_str(&format!(" AND r.kind IN ({})", placeholders(kinds.len())));
                values.extend(kinds.iter().map(|k| SqlValue::Text(k.as_str().to_string())));
            }
            sql.push_str(" ORDER BY r.id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), reference_from_row)?;
            for row in rows {
                if let Some(reference) = row? {
                    references.push(reference);
                }
            }
        }
        Ok(references)
    }

    /// (file_path, layer, symbol count) rows, for category aggregation.
    pub fn file_layer_counts(&self) -> Result<Vec<(String, Layer, i64)>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, kind, COUNT(*) FROM symbols GROUP BY file_path, kind ORDER BY file_path",
        )?;
        let rows = stmt.query_map([], |row| {
            let file: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok((file, decode_kind(&kind).layer(), count))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// (source file, target file, count) for references whose two ends are stored symbols.
    pub fn reference_file_pairs(&self) -> Result<Vec<(String, String, i64)>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT src.file_path, tgt.file_path, COUNT(*)
             FROM refs r
             JOIN symbols src ON src.id = r.source_id
             JOIN symbols tgt ON tgt.id = r.target_id
             GROUP BY src.file_path, tgt.file_path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.read_conn()?;
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(Into::into)
        };
        let grouped = |sql: &str| -> Result<BTreeMap<String, i64>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut map = BTreeMap::new();
            for row in rows {
                let (key, value) = row?;
                map.insert(key, value);
            }
            Ok(map)
        };
        Ok(StoreStats {
            schema_version: migrations::schema_version(&conn)?,
            symbols: count("symbols")?,
            references: count("refs")?,
            derived_refs: count("derived_refs")?,
            lineage_paths: count("lineage_paths")?,
            service_nodes: count("service_nodes")?,
            service_connections: count("service_connections")?,
            by_kind: grouped("SELECT kind, COUNT(*) FROM symbols GROUP BY kind")?,
            by_layer: grouped("SELECT layer, COUNT(*) FROM symbols GROUP BY layer")?,
            by_ref_kind: grouped("SELECT kind, COUNT(*) FROM refs GROUP BY kind")?,
        })
    }
}

impl GraphSource for Db {
    fn symbol(&self, id: &str) -> Result<Option<Symbol>> {
        Ok(self.get_symbol(id)?.or_else(|| Symbol::synthetic(id)))
    }

    fn outgoing(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>> {
        self.references_from(id, kinds)
    }

    fn incoming(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>> {
        self.references_to(id, kinds)
    }
}

fn insert_symbols(tx: &Transaction<'_>, symbols: &[&Symbol]) -> Result<usize> {
    let mut drop_fts =
        tx.prepare("DELETE FROM symbols_fts WHERE rowid IN (SELECT rowid FROM symbols WHERE id = ?1)")?;
    let mut upsert = tx.prepare(
        "INSERT INTO symbols
         (id, kind, name, qualified_name, file_path, line_start, line_end, label, layer, attributes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            name = excluded.name,
            qualified_name = excluded.qualified_name,
            file_path = excluded.file_path,
            line_start = excluded.line_start,
            line_end = excluded.line_end,
            label = excluded.label,
            layer = excluded.layer,
            attributes = excluded.attributes",
    )?;
    let mut add_fts = tx.prepare(
        "INSERT INTO symbols_fts (rowid, id, name, qualified_name)
         SELECT rowid, id, name, qualified_name FROM symbols WHERE id = ?1",
    )?;
    for symbol in symbols {
        drop_fts.execute(params![symbol.id])?;
        upsert.execute(params![
            symbol.id,
            symbol.kind.as_str(),
            symbol.name,
            symbol.qualified_name,
            symbol.file_path,
            symbol.line_start,
            symbol.line_end,
            symbol.label,
            symbol.layer().as_str(),
            symbol.attributes.to_json_text(),
        ])?;
        add_fts.execute(params![symbol.id])?;
    }
    Ok(symbols.len())
}

fn insert_references<'a>(
    tx: &Transaction<'_>,
    references: impl Iterator<Item = &'a Reference>,
) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO refs (source_id, target_id, kind, confidence, evidence)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut inserted = 0;
    for reference in references {
        inserted += stmt.execute(params![
            reference.source_id,
            reference.target_id,
            reference.kind.as_str(),
            reference.confidence.as_str(),
            reference.evidence.to_json_text(),
        ])?;
    }
    Ok(inserted)
}

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn decode_kind(raw: &str) -> SymbolKind {
    SymbolKind::parse(raw).unwrap_or_else(|| {
        tracing::warn!(kind = raw, "unknown symbol kind in store, treating as unknown");
        SymbolKind::Unknown
    })
}

/// Corrupt maps degrade to empty so one bad row never blocks a query.
pub(crate) fn decode_attributes(raw: Option<String>, owner: &str) -> Attributes {
    match raw.as_deref() {
        None | Some("") => Attributes::new(),
        Some(text) => Attributes::parse_json_text(text).unwrap_or_else(|err| {
            tracing::warn!(owner, error = %err, "corrupt attribute map, using empty map");
            Attributes::new()
        }),
    }
}

pub(crate) fn decode_string_list(raw: Option<String>, owner: &str) -> Vec<String> {
    match raw.as_deref() {
        None | Some("") => Vec::new(),
        Some(text) => serde_json::from_str(text).unwrap_or_else(|err| {
            tracing::warn!(owner, error = %err, "corrupt list column, using empty list");
            Vec::new()
        }),
    }
}

pub(crate) fn decode_confidence(raw: &str) -> Option<Confidence> {
    let parsed = Confidence::parse(raw);
    if parsed.is_none() {
        tracing::warn!(confidence = raw, "unknown confidence tag in store");
    }
    parsed
}

pub(crate) fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let attributes = decode_attributes(row.get(8)?, &id);
    Ok(Symbol {
        kind: decode_kind(&kind),
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        file_path: row.get(4)?,
        line_start: row.get(5)?,
        line_end: row.get(6)?,
        label: row.get(7)?,
        attributes,
        id,
    })
}

/// `None` when the row carries a kind or confidence tag outside the closed vocabulary.
fn reference_from_row(row: &Row<'_>) -> rusqlite::Result<Option<Reference>> {
    let source_id: String = row.get(0)?;
    let target_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let confidence: String = row.get(3)?;
    let Some(kind) = RefKind::parse(&kind) else {
        tracing::warn!(
            source = %source_id,
            target = %target_id,
            kind = %kind,
            "skipping reference with unknown kind"
        );
        return Ok(None);
    };
    let Some(confidence) = decode_confidence(&confidence) else {
        return Ok(None);
    };
    let evidence = decode_attributes(row.get(4)?, &source_id);
    Ok(Some(Reference {
        source_id,
        target_id,
        kind,
        confidence,
        evidence,
    }))
}
