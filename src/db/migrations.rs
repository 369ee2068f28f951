use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 2;

/// Idempotent: every statement only creates what is missing, so re-running is safe.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS symbols (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            line_start INTEGER NOT NULL,
            line_end INTEGER NOT NULL,
            label TEXT,
            layer TEXT NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_label ON symbols(label);

        CREATE TABLE IF NOT EXISTS refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            confidence TEXT NOT NULL,
            evidence TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_refs_source ON refs(source_id);
        CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(target_id);
        CREATE INDEX IF NOT EXISTS idx_refs_kind ON refs(kind);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_refs_triple ON refs(source_id, target_id, kind);

        CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
            id UNINDEXED,
            name,
            qualified_name
        );
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;
    let existing = existing.unwrap_or(0);

    // Reasoning extension tables, filled by downstream analyses rather than by
    // graph construction.
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS derived_refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            confidence TEXT NOT NULL,
            derivation_method TEXT NOT NULL,
            evidence TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_derived_refs_source ON derived_refs(source_id);
        CREATE INDEX IF NOT EXISTS idx_derived_refs_target ON derived_refs(target_id);

        CREATE TABLE IF NOT EXISTS lineage_paths (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            sink_id TEXT NOT NULL,
            path_nodes TEXT NOT NULL,
            path_length INTEGER NOT NULL,
            min_confidence TEXT NOT NULL,
            is_complete INTEGER NOT NULL,
            gaps TEXT NOT NULL DEFAULT '[]',
            computed_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_lineage_paths_source ON lineage_paths(source_id);
        CREATE INDEX IF NOT EXISTS idx_lineage_paths_sink ON lineage_paths(sink_id);

        CREATE TABLE IF NOT EXISTS service_nodes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            technology TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            inferred_from TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS service_connections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_service_id TEXT NOT NULL,
            target_service_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            protocol TEXT,
            evidence TEXT NOT NULL DEFAULT '{}',
            confidence TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_service_connections_source
            ON service_connections(source_service_id);
        CREATE INDEX IF NOT EXISTS idx_service_connections_target
            ON service_connections(target_service_id);
        COMMIT;
        ",
    )?;

    if existing < SCHEMA_VERSION {
        tracing::info!(from = existing, to = SCHEMA_VERSION, "schema migrated");
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map(|value| value.and_then(|v| v.parse().ok()))
    .map_err(Into::into)
}
