//! Reasoning extension tables: derived references, precomputed lineage paths
//! and the inferred service topology. These are written by downstream
//! analyses, never by graph construction.

use super::{Db, decode_attributes, decode_confidence, decode_string_list, now_secs};
use crate::lineage::LineagePath;
use crate::model::{Attributes, Confidence, RefKind};
use anyhow::Result;
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

/// A relationship computed by an analysis rather than extracted from source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRef {
    pub source_id: String,
    pub target_id: String,
    pub kind: RefKind,
    pub confidence: Confidence,
    pub derivation_method: String,
    #[serde(default)]
    pub evidence: Attributes,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredLineagePath {
    pub id: String,
    pub source_id: String,
    pub sink_id: String,
    pub path_nodes: Vec<String>,
    pub path_length: i64,
    pub min_confidence: Confidence,
    pub is_complete: bool,
    pub gaps: Vec<String>,
    pub computed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNode {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub technology: Option<String>,
    #[serde(default)]
    pub metadata: Attributes,
    pub inferred_from: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConnection {
    pub source_service_id: String,
    pub target_service_id: String,
    pub kind: String,
    pub protocol: Option<String>,
    #[serde(default)]
    pub evidence: Attributes,
    pub confidence: Confidence,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceTopology {
    pub nodes: Vec<ServiceNode>,
    pub connections: Vec<ServiceConnection>,
}

impl Db {
    pub fn insert_derived_refs(&self, refs: &[DerivedRef]) -> Result<usize> {
        let created_at = now_secs();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO derived_refs
                 (source_id, target_id, kind, confidence, derivation_method, evidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for derived in refs {
                let stamp = if derived.created_at > 0 {
                    derived.created_at
                } else {
                    created_at
                };
                stmt.execute(params![
                    derived.source_id,
                    derived.target_id,
                    derived.kind.as_str(),
                    derived.confidence.as_str(),
                    derived.derivation_method,
                    derived.evidence.to_json_text(),
                    stamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(refs.len())
    }

    pub fn derived_refs_from(&self, source_id: &str) -> Result<Vec<DerivedRef>> {
        self.derived_refs_where("source_id", source_id)
    }

    pub fn derived_refs_to(&self, target_id: &str) -> Result<Vec<DerivedRef>> {
        self.derived_refs_where("target_id", target_id)
    }

    fn derived_refs_where(&self, column: &str, id: &str) -> Result<Vec<DerivedRef>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT source_id, target_id, kind, confidence, derivation_method, evidence, created_at
             FROM derived_refs WHERE {column} = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![id], derived_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            if let Some(derived) = row? {
                result.push(derived);
            }
        }
        Ok(result)
    }

    /// Persist traced paths; re-saving the same node sequence replaces the earlier row.
    pub fn save_lineage_paths(&self, paths: &[LineagePath]) -> Result<usize> {
        let computed_at = now_secs();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO lineage_paths
                 (id, source_id, sink_id, path_nodes, path_length, min_confidence, is_complete, gaps, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    min_confidence = excluded.min_confidence,
                    is_complete = excluded.is_complete,
                    gaps = excluded.gaps,
                    computed_at = excluded.computed_at",
            )?;
            for path in paths {
                let nodes = path.node_ids();
                let (Some(source), Some(sink)) = (nodes.first(), nodes.last()) else {
                    continue;
                };
                stmt.execute(params![
                    path.fingerprint(),
                    source,
                    sink,
                    serde_json::to_string(&nodes)?,
                    nodes.len() as i64,
                    path.confidence.as_str(),
                    path.complete,
                    serde_json::to_string(&path.gaps)?,
                    computed_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(paths.len())
    }

    pub fn lineage_paths_from(&self, source_id: &str) -> Result<Vec<StoredLineagePath>> {
        self.lineage_paths_where("source_id", source_id)
    }

    pub fn lineage_paths_to(&self, sink_id: &str) -> Result<Vec<StoredLineagePath>> {
        self.lineage_paths_where("sink_id", sink_id)
    }

    fn lineage_paths_where(&self, column: &str, id: &str) -> Result<Vec<StoredLineagePath>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, source_id, sink_id, path_nodes, path_length, min_confidence, is_complete, gaps, computed_at
             FROM lineage_paths WHERE {column} = ?1 ORDER BY path_length, id"
        ))?;
        let rows = stmt.query_map(params![id], |row| {
            let id: String = row.get(0)?;
            let confidence: String = row.get(5)?;
            Ok(StoredLineagePath {
                source_id: row.get(1)?,
                sink_id: row.get(2)?,
                path_nodes: decode_string_list(row.get(3)?, &id),
                path_length: row.get(4)?,
                min_confidence: decode_confidence(&confidence).unwrap_or(Confidence::Inferred),
                is_complete: row.get(6)?,
                gaps: decode_string_list(row.get(7)?, &id),
                computed_at: row.get(8)?,
                id,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn upsert_service_node(&self, node: &ServiceNode) -> Result<()> {
        let created_at = if node.created_at > 0 {
            node.created_at
        } else {
            now_secs()
        };
        self.conn().execute(
            "INSERT INTO service_nodes (id, name, kind, technology, metadata, inferred_from, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                technology = excluded.technology,
                metadata = excluded.metadata,
                inferred_from = excluded.inferred_from",
            params![
                node.id,
                node.name,
                node.kind,
                node.technology,
                node.metadata.to_json_text(),
                node.inferred_from,
                created_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_service_connection(&self, connection: &ServiceConnection) -> Result<()> {
        let created_at = if connection.created_at > 0 {
            connection.created_at
        } else {
            now_secs()
        };
        self.conn().execute(
            "INSERT INTO service_connections
             (source_service_id, target_service_id, kind, protocol, evidence, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                connection.source_service_id,
                connection.target_service_id,
                connection.kind,
                connection.protocol,
                connection.evidence.to_json_text(),
                connection.confidence.as_str(),
                created_at,
            ],
        )?;
        Ok(())
    }

    pub fn service_topology(&self) -> Result<ServiceTopology> {
        let conn = self.read_conn()?;
        let mut topology = ServiceTopology::default();
        {
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, technology, metadata, inferred_from, created_at
                 FROM service_nodes ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                Ok(ServiceNode {
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    technology: row.get(3)?,
                    metadata: decode_attributes(row.get(4)?, &id),
                    inferred_from: row.get(5)?,
                    created_at: row.get(6)?,
                    id,
                })
            })?;
            for row in rows {
                topology.nodes.push(row?);
            }
        }
        let mut stmt = conn.prepare(
            "SELECT source_service_id, target_service_id, kind, protocol, evidence, confidence, created_at
             FROM service_connections ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let source: String = row.get(0)?;
            let confidence: String = row.get(5)?;
            Ok(ServiceConnection {
                target_service_id: row.get(1)?,
                kind: row.get(2)?,
                protocol: row.get(3)?,
                evidence: decode_attributes(row.get(4)?, &source),
                confidence: decode_confidence(&confidence).unwrap_or(Confidence::Inferred),
                created_at: row.get(6)?,
                source_service_id: source,
            })
        })?;
        for row in rows {
            topology.connections.push(row?);
        }
        Ok(topology)
    }
}

fn derived_from_row(row: &Row<'_>) -> rusqlite::Result<Option<DerivedRef>> {
    let source_id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let confidence: String = row.get(3)?;
    let (Some(kind), Some(confidence)) = (RefKind::parse(&kind), decode_confidence(&confidence))
    else {
        tracing::warn!(source = %source_id, "skipping derived reference with unknown tags");
        return Ok(None);
    };
    Ok(Some(DerivedRef {
        target_id: row.get(1)?,
        kind,
        confidence,
        derivation_method: row.get(4)?,
        evidence: decode_attributes(row.get(5)?, &source_id),
        created_at: row.get(6)?,
        source_id,
    }))
}
