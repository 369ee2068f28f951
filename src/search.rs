//! Ranked symbol search over the store.
//!
//! Four tiers in strict priority: exact name (100), name prefix (75), full-text
//! match (50 + min(|rank|, 50)), qualified-name substring (50). A tier runs only
//! while the window `limit + offset` is unfilled, excludes ids matched by
//! earlier tiers, and asks for the whole window so offsets stay correct across
//! tier boundaries.

use crate::db::{Db, SYMBOL_COLUMNS, placeholders, symbol_from_row};
use crate::model::{Domain, Symbol, SymbolKind, SymbolSummary};
use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;

pub const EXACT_SCORE: f64 = 100.0;
pub const PREFIX_SCORE: f64 = 75.0;
pub const FULL_TEXT_BASE_SCORE: f64 = 50.0;
pub const FULL_TEXT_RANK_CAP: f64 = 50.0;
pub const SUBSTRING_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Exact,
    Prefix,
    FullText,
    QualifiedName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub symbol: SymbolSummary,
    pub score: f64,
    pub tier: Tier,
}

/// Search every symbol.
pub fn search_all(db: &Db, query: &str, limit: usize, offset: usize) -> Result<Vec<SearchHit>> {
    search(db, query, None, limit, offset)
}

/// Same tiering as [`search_all`], restricted to one domain.
pub fn search_domain(
    db: &Db,
    query: &str,
    domain: Domain,
    limit: usize,
    offset: usize,
) -> Result<Vec<SearchHit>> {
    search(db, query, Some(domain), limit, offset)
}

fn search(
    db: &Db,
    query: &str,
    domain: Option<Domain>,
    limit: usize,
    offset: usize,
) -> Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let window = limit.saturating_add(offset);
    let conn = db.read_conn()?;
    let mut hits: Vec<SearchHit> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for tier in [Tier::Exact, Tier::Prefix, Tier::FullText, Tier::QualifiedName] {
        if hits.len() >= window {
            break;
        }
        let rows = match run_tier(&conn, tier, query, domain, &seen, window) {
            Ok(rows) => rows,
            Err(err) if tier == Tier::FullText => {
                tracing::debug!(query, error = %err, "full-text tier failed, skipping");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        for (symbol, score) in rows {
            seen.push(symbol.id.clone());
            hits.push(SearchHit {
                symbol: symbol.into(),
                score,
                tier,
            });
        }
    }

    Ok(hits.into_iter().skip(offset).take(limit).collect())
}

fn run_tier(
    conn: &Connection,
    tier: Tier,
    query: &str,
    domain: Option<Domain>,
    seen: &[String],
    window: usize,
) -> Result<Vec<(Symbol, f64)>> {
    let mut values: Vec<SqlValue> = Vec::new();
    let (from, predicate, order, rank_column) = match tier {
        Tier::Exact => {
            values.push(SqlValue::Text(query.to_string()));
            ("symbols s", "s.name = ? COLLATE NOCASE", "s.id", "")
        }
        Tier::Prefix => {
            values.push(SqlValue::Text(format!("{}%", escape_like(query))));
            ("symbols s", "s.name LIKE ? ESCAPE '\\'", "s.name, s.id", "")
        }
        Tier::FullText => {
            values.push(SqlValue::Text(query.to_string()));
            (
                "symbols_fts JOIN symbols s ON s.rowid = symbols_fts.rowid",
                "symbols_fts MATCH ?",
                "symbols_fts.rank, s.id",
                ", symbols_fts.rank",
            )
        }
        Tier::QualifiedName => {
            values.push(SqlValue::Text(format!("%{}%", escape_like(query))));
            ("symbols s", "s.qualified_name LIKE ? ESCAPE '\\'", "s.id", "")
        }
    };

    let scope = domain.map(domain_clause).unwrap_or_default();
    values.extend(domain_values(domain));
    let exclusion = not_in_clause("s.id", seen.len());
    values.extend(seen.iter().map(|id| SqlValue::Text(id.clone())));
    values.push(SqlValue::Integer(window as i64));

    let sql = format!(
        "SELECT {SYMBOL_COLUMNS}{rank_column} FROM {from}
         WHERE {predicate}{scope}{exclusion}
         ORDER BY {order} LIMIT ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
        let symbol = symbol_from_row(row)?;
        let score = match tier {
            Tier::Exact => EXACT_SCORE,
            Tier::Prefix => PREFIX_SCORE,
            Tier::FullText => {
                let rank: f64 = row.get(9)?;
                FULL_TEXT_BASE_SCORE + rank.abs().min(FULL_TEXT_RANK_CAP)
            }
            Tier::QualifiedName => SUBSTRING_SCORE,
        };
        Ok((symbol, score))
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// ` AND column NOT IN (?, ...)` for `count` bound ids, or nothing at all when
/// `count` is zero. An empty `NOT IN ()` list must exclude nothing.
pub(crate) fn not_in_clause(column: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    format!(" AND {column} NOT IN ({})", placeholders(count))
}

fn domain_kinds(domain: Domain) -> Vec<SymbolKind> {
    SymbolKind::ALL
        .into_iter()
        .filter(|kind| kind.domain() == domain)
        .collect()
}

fn domain_clause(domain: Domain) -> String {
    format!(" AND s.kind IN ({})", placeholders(domain_kinds(domain).len()))
}

fn domain_values(domain: Option<Domain>) -> Vec<SqlValue> {
    domain
        .map(|domain| {
            domain_kinds(domain)
                .into_iter()
                .map(|kind| SqlValue::Text(kind.as_str().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
