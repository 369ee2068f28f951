use anyhow::Result;
use clap::Parser;
use serde_json::json;
use symgraph::cli::{self, Command};
use symgraph::config::Config;
use symgraph::db::Db;
use symgraph::error::EngineError;
use symgraph::graph::Direction;
use symgraph::lineage::{Tracer, VisitMode};
use symgraph::model::{Domain, RefKind};
use symgraph::propagation::{ChangeKind, Planner};
use symgraph::query::QueryEngine;
use symgraph::{export, search};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("SYMGRAPH_LOG").unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err:#}");
        let code = if EngineError::is_missing_store(&err) { 2 } else { 1 };
        std::process::exit(code);
    }
}

fn run(args: cli::Args) -> Result<()> {
    let config = Config::get();
    let db_path = args.db;

    match args.command {
        Command::Init => {
            let db = Db::create(&db_path)?;
            print_json(&db.stats()?)
        }
        Command::Stats => {
            let db = Db::open(&db_path)?;
            print_json(&db.stats()?)
        }
        Command::Search {
            query,
            limit,
            offset,
            domain,
        } => {
            let db = Db::open(&db_path)?;
            let limit = limit.unwrap_or(config.search_limit);
            let hits = match domain.as_deref().map(parse_domain).transpose()? {
                Some(domain) => search::search_domain(&db, &query, domain, limit, offset)?,
                None => search::search_all(&db, &query, limit, offset)?,
            };
            print_json(&hits)
        }
        Command::Refs { id } => {
            let db = Db::open(&db_path)?;
            print_json(&QueryEngine::new(&db).find_references(&id)?)
        }
        Command::BlastRadius { id, max_depth } => {
            let db = Db::open(&db_path)?;
            let depth = max_depth.unwrap_or(config.max_depth);
            print_json(&QueryEngine::new(&db).blast_radius(&id, depth)?)
        }
        Command::Categories => {
            let db = Db::open(&db_path)?;
            print_json(&QueryEngine::new(&db).categories()?)
        }
        Command::Trace {
            id,
            direction,
            max_depth,
            kinds,
            per_path,
            save,
        } => {
            let db = Db::open(&db_path)?;
            let depth = max_depth.unwrap_or(config.max_depth);
            let kinds = parse_ref_kinds(&kinds)?;
            let kinds = (!kinds.is_empty()).then_some(kinds.as_slice());
            let mode = if per_path {
                VisitMode::PerPath
            } else {
                VisitMode::Global
            };
            let tracer = Tracer::new(&db).with_mode(mode);
            let mut paths = Vec::new();
            let direction = Direction::from(direction.as_str());
            if matches!(direction, Direction::Downstream | Direction::Both) {
                paths.extend(tracer.trace_downstream(&id, depth, kinds)?);
            }
            if matches!(direction, Direction::Upstream | Direction::Both) {
                paths.extend(tracer.trace_upstream(&id, depth, kinds)?);
            }
            if save {
                db.save_lineage_paths(&paths)?;
            }
            print_json(&paths)
        }
        Command::Plan {
            id,
            change,
            max_depth,
        } => {
            let change = ChangeKind::parse(&change).ok_or_else(|| EngineError::UnknownKind {
                category: "change",
                kind: change.clone(),
            })?;
            let db = Db::open(&db_path)?;
            let graph = db.load_graph()?;
            let depth = max_depth.unwrap_or(config.max_depth);
            let plan = Planner::new(&graph).plan(&id, change, depth);
            print_json(&plan)
        }
        Command::Export { output } => {
            let db = Db::open(&db_path)?;
            let exported = export::export_graph(&db.load_graph()?)?;
            match output {
                Some(path) => {
                    export::write_json(&exported, &path)?;
                    print_json(&exported.metadata)
                }
                None => print_json(&exported),
            }
        }
        Command::Import { input } => {
            let graph = export::import_graph(export::read_json(&input)?)?;
            let db = Db::create(&db_path)?;
            let written = db.replace_graph(&graph)?;
            print_json(&json!({
                "symbols": written.symbols,
                "references": written.references,
            }))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_domain(raw: &str) -> Result<Domain> {
    match raw.trim().to_lowercase().as_str() {
        "code" => Ok(Domain::Code),
        "docs" | "doc" | "documentation" => Ok(Domain::Docs),
        _ => Err(EngineError::UnknownKind {
            category: "domain",
            kind: raw.to_string(),
        }
        .into()),
    }
}

fn parse_ref_kinds(raw: &[String]) -> Result<Vec<RefKind>> {
    raw.iter()
        .filter(|kind| !kind.trim().is_empty())
        .map(|kind| {
            RefKind::parse(kind).ok_or_else(|| {
                anyhow::Error::from(EngineError::UnknownKind {
                    category: "reference",
                    kind: kind.clone(),
                })
            })
        })
        .collect()
}
