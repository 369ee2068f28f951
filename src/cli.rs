use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = ".symgraph/symgraph.sqlite";

#[derive(Parser)]
#[command(
    name = "symgraph",
    version,
    about = "Symbol graph and code-intelligence engine",
    after_help = r#"Examples:
  symgraph import --input graph.json
  symgraph search Order --limit 10
  symgraph refs 'billing/models.py::billing.Order'
  symgraph blast-radius 'billing/models.py::billing.Order.total' --max-depth 3
  symgraph trace 'web/order_form.html::order_form.total' --direction downstream
  symgraph plan 'billing/models.py::billing.Order.total' --change rename-field
  symgraph categories

Logging goes to stderr; set SYMGRAPH_LOG (e.g. SYMGRAPH_LOG=debug) to change the level.
"#
)]
pub struct Args {
    /// Path of the symbol store.
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the store (or migrate an existing one) and print its stats.
    Init,
    /// Print symbol, reference and reasoning-table counts.
    Stats,
    /// Ranked symbol search.
    Search {
        query: String,
        /// Page size (defaults to SYMGRAPH_SEARCH_LIMIT).
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Restrict to one domain: code|docs.
        #[arg(long)]
        domain: Option<String>,
    },
    /// Outgoing and incoming references of a symbol.
    Refs { id: String },
    /// Dependents of a symbol grouped by depth.
    BlastRadius {
        id: String,
        /// Defaults to SYMGRAPH_MAX_DEPTH.
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Symbol counts per category and layer, plus cross-category coupling.
    Categories,
    /// Data-lineage paths from a source or to a sink.
    Trace {
        id: String,
        /// downstream|upstream|both.
        #[arg(long, default_value = "downstream")]
        direction: String,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Reference kinds to follow (comma separated); defaults to the flow kinds.
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<String>,
        /// Enumerate alternate paths through already visited nodes.
        #[arg(long)]
        per_path: bool,
        /// Persist the traced paths in the lineage_paths table.
        #[arg(long)]
        save: bool,
    },
    /// Impact plan and risk classification for a proposed change.
    Plan {
        id: String,
        /// add-field|rename-field|remove-field|modify.
        #[arg(long)]
        change: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Export the stored graph as JSON.
    Export {
        /// Write to a file instead of stdout.
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace the stored graph with an exported JSON document.
    Import {
        #[arg(long, value_name = "PATH")]
        input: PathBuf,
    },
}
