pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod graph;
pub mod lineage;
pub mod model;
pub mod propagation;
pub mod query;
pub mod registry;
pub mod search;
pub mod source;
