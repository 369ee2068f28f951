// Configuration module for symgraph
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Read connection pool size (SYMGRAPH_POOL_SIZE)
    pub pool_size: u32,

    /// Read connection pool minimum idle connections (SYMGRAPH_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Default traversal depth for blast radius, tracing and planning (SYMGRAPH_MAX_DEPTH)
    pub max_depth: usize,

    /// Default page size for search (SYMGRAPH_SEARCH_LIMIT)
    pub search_limit: usize,

    /// Minimum cross-category reference count reported as coupling (SYMGRAPH_COUPLING_THRESHOLD)
    pub coupling_threshold: usize,

    /// Number of leading path components that form a category (SYMGRAPH_CATEGORY_DEPTH)
    pub category_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 8,
            pool_min_idle: 1,
            max_depth: 5,
            search_limit: 20,
            coupling_threshold: 3,
            category_depth: 1,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        override_from(&lookup, "SYMGRAPH_POOL_SIZE", &mut config.pool_size);
        override_from(&lookup, "SYMGRAPH_POOL_MIN_IDLE", &mut config.pool_min_idle);
        override_from(&lookup, "SYMGRAPH_MAX_DEPTH", &mut config.max_depth);
        override_from(&lookup, "SYMGRAPH_SEARCH_LIMIT", &mut config.search_limit);
        override_from(
            &lookup,
            "SYMGRAPH_COUPLING_THRESHOLD",
            &mut config.coupling_threshold,
        );
        override_from(&lookup, "SYMGRAPH_CATEGORY_DEPTH", &mut config.category_depth);
        if config.category_depth == 0 {
            config.category_depth = 1;
        }
        if config.pool_size == 0 {
            tracing::warn!("SYMGRAPH_POOL_SIZE must be at least 1, using 1");
            config.pool_size = 1;
        }
        if config.pool_min_idle > config.pool_size {
            tracing::warn!(
                "SYMGRAPH_POOL_MIN_IDLE {} exceeds pool size {}, clamping",
                config.pool_min_idle,
                config.pool_size
            );
            config.pool_min_idle = config.pool_size;
        }
        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn override_from<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    let Some(val) = lookup(key) else {
        return;
    };
    match val.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(
            "invalid {} value: {}, using default: {}",
            key,
            val,
            slot
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.search_limit, 20);
        assert_eq!(config.coupling_threshold, 3);
        assert_eq!(config.category_depth, 1);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let vars: HashMap<&str, &str> = [
            ("SYMGRAPH_MAX_DEPTH", "7"),
            ("SYMGRAPH_SEARCH_LIMIT", "lots"),
            ("SYMGRAPH_CATEGORY_DEPTH", "0"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_depth, 7);
        assert_eq!(config.search_limit, 20);
        assert_eq!(config.category_depth, 1);
    }

    #[test]
    fn min_idle_never_exceeds_pool_size() {
        let vars: HashMap<&str, &str> = [("SYMGRAPH_POOL_MIN_IDLE", "9")].into_iter().collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.pool_min_idle, 8);

        let vars: HashMap<&str, &str> = [("SYMGRAPH_POOL_SIZE", "0"), ("SYMGRAPH_POOL_MIN_IDLE", "4")]
            .into_iter()
            .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.pool_min_idle, 1);
    }
}
