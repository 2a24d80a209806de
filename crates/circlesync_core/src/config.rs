//! Runtime configuration for a hierarchy context.

use crate::logging::default_log_level;
use crate::workflow::engine::DEFAULT_PLACEHOLDER_ID;
use serde::Deserialize;

const LOG_LEVEL_ENV: &str = "CIRCLESYNC_LOG_LEVEL";
const LOG_DIR_ENV: &str = "CIRCLESYNC_LOG_DIR";

/// Settings consumed by `HierarchyContext` and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub log_level: String,
    /// Absolute log directory; file logging stays off when `None`.
    pub log_dir: Option<String>,
    /// Created id reported when commit metadata carries none.
    pub placeholder_created_id: String,
    /// Max concurrent sibling fetches during a tree pull; `0` is unbounded.
    pub tree_fanout: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            placeholder_created_id: DEFAULT_PLACEHOLDER_ID.to_string(),
            tree_fanout: 0,
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by `CIRCLESYNC_LOG_LEVEL` and `CIRCLESYNC_LOG_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|value| !value.trim().is_empty()) {
            config.log_level = level.trim().to_string();
        }
        config.log_dir = lookup(LOG_DIR_ENV).filter(|value| !value.trim().is_empty());
        config
    }
}
