//! Runtime configuration, loaded from a JSON file and overridden by
//! environment variables at the `bx-cli` composition root.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Top-level configuration for one run of the batch executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration schema version, for forward compatibility.
    pub version: String,

    /// Number of sandboxes in the worktree pool (one worker per sandbox).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Path to the SQLite database file backing the session store.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Integration branch tasks are based on and merged back into.
    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    /// Upper bound on review rounds for a single task (§4.7). Never
    /// consulted by the primary execution claim, only by the review claim.
    #[serde(default = "default_max_review_rounds")]
    pub max_review_rounds: u32,

    /// Wall-clock budget for one task's agent invocation, in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// How long a worker waits for a free sandbox before giving up, in
    /// seconds.
    #[serde(default = "default_sandbox_acquire_timeout_secs")]
    pub sandbox_acquire_timeout_secs: u64,

    /// Name of the agent binary to invoke (resolved against `PATH`).
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,

    /// Skip pushing branches and opening change requests. Used for offline
    /// / local-only runs and integration tests.
    #[serde(default)]
    pub skip_external_side_effects: bool,
}

fn default_pool_size() -> usize {
    3
}
fn default_db_path() -> String {
    ".batchexec/state.db".to_string()
}
fn default_main_branch() -> String {
    "main".to_string()
}
fn default_max_review_rounds() -> u32 {
    3
}
fn default_task_timeout_secs() -> u64 {
    1800
}
fn default_sandbox_acquire_timeout_secs() -> u64 {
    300
}
fn default_agent_binary() -> String {
    "claude".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            pool_size: default_pool_size(),
            db_path: default_db_path(),
            main_branch: default_main_branch(),
            max_review_rounds: default_max_review_rounds(),
            task_timeout_secs: default_task_timeout_secs(),
            sandbox_acquire_timeout_secs: default_sandbox_acquire_timeout_secs(),
            agent_binary: default_agent_binary(),
            skip_external_side_effects: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read config: {e}")))?;
        serde_json::from_str(&content).map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))
    }

    /// Load configuration from a file if present, falling back to defaults
    /// overridden by environment variables otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment-variable overrides, matching §6's required
    /// variables: `BX_POOL_SIZE`, `BX_DB_PATH`, `BX_MAIN_BRANCH`,
    /// `BX_AGENT_BINARY`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BX_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.pool_size = n;
            }
        }
        if let Ok(v) = std::env::var("BX_DB_PATH") {
            self.db_path = v;
        }
        if let Ok(v) = std::env::var("BX_MAIN_BRANCH") {
            self.main_branch = v;
        }
        if let Ok(v) = std::env::var("BX_AGENT_BINARY") {
            self.agent_binary = v;
        }
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| CoreError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content).map_err(|e| CoreError::Config(format!("failed to write config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.max_review_rounds, 3);
        assert_eq!(config.main_branch, "main");
    }

    #[test]
    fn config_roundtrips_through_a_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.json");

        let config = Config::default();
        config.save(&path).expect("save");

        let loaded = Config::load(&path).expect("load");
        assert_eq!(config.pool_size, loaded.pool_size);
        assert_eq!(config.db_path, loaded.db_path);
    }

    #[test]
    fn env_override_wins_over_file_default() {
        std::env::set_var("BX_POOL_SIZE", "7");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.pool_size, 7);
        std::env::remove_var("BX_POOL_SIZE");
    }
}
