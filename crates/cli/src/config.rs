use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use runq_core::config::load_dotenv;
use runq_core::EngineConfig;

/// Return the default config file path: ~/.config/runq/config.toml
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("could not determine user config directory")?;
    Ok(config_dir.join("runq").join("config.toml"))
}

/// Resolve the engine config.
/// Priority: explicit path > default config file > RUNQ_* environment.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        return EngineConfig::load(path)
            .with_context(|| format!("failed to load config: {}", path.display()));
    }

    // A missing config dir (no HOME) is not fatal; fall through to the environment.
    if let Ok(default_path) = default_config_path() {
        if default_path.exists() {
            return EngineConfig::load(&default_path)
                .with_context(|| format!("failed to load config: {}", default_path.display()));
        }
        debug!(config_path = %default_path.display(), "Config file not found, using environment");
    }

    load_dotenv();
    EngineConfig::from_env().context("invalid RUNQ_* environment")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runq.toml");
        std::fs::write(&path, "polling_delay_ms = 250\ndefault_queue = \"multi\"\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.polling_delay_ms, 250);
        assert_eq!(config.default_queue, "multi");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn default_path_ends_in_runq_config() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("runq/config.toml"));
        }
    }
}
