use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration, read from `livediff.toml` in the platform config
/// directory. Every field has a default so the file is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Row count past which newly discovered directories start closed.
    #[serde(default = "default_preopen_threshold")]
    pub preopen_threshold: usize,
    /// Flush tick period.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preopen_threshold: default_preopen_threshold(),
            tick_interval_ms: default_tick_interval_ms(),
            git_binary: default_git_binary(),
        }
    }
}

fn default_preopen_threshold() -> usize {
    100
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_git_binary() -> String {
    "git".to_string()
}

pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "livediff", "livediff")
        .map(|dirs| dirs.config_dir().join("livediff.toml"))
}

pub fn load_config() -> Result<Config> {
    match config_file_path() {
        Some(path) => load_from(&path),
        None => Ok(Config::default()),
    }
}

/// Read a config file, falling back to defaults when it does not exist.
pub fn load_from(path: &std::path::Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config: {}", path.display()))?;
    let config =
        toml::from_str(&raw).with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: Config = toml::from_str("tick_interval_ms = 50").unwrap();
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.preopen_threshold, 100);
        assert_eq!(config.git_binary, "git");
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.preopen_threshold, Config::default().preopen_threshold);
    }

    #[test]
    fn load_from_reads_file_or_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livediff.toml");

        let config = load_from(&path).unwrap();
        assert_eq!(config.git_binary, "git");

        std::fs::write(&path, "git_binary = \"/usr/local/bin/git\"\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.git_binary, "/usr/local/bin/git");
        assert_eq!(config.tick_interval_ms, 100);

        std::fs::write(&path, "not toml [").unwrap();
        assert!(load_from(&path).is_err());
    }
}
