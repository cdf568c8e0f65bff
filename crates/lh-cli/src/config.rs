//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use lh_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Application configuration.
///
/// Engine tunables sit at the top level next to the CLI settings, so
/// `LH_MIN_PLAY_MS=10000` and `min_play_ms = 10000` both work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rows shown per section in text output.
    pub top_n: usize,

    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_n: 10,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (LH_*)
        figment = figment.merge(Env::prefixed("LH_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for lh.
///
/// On Linux: `~/.config/lh`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lh"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dirs_config_path_ends_with_lh() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "lh");
    }

    #[test]
    fn test_default_config_uses_engine_defaults() {
        let config = Config::default();
        assert_eq!(config.top_n, 10);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lh.toml");
        std::fs::write(
            &path,
            r#"
top_n = 3
min_play_ms = 5000
obsession_window_days = 14

[[overrides]]
title = "song a"
artist = "artist x"
key = "song a|artist x"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.top_n, 3);
        assert_eq!(config.engine.min_play_ms, 5000);
        assert_eq!(config.engine.obsession_window_days, 14);
        assert_eq!(config.engine.full_play_ms, 180_000);
        assert_eq!(config.engine.overrides.len(), 1);
        assert_eq!(config.engine.overrides[0].key, "song a|artist x");
    }
}
