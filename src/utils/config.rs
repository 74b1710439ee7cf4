use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::EngineSettings;
use crate::runner::executor::RunnerSettings;
use crate::vcs::RepositorySettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingSettings {
    #[serde(flatten)]
    pub runner: RunnerSettings,
    /// SQLite URL for persisted scenarios and results; in-memory when absent
    #[serde(alias = "databaseUrl")]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Breakpoints and watches survive restarts when set
    #[serde(alias = "stateFile")]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9444,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSettings,
    pub repository: RepositorySettings,
    pub testing: TestingSettings,
    pub debug: DebugSettings,
    pub server: ServerSettings,
}

impl Config {
    /// `<config_dir>/flowlab/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flowlab").join("config.yaml"))
    }

    /// Defaults, then the config file, then environment overrides. An
    /// explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FLOWLAB_ENGINE_URL") {
            self.engine.endpoint = url;
        }
        if let Some(key) = lookup("FLOWLAB_ENGINE_API_KEY") {
            self.engine.api_key = Some(key);
        }
        if let Some(root) = lookup("FLOWLAB_REPO_ROOT") {
            self.repository.root = PathBuf::from(root);
        }
        if let Some(url) = lookup("FLOWLAB_DATABASE_URL") {
            self.testing.database_url = Some(url);
        }
        if let Some(port) = lookup("FLOWLAB_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "FLOWLAB_PORT",
                value: port,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.testing.runner.default_timeout_ms, 30_000);
        assert_eq!(config.testing.runner.max_timeout_ms, 300_000);
        assert_eq!(config.testing.runner.retry_delay_ms, 1_000);
        assert_eq!(config.server.port, 9444);
        assert_eq!(config.repository.workflows_dir, "workflows");
        assert!(config.testing.database_url.is_none());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
engine:
  endpoint: http://n8n.internal:5678
  api_key: from-file
repository:
  root: /srv/workflows
  workflows_dir: flows
testing:
  default_timeout_ms: 5000
debug:
  state_file: /tmp/flowlab-debug.json
"#,
        )
        .unwrap();

        let mut config = Config::from_file(&path).unwrap();
        assert_eq!(config.engine.endpoint, "http://n8n.internal:5678");
        assert_eq!(config.engine.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.repository.workflows_dir, "flows");
        assert_eq!(config.testing.runner.default_timeout_ms, 5000);
        assert_eq!(config.testing.runner.max_timeout_ms, 300_000);
        assert!(config.debug.state_file.is_some());

        let env: HashMap<&str, &str> = [
            ("FLOWLAB_ENGINE_API_KEY", "from-env"),
            ("FLOWLAB_PORT", "8080"),
            ("FLOWLAB_DATABASE_URL", "sqlite://flowlab.db"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.engine.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.testing.database_url.as_deref(), Some("sqlite://flowlab.db"));
        assert_eq!(config.repository.root, PathBuf::from("/srv/workflows"));
    }

    #[test]
    fn test_bad_port_and_missing_file() {
        let mut config = Config::default();
        let err = config
            .apply_env(|var| (var == "FLOWLAB_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "FLOWLAB_PORT", .. }));

        let missing = Config::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
