use serde::Deserialize;

use crate::infrastructure::workflow::{RunnerConfig, DEFAULT_MAX_TURNS_PER_STEP};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    pub runner: ExecutionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Where step turns are sent
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Turns a single step may take before it fails
    pub max_turns_per_step: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/v1/step-turn".to_string(),
            api_key: None,
            timeout_ms: 120_000,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_turns_per_step: DEFAULT_MAX_TURNS_PER_STEP,
        }
    }
}

impl ExecutionConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_turns_per_step: self.max_turns_per_step,
        }
    }
}

impl AppConfig {
    /// Load from `config/default`, `config/local` and `APP__*` variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn from_json(json: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(matches!(config.logging.format, LogFormat::Pretty));
        assert!(config.backend.api_key.is_none());
        assert_eq!(config.runner.max_turns_per_step, 25);
    }

    #[test]
    fn test_partial_sections_fill_from_defaults() {
        let config = from_json(
            r#"{
                "logging": { "format": "json" },
                "backend": { "url": "http://backend:9000/turn", "api_key": "sk-test" }
            }"#,
        );

        assert_eq!(config.logging.level, "info");
        assert!(matches!(config.logging.format, LogFormat::Json));
        assert_eq!(config.backend.url, "http://backend:9000/turn");
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.backend.timeout_ms, 120_000);
        assert_eq!(config.runner.max_turns_per_step, 25);
    }

    #[test]
    fn test_runner_config() {
        let config = from_json(r#"{ "runner": { "max_turns_per_step": 3 } }"#);
        assert_eq!(config.runner.runner_config().max_turns_per_step, 3);
    }
}
