use std::env;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),
    #[error("{key} must be a valid number, got {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_endpoint: Option<String>,
    pub decision_model: String,
    pub execution_model: String,
    pub direct_json_model: String,
    pub port: u16,
    pub max_workers: usize,
    pub default_deadline_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_endpoint: non_empty("OPENAI_ENDPOINT"),
            decision_model: non_empty("DECISION_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            execution_model: non_empty("EXECUTION_MODEL")
                .unwrap_or_else(|| "gpt-4-turbo".to_string()),
            direct_json_model: non_empty("DIRECT_JSON_MODEL")
                .unwrap_or_else(|| "gpt-4o".to_string()),
            port: parse_or("PORT", non_empty("PORT"), DEFAULT_PORT)?,
            max_workers: parse_or("MAX_WORKERS", non_empty("MAX_WORKERS"), DEFAULT_MAX_WORKERS)?
                .max(1),
            default_deadline_secs: non_empty("DEFAULT_TASK_DEADLINE_SECS")
                .map(|v| parse_value("DEFAULT_TASK_DEADLINE_SECS", &v))
                .transpose()?,
        })
    }

    /// A positional port argument wins over `PORT`.
    pub fn with_port_arg(mut self, arg: Option<String>) -> Result<Self, ConfigError> {
        if let Some(raw) = arg {
            self.port = parse_value("port argument", &raw)?;
        }
        Ok(self)
    }

    pub fn has_credential(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn require_credential(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_endpoint", &self.openai_endpoint)
            .field("decision_model", &self.decision_model)
            .field("execution_model", &self.execution_model)
            .field("direct_json_model", &self.direct_json_model)
            .field("port", &self.port)
            .field("max_workers", &self.max_workers)
            .field("default_deadline_secs", &self.default_deadline_secs)
            .finish()
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
