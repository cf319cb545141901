//! Runtime configuration.
//!
//! Loaded from YAML. Every section has defaults, so an empty file is a
//! valid configuration that reproduces the reference behavior.
//!
//! ```yaml
//! quota:
//!   daily_limit: 3
//!   timezone: Europe/Berlin
//!   accounting: reserve
//! inference:
//!   timeout: 60s
//!   max_retries: 2
//!   tools:
//!     temperature: 0.3
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use autocheck_core::{Role, Task, DEFAULT_DAILY_LIMIT, DEFAULT_MIN_DESCRIPTION_CHARS, DEFAULT_TIMEZONE};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::providers::{CompletionConfig, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};

/// Environment variable overriding the default chat model.
pub const CHAT_MODEL_ENV: &str = "OPENAI_CHAT_MODEL";

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub quota: QuotaConfig,
    pub retrieval: RetrievalConfig,
    pub inference: InferenceConfig,
    pub validation: ValidationConfig,
    pub prompts: PromptOverrides,
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub identity: IdentityConfig,
}

impl RuntimeConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty mapping
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    /// Reject values no evaluation could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.match_count == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.match_count must be at least 1".to_string(),
            ));
        }

        for task in Task::ALL {
            let params = self.inference.task(task);
            if !(0.0..=2.0).contains(&params.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "inference.{}.temperature must be within 0..=2",
                    task
                )));
            }
            if !(0.0..=1.0).contains(&params.top_p) {
                return Err(ConfigError::Invalid(format!(
                    "inference.{}.top_p must be within 0..=1",
                    task
                )));
            }
        }

        if self.inference.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "inference.timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// How a successful evaluation is charged against the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaAccounting {
    /// Read at admission, write `count + 1` after persistence.
    ///
    /// Two concurrent requests from one user can both be admitted on the
    /// same stale count.
    #[default]
    Reference,

    /// Atomically claim a slot at admission, release it on failure.
    Reserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub daily_limit: u32,

    /// IANA timezone whose midnight starts a new quota day
    pub timezone: Tz,

    pub exempt_role: Role,

    pub accounting: QuotaAccounting,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            timezone: DEFAULT_TIMEZONE,
            exempt_role: Role::Admin,
            accounting: QuotaAccounting::Reference,
        }
    }
}

/// Vector index backing retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    /// No index: compliance runs without grounding excerpts
    #[default]
    None,

    /// JSONL corpus of `{text, embedding}` records loaded into memory
    Memory { path: PathBuf },

    /// Remote similarity-search RPC endpoint
    Rpc {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of excerpts to retrieve (k)
    pub match_count: usize,

    pub embedding_model: String,

    pub index: IndexConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_count: 8,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            index: IndexConfig::None,
        }
    }
}

/// Sampling parameters for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskModelConfig {
    /// Model name; falls back to `OPENAI_CHAT_MODEL`, then the built-in default
    pub model: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for TaskModelConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.1,
            top_p: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub compliance: TaskModelConfig,
    pub business_value: TaskModelConfig,
    pub tools: TaskModelConfig,

    /// Request JSON-object output mode
    pub json_mode: bool,

    /// Per-call limit; unset means no limit beyond the transport's own
    #[serde(with = "duration_opt")]
    pub timeout: Option<Duration>,

    /// Extra attempts for transient provider failures
    pub max_retries: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            compliance: TaskModelConfig::default(),
            business_value: TaskModelConfig::default(),
            tools: TaskModelConfig::default(),
            json_mode: true,
            timeout: None,
            max_retries: 0,
        }
    }
}

impl InferenceConfig {
    pub fn task(&self, task: Task) -> &TaskModelConfig {
        match task {
            Task::Compliance => &self.compliance,
            Task::BusinessValue => &self.business_value,
            Task::Tools => &self.tools,
        }
    }

    /// Resolve the completion parameters for a task.
    ///
    /// `env_model` is the value of `OPENAI_CHAT_MODEL`, if set.
    pub fn completion_config(&self, task: Task, env_model: Option<&str>) -> CompletionConfig {
        let params = self.task(task);
        let model = params
            .model
            .as_deref()
            .or(env_model)
            .unwrap_or(DEFAULT_CHAT_MODEL)
            .to_string();

        CompletionConfig {
            model,
            temperature: params.temperature,
            top_p: params.top_p,
            json_mode: self.json_mode,
        }
    }
}

mod duration_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_description_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_description_chars: DEFAULT_MIN_DESCRIPTION_CHARS,
        }
    }
}

/// System-message overrides. Unset fields use the built-in texts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    pub compliance_system: Option<String>,
    pub business_value_system: Option<String>,
}

/// Which provider type to build and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Provider-specific settings (`api_key`, `base_url`, ...)
    pub settings: JsonValue,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "openai".to_string(),
            settings: JsonValue::Object(Default::default()),
        }
    }
}

/// Durable store backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,

    /// Quota map as JSON plus evaluations as JSONL under `dir`
    File { dir: PathBuf },
}

/// Static bearer-token identities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub tokens: Vec<TokenIdentity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub token: String,
    pub user_id: String,

    /// Stored profile role; anything but `admin` is a plain user
    #[serde(default)]
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_reference_behavior() {
        let config = RuntimeConfig::from_yaml_str("").unwrap();
        assert_eq!(config.quota.daily_limit, 3);
        assert_eq!(config.quota.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.quota.exempt_role, Role::Admin);
        assert_eq!(config.quota.accounting, QuotaAccounting::Reference);
        assert_eq!(config.retrieval.match_count, 8);
        assert_eq!(config.retrieval.embedding_model, "text-embedding-3-small");
        assert_eq!(config.inference.max_retries, 0);
        assert!(config.inference.timeout.is_none());
        assert!(config.inference.json_mode);
        assert_eq!(config.validation.min_description_chars, 5);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.retrieval.index, IndexConfig::None);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
quota:
  daily_limit: 5
  timezone: America/New_York
  accounting: reserve
retrieval:
  match_count: 4
  index:
    type: memory
    path: corpus.jsonl
inference:
  timeout: 90s
  max_retries: 2
  tools:
    model: gpt-4o
    temperature: 0.4
prompts:
  compliance_system: "Custom"
store:
  type: file
  dir: /var/lib/autocheck
identity:
  tokens:
    - token: t-1
      user_id: alice
      role: admin
    - token: t-2
      user_id: bob
"#;
        let config = RuntimeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.quota.daily_limit, 5);
        assert_eq!(config.quota.timezone, chrono_tz::America::New_York);
        assert_eq!(config.quota.accounting, QuotaAccounting::Reserve);
        assert_eq!(config.retrieval.match_count, 4);
        assert_eq!(
            config.retrieval.index,
            IndexConfig::Memory {
                path: PathBuf::from("corpus.jsonl")
            }
        );
        assert_eq!(config.inference.timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.inference.max_retries, 2);
        assert_eq!(config.inference.tools.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.inference.compliance.temperature, 0.1);
        assert_eq!(config.prompts.compliance_system.as_deref(), Some("Custom"));
        assert_eq!(
            config.store,
            StoreConfig::File {
                dir: PathBuf::from("/var/lib/autocheck")
            }
        );
        assert_eq!(config.identity.tokens.len(), 2);
        assert_eq!(config.identity.tokens[1].role, None);
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let result = RuntimeConfig::from_yaml_str("quota:\n  timezone: Mars/Olympus\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = RuntimeConfig::from_yaml_str("inference:\n  timeout: soon\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_out_of_range_top_p_rejected() {
        let result = RuntimeConfig::from_yaml_str("inference:\n  compliance:\n    top_p: 1.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_match_count_rejected() {
        let result = RuntimeConfig::from_yaml_str("retrieval:\n  match_count: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_model_resolution_order() {
        let mut inference = InferenceConfig::default();
        assert_eq!(
            inference.completion_config(Task::Tools, None).model,
            "gpt-4.1-mini"
        );
        assert_eq!(
            inference.completion_config(Task::Tools, Some("gpt-4o-mini")).model,
            "gpt-4o-mini"
        );

        inference.tools.model = Some("gpt-4o".to_string());
        let config = inference.completion_config(Task::Tools, Some("gpt-4o-mini"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.top_p, 0.95);
        assert!(config.json_mode);
    }

    #[test]
    fn test_timeout_round_trips_as_text() {
        let mut config = InferenceConfig::default();
        config.timeout = Some(Duration::from_secs(60));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("1m"));
    }
}
