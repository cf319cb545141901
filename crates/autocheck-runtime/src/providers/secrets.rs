//! Credential handling for the model provider and the vector index.
//!
//! Keys are wrapped in [`SecretString`] as soon as they are read and only
//! exposed where a request is signed, so they never reach logs or error text.
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(&settings, "api_key", "OPENAI_API_KEY", "OpenAI API key")?;
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "programmatic",
        })
    }
}

/// Blank values count as unset: `api_key: ""` in YAML must not shadow the env.
fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn lookup(config: &JsonValue, config_key: &str, env_var: &str) -> Option<(String, CredentialSource)> {
    if let Some(value) = config[config_key].as_str().and_then(non_blank) {
        return Some((value.to_string(), CredentialSource::Config));
    }
    let env = std::env::var(env_var).ok()?;
    non_blank(&env).map(|value| (value.to_string(), CredentialSource::Environment))
}

/// An API key that redacts itself in Debug and Display.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read `config_key` from provider settings, falling back to `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        lookup(config, config_key, env_var)
            .map(|(value, source)| Self::new(value, source, name))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} required: set '{}' in config or {} environment variable",
                    name, config_key, env_var
                ))
            })
    }

    /// Wrap an optional configured key; a missing or blank key yields `None`.
    pub fn optional(value: Option<&str>, name: &'static str) -> Option<Self> {
        value
            .and_then(non_blank)
            .map(|v| Self::new(v, CredentialSource::Config, name))
    }

    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        lookup(config, config_key, env_var).is_some()
    }

    /// Call only where the credential is sent.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
