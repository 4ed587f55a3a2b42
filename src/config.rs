//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Instance name for identification.
    pub name: String,
    /// Capture a screenshot after a successful submission (best-effort).
    pub screenshot_on_complete: bool,
    /// Appended to a question when the same field is asked twice in a row.
    pub repeat_hint: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            name: "formflow".to_string(),
            screenshot_on_complete: true,
            repeat_hint: "I couldn't apply your last answer, try a simpler value (e.g. first name only).".to_string(),
        }
    }
}

/// Remote browser bridge configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Base URL of the session API (e.g. `https://bridge.example.com`).
    pub api_base: String,
    /// Bearer token for the bridge.
    pub api_key: SecretString,
}

impl BrowserConfig {
    /// Build from `FORMFLOW_BROWSER_API_BASE` / `FORMFLOW_BROWSER_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = std::env::var("FORMFLOW_BROWSER_API_BASE")
            .map_err(|_| ConfigError::MissingEnvVar("FORMFLOW_BROWSER_API_BASE".into()))?;
        let api_key = std::env::var("FORMFLOW_BROWSER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("FORMFLOW_BROWSER_API_KEY".into()))?;
        if api_base.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "FORMFLOW_BROWSER_API_BASE".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key),
        })
    }
}
