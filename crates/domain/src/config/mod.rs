mod llm;
mod observability;
mod sessions;
mod tools;
mod turn;

pub use llm::*;
pub use observability::*;
pub use sessions::*;
pub use tools::*;
pub use turn::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Error, field: field.into(), message: message.into() }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Warning, field: field.into(), message: message.into() }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning("llm.providers", "no LLM providers configured"));
        }

        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
            if provider.auth.key.is_some() {
                errors.push(ConfigError::warning(
                    format!("llm.providers[{i}].auth.key"),
                    "API key stored in plain text; prefer auth.env",
                ));
            }
        }

        if let Some(default) = &self.llm.default_provider {
            if !self.llm.providers.iter().any(|p| &p.id == default) {
                errors.push(ConfigError::error(
                    "llm.default_provider",
                    format!("unknown provider \"{default}\""),
                ));
            }
        }

        if self.turn.max_tool_loops == 0 {
            errors.push(ConfigError::error(
                "turn.max_tool_loops",
                "must allow at least one model call",
            ));
        }

        for (field, value) in [
            ("turn.model_timeout_ms", self.turn.model_timeout_ms),
            ("turn.stream_idle_timeout_ms", self.turn.stream_idle_timeout_ms),
            ("tools.timeout_ms", self.tools.timeout_ms),
        ] {
            if value == 0 {
                errors.push(ConfigError::error(field, "timeout must be greater than 0"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for (i, ep) in self.tools.endpoints.iter().enumerate() {
            if ep.name.is_empty() || ep.url.is_empty() {
                errors.push(ConfigError::error(
                    format!("tools.endpoints[{i}]"),
                    "name and url must not be empty",
                ));
            }
            if !seen.insert(ep.name.as_str()) {
                errors.push(ConfigError::error(
                    format!("tools.endpoints[{i}].name"),
                    format!("duplicate tool \"{}\"", ep.name),
                ));
            }
        }

        if self.sessions.state_path.as_os_str().is_empty() {
            errors.push(ConfigError::error("sessions.state_path", "must not be empty"));
        }

        if let Some(path) = &self.turn.system_prompt_path {
            if !path.exists() {
                errors.push(ConfigError::warning(
                    "turn.system_prompt_path",
                    format!("{} not found; the built-in prompt will be used", path.display()),
                ));
            }
        }

        errors
    }
}
