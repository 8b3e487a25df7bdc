mod backend;
mod canvas;
mod credits;
mod observability;
mod server;
mod store;

pub use backend::*;
pub use canvas::*;
pub use credits::*;
pub use observability::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
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

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

/// Upper bound on `backend.max_retries`; beyond this a dead backend
/// would stall a run for minutes.
pub const MAX_BACKEND_RETRIES: u32 = 10;

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: &str| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message: message.into(),
            })
        };

        if self.server.port == 0 {
            push(
                ConfigSeverity::Error,
                "server.port",
                "port must be greater than 0",
            );
        }

        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host", "host must not be empty");
        }

        if self.backend.base_url.is_empty() {
            push(
                ConfigSeverity::Error,
                "backend.base_url",
                "base_url must not be empty",
            );
        }

        if self.backend.user_id.is_empty() {
            push(
                ConfigSeverity::Error,
                "backend.user_id",
                "user_id must not be empty",
            );
        }

        if self.backend.max_retries > MAX_BACKEND_RETRIES {
            push(
                ConfigSeverity::Error,
                "backend.max_retries",
                &format!("max_retries must be at most {MAX_BACKEND_RETRIES}"),
            );
        }

        if self.canvas.executable_languages.is_empty() {
            push(
                ConfigSeverity::Warning,
                "canvas.executable_languages",
                "no executable languages: every entry will be display-only",
            );
        }

        if self.credits.free_fix_attempts == 0 {
            push(
                ConfigSeverity::Warning,
                "credits.free_fix_attempts",
                "every fix attempt will cost credits",
            );
        }

        if self.credits.reconcile_interval_secs == 0 {
            push(
                ConfigSeverity::Error,
                "credits.reconcile_interval_secs",
                "reconcile interval must be greater than 0",
            );
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            push(
                ConfigSeverity::Error,
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            );
        }

        // CORS: warn if wildcard is used.
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            );
        }

        errors
    }
}
