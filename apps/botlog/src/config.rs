use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_timezone: Option<String>,
    #[serde(default)]
    pub prefs_path: Option<String>,
    #[serde(default)]
    pub log_path: Option<String>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            base_url: default_base_url(),
            client_timezone: None,
            prefs_path: None,
            log_path: None,
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Reads `BOTLOG_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_source(environment())
    }

    pub fn from_source(source: config::Environment) -> Self {
        config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .map(AppConfig::normalize)
            .unwrap_or_else(|err| {
                tracing::warn!(target = "botlog.config", error = %err, "invalid configuration; using defaults");
                AppConfig::default().normalize()
            })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn prefs_path(&self) -> Option<PathBuf> {
        self.prefs_path.as_ref().map(PathBuf::from)
    }

    fn normalize(mut self) -> Self {
        self.base_url = Self::normalize_opt(Some(self.base_url)).unwrap_or_else(default_base_url);
        self.client_timezone = Self::normalize_opt(self.client_timezone.take());
        self.prefs_path = Self::normalize_opt(self.prefs_path.take());
        self.log_path = Self::normalize_opt(self.log_path.take());
        self
    }

    fn normalize_opt(value: Option<String>) -> Option<String> {
        value.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("BOTLOG")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}
