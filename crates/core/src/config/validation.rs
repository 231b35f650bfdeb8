//! Checks applied to a merged [`AppConfig`].

use crate::config::AppConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CONFIG_ERROR: cannot load settings: {0}")]
    LoadFailed(String),

    #[error("CONFIG_ERROR: {field}: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Reject settings the engine cannot run with:
    /// - `origin` is not an http(s) URL
    /// - `cache_prefix`, `cache_version` or `user_agent` is empty
    /// - `precache_batch_size` is 0 or exceeds 64
    /// - `max_bytes` outside 1 byte to 50MB
    /// - `timeout_ms` outside 100ms to 5 minutes
    /// - the shell list is empty, or a configured path is not absolute
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            Ok(_) => return Err(invalid("origin", "must be an http(s) URL with a host")),
            Err(e) => return Err(invalid("origin", &e.to_string())),
        }

        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }

        if self.precache_batch_size == 0 {
            return Err(invalid("precache_batch_size", "must be greater than 0"));
        }
        if self.precache_batch_size > 64 {
            return Err(invalid("precache_batch_size", "must not exceed 64"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.shell_paths.is_empty() {
            return Err(invalid("shell_paths", "must list at least one path"));
        }
        if let Some(path) = self.shell_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "shell_paths".into(),
                reason: format!("{path} must start with '/'"),
            });
        }
        for (field, value) in [
            ("shell_document", &self.shell_document),
            ("content_prefix", &self.content_prefix),
            ("content_index_path", &self.content_index_path),
        ] {
            if !value.starts_with('/') {
                return Err(invalid(field, "must start with '/'"));
            }
        }

        if !self.shell_paths.contains(&self.shell_document) {
            tracing::warn!(
                shell_document = %self.shell_document,
                "shell_document is not listed in shell_paths; it is still precached on install"
            );
        }

        Ok(())
    }
}
