//! Proxy and engine settings.
//!
//! Sources, later ones overriding earlier: built-in defaults, the TOML file
//! named by `LAMPSTAND_CONFIG_FILE`, then `LAMPSTAND_*` variables. Nested
//! keys use `__` in variable names.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Everything the proxy needs to know about the deployment it fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream origin serving the static deployment.
    ///
    /// Set via LAMPSTAND_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the proxy listens on.
    ///
    /// Set via LAMPSTAND_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite file holding every cache store.
    ///
    /// Set via LAMPSTAND_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Prefix of every cache store name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Deployed version tag. Bumping it evicts every older store on activate.
    ///
    /// Set via LAMPSTAND_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Hosts whose URLs are reduced to path + query in cache keys.
    ///
    /// The origin host is always first-party.
    #[serde(default)]
    pub first_party_hosts: Vec<String>,

    /// Application shell paths precached on install.
    #[serde(default = "default_shell_paths")]
    pub shell_paths: Vec<String>,

    /// Shell document scanned for build assets and used as offline fallback.
    #[serde(default = "default_shell_document")]
    pub shell_document: String,

    /// Path prefix of the Bible content corpus.
    #[serde(default = "default_content_prefix")]
    pub content_prefix: String,

    /// File extensions of content documents.
    #[serde(default = "default_content_extensions")]
    pub content_extensions: Vec<String>,

    /// Build-output directory prefixes.
    #[serde(default = "default_asset_prefixes")]
    pub asset_prefixes: Vec<String>,

    /// Script, style, font and image extensions.
    #[serde(default = "default_asset_extensions")]
    pub asset_extensions: Vec<String>,

    /// Well-known path of the content index document.
    #[serde(default = "default_content_index_path")]
    pub content_index_path: String,

    /// Whether install precaches the whole content corpus.
    ///
    /// Set via LAMPSTAND_PRECACHE_CORPUS environment variable.
    #[serde(default = "default_true")]
    pub precache_corpus: bool,

    /// Number of corpus fetches in flight per precache batch.
    ///
    /// Set via LAMPSTAND_PRECACHE_BATCH_SIZE environment variable.
    #[serde(default = "default_precache_batch_size")]
    pub precache_batch_size: usize,

    /// Whether navigation preload is enabled on activate.
    #[serde(default = "default_true")]
    pub navigation_preload: bool,

    /// User-Agent string for upstream requests.
    ///
    /// Set via LAMPSTAND_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via LAMPSTAND_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per upstream request.
    ///
    /// Set via LAMPSTAND_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_origin() -> String {
    "http://127.0.0.1:4173".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./lampstand-cache.sqlite")
}

fn default_cache_prefix() -> String {
    "lampstand".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_shell_paths() -> Vec<String> {
    ["/", "/index.html", "/manifest.webmanifest", "/favicon.ico", "/icons/icon-192.png", "/icons/icon-512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_shell_document() -> String {
    "/index.html".into()
}

fn default_content_prefix() -> String {
    "/bible/".into()
}

fn default_content_extensions() -> Vec<String> {
    vec!["json".into()]
}

fn default_asset_prefixes() -> Vec<String> {
    vec!["/assets/".into()]
}

fn default_asset_extensions() -> Vec<String> {
    ["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_content_index_path() -> String {
    "/bible/index.json".into()
}

fn default_precache_batch_size() -> usize {
    10
}

fn default_user_agent() -> String {
    "lampstand/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            first_party_hosts: Vec::new(),
            shell_paths: default_shell_paths(),
            shell_document: default_shell_document(),
            content_prefix: default_content_prefix(),
            content_extensions: default_content_extensions(),
            asset_prefixes: default_asset_prefixes(),
            asset_extensions: default_asset_extensions(),
            content_index_path: default_content_index_path(),
            precache_corpus: true,
            precache_batch_size: default_precache_batch_size(),
            navigation_preload: true,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Upstream timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the cache store owned by the running version.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Merge defaults, the optional TOML file and the environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LAMPSTAND_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LAMPSTAND_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config = figment.extract::<Self>().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
