//! Network access for the offline engine.
//!
//! ### URL Normalization
//! - Resolve against the configured origin, upgrade `http` to `https`
//! - First-party hosts reduce to `path?query`, others stay absolute
//! - Never fails: unparseable input is its own key
//!
//! ### Network
//! - The engine only reaches the origin through the [`Network`] trait
//! - [`HttpNetwork`] is the reqwest implementation used by the proxy
//! - Relative URLs are always sent to the origin; absolute URLs on another
//!   origin need a `cors` or `no-cors` request
//! - `CacheMode::Reload` bypasses intermediate HTTP caches
//! - Non-success statuses are returned, not raised; only transport failures error
//! - Max body bytes: 5MB (configurable)

pub mod request;
pub mod response;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use std::time::{Duration, Instant};

pub use request::{CacheMode, FetchRequest, RequestMode};
pub use response::{FetchResponse, ResponseKind, headers_from_json, headers_to_json};
pub use url::{UrlError, UrlNormalizer, resolve};

use lampstand_core::{AppConfig, Error};

/// Request headers that describe the client connection rather than the
/// resource, and are never forwarded upstream.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The engine's only path to the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform a fetch. Errors mean the network could not be reached;
    /// HTTP error statuses come back as responses.
    async fn fetch(&self, request: &FetchRequest, cache: CacheMode) -> Result<FetchResponse, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin that relative request URLs resolve against.
    pub origin: Url,

    /// User agent string (default: "lampstand/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://127.0.0.1:4173").expect("static origin parses"),
            user_agent: "lampstand/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    /// Build from application configuration.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        Ok(Self {
            origin,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        })
    }
}

/// reqwest-backed [`Network`].
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new HTTP network with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.config.origin.origin()
    }

    /// Build the upstream URL for a request.
    ///
    /// Relative input only ever replaces the origin's path and query, so a
    /// path such as `//other-host/x` cannot leave the origin.
    fn upstream_url(&self, request: &FetchRequest) -> Result<Url, Error> {
        let target = request.url.trim();

        if let Ok(url) = Url::parse(target) {
            let cross_origin = matches!(request.mode, RequestMode::Cors | RequestMode::NoCors);
            let web = matches!(url.scheme(), "http" | "https");
            if self.is_same_origin(&url) || (cross_origin && web) {
                return Ok(url);
            }
            return Err(Error::InvalidUrl(format!("{target}: outside origin {}", self.config.origin)));
        }

        let target = target.split_once('#').map_or(target, |(before, _)| before);
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        let mut url = self.config.origin.clone();
        url.set_path(&format!("/{}", path.trim_start_matches('/')));
        url.set_query(query);
        Ok(url)
    }

    fn outgoing_headers(request: &FetchRequest, cache: CacheMode) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(request.headers.len() + 2);
        for (name, value) in &request.headers {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        if cache == CacheMode::Reload {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }
        headers
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest, cache: CacheMode) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = self.upstream_url(request)?;

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .headers(Self::outgoing_headers(request, cache));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("{url}: {e}"))
            } else {
                Error::Network(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();

        let content_length = response.content_length();
        if let Some(len) = content_length
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes: Bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let kind = if self.is_same_origin(&url) {
            ResponseKind::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseKind::Opaque
        } else {
            ResponseKind::Cors
        };

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} ({}) in {}ms ({} bytes)", url, final_url, status, fetch_ms, bytes.len());

        Ok(FetchResponse { url: final_url.to_string(), status, headers, bytes, kind, fetch_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn network_for(server: &MockServer) -> HttpNetwork {
        let config = FetchConfig { origin: Url::parse(&server.uri()).unwrap(), ..Default::default() };
        HttpNetwork::new(config).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "lampstand/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app() {
        let app = AppConfig { origin: "https://bible.example.org".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from_app(&app).unwrap();
        assert_eq!(config.origin.as_str(), "https://bible.example.org/");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_outgoing_headers_strip_hop_by_hop() {
        let request = FetchRequest::get("/")
            .with_header(header::HOST, HeaderValue::from_static("proxy.local"))
            .with_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR"));

        let headers = HttpNetwork::outgoing_headers(&request, CacheMode::Reload);
        assert!(headers.get(header::HOST).is_none());
        assert_eq!(headers.get(header::ACCEPT_LANGUAGE).unwrap(), "fr-FR");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    }

    #[tokio::test]
    async fn test_fetch_relative_url_against_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bible/fr/jean/1.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"{"1":"Au commencement était la Parole"}"#),
            )
            .mount(&server)
            .await;

        let network = network_for(&server);
        let response = network
            .fetch(&FetchRequest::get("/bible/fr/jean/1.json"), CacheMode::Default)
            .await
            .unwrap();

        assert!(response.is_ok());
        assert_eq!(response.kind, ResponseKind::Basic);
        assert_eq!(response.content_type(), Some("application/json"));
        assert!(String::from_utf8_lossy(&response.bytes).contains("Au commencement"));
    }

    #[tokio::test]
    async fn test_fetch_reload_sends_no_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .and(header_eq("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let network = network_for(&server);
        let response = network.fetch(&FetchRequest::get("/index.html"), CacheMode::Reload).await.unwrap();
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let network = network_for(&server);
        let response = network.fetch(&FetchRequest::get("/missing.json"), CacheMode::Default).await.unwrap();
        assert_eq!(response.status, reqwest::StatusCode::NOT_FOUND);
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.json"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
            .mount(&server)
            .await;

        let config = FetchConfig { origin: Url::parse(&server.uri()).unwrap(), max_bytes: 16, ..Default::default() };
        let network = HttpNetwork::new(config).unwrap();
        let result = network.fetch(&FetchRequest::get("/big.json"), CacheMode::Default).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_network_error() {
        let config = FetchConfig {
            origin: Url::parse("http://127.0.0.1:9").unwrap(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let network = HttpNetwork::new(config).unwrap();
        let result = network.fetch(&FetchRequest::get("/"), CacheMode::Default).await;
        assert!(result.unwrap_err().is_network());
    }

    #[test]
    fn test_upstream_url_stays_on_origin() {
        let config = FetchConfig { origin: Url::parse("http://127.0.0.1:4173").unwrap(), ..Default::default() };
        let network = HttpNetwork::new(config).unwrap();

        let url = network.upstream_url(&FetchRequest::get("//127.0.0.1:9000/secret?x=1#top")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4173/127.0.0.1:9000/secret?x=1");

        let url = network.upstream_url(&FetchRequest::get("assets/app.css")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4173/assets/app.css");

        let url = network.upstream_url(&FetchRequest::get("http://127.0.0.1:4173/index.html")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4173/index.html");
    }

    #[test]
    fn test_upstream_url_rejects_foreign_origin_for_same_origin_request() {
        let config = FetchConfig { origin: Url::parse("http://127.0.0.1:4173").unwrap(), ..Default::default() };
        let network = HttpNetwork::new(config).unwrap();

        let foreign = FetchRequest::get("http://127.0.0.1:9000/secret");
        assert!(matches!(network.upstream_url(&foreign), Err(Error::InvalidUrl(_))));

        let scheme = FetchRequest::get("file:///etc/passwd").with_mode(RequestMode::NoCors);
        assert!(matches!(network.upstream_url(&scheme), Err(Error::InvalidUrl(_))));

        let cors = FetchRequest::get("https://fonts.example.com/inter.woff2").with_mode(RequestMode::Cors);
        assert_eq!(network.upstream_url(&cors).unwrap().host_str(), Some("fonts.example.com"));
    }

    #[tokio::test]
    async fn test_double_slash_path_does_not_reach_other_host() {
        let origin = MockServer::start().await;
        let other = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OTHER-HOST-SECRET"))
            .mount(&other)
            .await;

        let network = network_for(&origin);
        let request = FetchRequest::get(format!("//{}/secret", other.address()));
        let response = network.fetch(&request, CacheMode::Default).await.unwrap();

        assert_eq!(response.status, reqwest::StatusCode::NOT_FOUND);
        assert!(!String::from_utf8_lossy(&response.bytes).contains("OTHER-HOST-SECRET"));
        assert!(other.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_cross_origin_no_cors_is_opaque() {
        let origin = MockServer::start().await;
        let cdn = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/inter.woff2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4]))
            .mount(&cdn)
            .await;

        let network = network_for(&origin);
        let request = FetchRequest::get(format!("{}/inter.woff2", cdn.uri())).with_mode(RequestMode::NoCors);
        let response = network.fetch(&request, CacheMode::Default).await.unwrap();
        assert_eq!(response.kind, ResponseKind::Opaque);
        assert!(response.is_cacheable());
    }
}
