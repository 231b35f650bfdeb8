//! Request descriptors handed to the offline engine.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// How the request was issued by the client context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Full document load.
    Navigate,
    SameOrigin,
    Cors,
    /// Cross-origin request whose response cannot be inspected.
    NoCors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value.
    pub fn from_sec_fetch_mode(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "cors" => Some(Self::Cors),
            "no-cors" => Some(Self::NoCors),
            _ => None,
        }
    }
}

/// HTTP cache policy for an outgoing fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Let intermediate HTTP caches answer.
    #[default]
    Default,
    /// Bypass intermediate HTTP caches so freshness checks reach the origin.
    Reload,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// URL as issued: absolute, or relative to the origin.
    pub url: String,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// A same-origin GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::GET, url: url.into(), mode: RequestMode::SameOrigin, headers: HeaderMap::new(), body: None }
    }

    /// A full-document navigation.
    pub fn navigate(url: impl Into<String>) -> Self {
        let mut request = Self::get(url);
        request.mode = RequestMode::Navigate;
        request.headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        request
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}
