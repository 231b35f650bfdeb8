//! Responses flowing through the offline engine, and their stored form.

use bytes::Bytes;
use lampstand_core::CachedResponse;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin network response.
    Basic,
    /// Cross-origin response with an inspectable status.
    Cors,
    /// Cross-origin no-cors response; the status is not meaningful.
    Opaque,
    /// Replayed from the cache store.
    Cached,
    /// Built locally when every fallback failed.
    Synthetic,
}

/// A response returned by the network, the store, or a fallback.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Resolved URL of the response.
    pub url: String,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub bytes: Bytes,
    pub kind: ResponseKind,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    /// Only successful or opaque responses may be written to the store.
    pub fn is_cacheable(&self) -> bool {
        self.is_ok() || self.is_opaque()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Plain-text `Offline` with status 503.
    pub fn offline_text() -> Self {
        Self::synthetic("text/plain; charset=utf-8", Bytes::from_static(b"Offline"))
    }

    /// JSON `{"error":"offline"}` with status 503, for content requests.
    pub fn offline_json() -> Self {
        Self::synthetic("application/json", Bytes::from_static(br#"{"error":"offline"}"#))
    }

    fn synthetic(content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            url: String::new(),
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            bytes: body,
            kind: ResponseKind::Synthetic,
            fetch_ms: 0,
        }
    }

    /// Snapshot this response under a cache key.
    pub fn to_cached(&self, key: &str) -> CachedResponse {
        CachedResponse::new(
            key,
            self.url.clone(),
            self.status.as_u16(),
            self.is_opaque(),
            self.content_type().map(str::to_string),
            Some(headers_to_json(&self.headers)),
            self.bytes.to_vec(),
        )
    }

    /// Replay a stored snapshot.
    pub fn from_cached(entry: CachedResponse) -> Self {
        let mut headers = entry.headers_json.as_deref().map(headers_from_json).unwrap_or_default();
        if let Some(content_type) = entry.content_type.as_deref()
            && let Ok(value) = HeaderValue::from_str(content_type)
        {
            headers.insert(header::CONTENT_TYPE, value);
        }

        Self {
            url: entry.url,
            status: StatusCode::from_u16(entry.status_code).unwrap_or(StatusCode::OK),
            headers,
            bytes: Bytes::from(entry.body),
            kind: ResponseKind::Cached,
            fetch_ms: 0,
        }
    }
}

/// Serialize headers as a JSON array of `[name, value]` pairs.
///
/// Values that are not valid UTF-8 are dropped.
pub fn headers_to_json(headers: &HeaderMap) -> String {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

/// Parse headers written by [`headers_to_json`]; malformed input yields none.
pub fn headers_from_json(json: &str) -> HeaderMap {
    let pairs: Vec<(String, String)> = serde_json::from_str(json).unwrap_or_default();
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            headers.append(name, value);
        }
    }
    headers
}
