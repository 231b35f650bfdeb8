//! URL normalization for stable cache keys.
//!
//! Every request URL is reduced to one canonical form before it touches the
//! cache store, so the same resource requested through `http://`, through a
//! mirror host, or with a trailing fragment shares one entry.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a possibly relative URL against a base.
///
/// Resolution steps:
/// 1. Trim leading/trailing whitespace
/// 2. Join against `base` (absolute inputs replace it)
/// 3. Upgrade `http` to `https`
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(input: &str, base: &Url) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            parsed
                .set_scheme("https")
                .map_err(|_| UrlError::InvalidUrl(format!("cannot upgrade {parsed}")))?;
        }
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Canonicalizes request URLs into cache keys.
///
/// First-party URLs become `path?query`; everything else stays a full
/// absolute URL. The origin host is always first-party, but only on the
/// origin's own port.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    origin: Url,
    first_party: Vec<String>,
}

impl UrlNormalizer {
    pub fn new(origin: Url, first_party_hosts: &[String]) -> Self {
        let origin_host = origin.host_str().map(str::to_lowercase);
        let mut first_party: Vec<String> = first_party_hosts
            .iter()
            .map(|h| h.trim().to_lowercase())
            .filter(|h| Some(h) != origin_host.as_ref())
            .collect();
        first_party.sort();
        first_party.dedup();
        Self { origin, first_party }
    }

    /// The origin relative URLs resolve against.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Whether a resolved URL belongs to one of the first-party hosts.
    pub fn is_first_party(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.origin.host_str().is_some_and(|origin| origin.eq_ignore_ascii_case(host)) {
            return url.port() == self.origin.port();
        }
        self.first_party.iter().any(|fp| fp.eq_ignore_ascii_case(host))
    }

    /// Resolve a request URL against the origin without reducing it.
    pub fn resolve(&self, input: &str) -> Result<Url, UrlError> {
        resolve(input, &self.origin)
    }

    /// Normalize a request URL into its cache key.
    ///
    /// Never fails: input that cannot be resolved is returned unchanged.
    pub fn normalize(&self, input: &str) -> String {
        match self.resolve(input) {
            Ok(url) if self.is_first_party(&url) => path_and_query(&url),
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::debug!("leaving {input:?} unnormalized: {e}");
                input.to_string()
            }
        }
    }

    /// Resolved path of a request URL, used for classification.
    ///
    /// Falls back to the raw input's path portion when it cannot be resolved.
    pub fn path_of(&self, input: &str) -> String {
        match self.resolve(input) {
            Ok(url) => url.path().to_string(),
            Err(_) => lampstand_core::cache::search_free_key(input).to_string(),
        }
    }
}

/// `path?query` with leading slashes collapsed, so a key never reads as a
/// protocol-relative URL.
fn path_and_query(url: &Url) -> String {
    let path = format!("/{}", url.path().trim_start_matches('/'));
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> UrlNormalizer {
        UrlNormalizer::new(
            Url::parse("https://bible.example.org").unwrap(),
            &["www.bible.example.org".to_string(), "Mirror.Example.NET".to_string()],
        )
    }

    #[test]
    fn test_resolve_relative() {
        let base = Url::parse("https://bible.example.org/").unwrap();
        let url = resolve("/bible/fr/jean/3.json", &base).unwrap();
        assert_eq!(url.as_str(), "https://bible.example.org/bible/fr/jean/3.json");
    }

    #[test]
    fn test_resolve_upgrades_http() {
        let base = Url::parse("https://bible.example.org/").unwrap();
        let url = resolve("http://cdn.example.net/app.js", &base).unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_resolve_remove_fragment() {
        let base = Url::parse("https://bible.example.org/").unwrap();
        let url = resolve("/read?book=jean#v16", &base).unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("book=jean"));
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let base = Url::parse("https://bible.example.org/").unwrap();
        let result = resolve("data:text/plain,hello", &base);
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_empty() {
        let base = Url::parse("https://bible.example.org/").unwrap();
        assert!(matches!(resolve("   ", &base), Err(UrlError::Empty)));
    }

    #[test]
    fn test_normalize_first_party_strips_host() {
        let n = normalizer();
        assert_eq!(n.normalize("https://bible.example.org/bible/en/john/1.json"), "/bible/en/john/1.json");
        assert_eq!(n.normalize("http://www.bible.example.org/?lang=fr"), "/?lang=fr");
        assert_eq!(n.normalize("https://mirror.example.net/index.html"), "/index.html");
    }

    #[test]
    fn test_normalize_relative_input() {
        let n = normalizer();
        assert_eq!(n.normalize("/assets/index-4f2a.js"), "/assets/index-4f2a.js");
        assert_eq!(n.normalize("assets/app.css"), "/assets/app.css");
    }

    #[test]
    fn test_normalize_third_party_keeps_absolute() {
        let n = normalizer();
        assert_eq!(
            n.normalize("http://fonts.example.com/inter.woff2?v=2"),
            "https://fonts.example.com/inter.woff2?v=2"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer();
        for input in [
            "http://bible.example.org/bible/fr/psaumes/23.json?x=1#top",
            "https://www.bible.example.org/",
            "/index.html",
            "https://fonts.example.com/inter.woff2",
            "http://fonts.example.com/a b.css",
            "https://bible.example.org//evil.example/x.json",
            "//evil.example/x.json",
        ] {
            let once = n.normalize(input);
            assert_eq!(n.normalize(&once), once, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_normalize_collapses_leading_slashes() {
        let n = normalizer();
        assert_eq!(n.normalize("https://bible.example.org//evil.example/x.json"), "/evil.example/x.json");
        assert_eq!(n.normalize("https://bible.example.org///a?b=1"), "/a?b=1");
        assert_eq!(n.normalize("/evil.example/x.json"), "/evil.example/x.json");
    }

    #[test]
    fn test_origin_host_on_other_port_is_third_party() {
        let n = UrlNormalizer::new(Url::parse("http://127.0.0.1:4173").unwrap(), &[]);
        assert_eq!(n.normalize("/secret"), "/secret");
        assert_eq!(n.normalize("http://127.0.0.1:4173/secret"), "/secret");
        assert_eq!(n.normalize("http://127.0.0.1:9000/secret"), "https://127.0.0.1:9000/secret");
    }

    #[test]
    fn test_normalize_malformed_returns_input() {
        let n = normalizer();
        assert_eq!(n.normalize("http://[::1"), "http://[::1");
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("mailto:someone@example.org"), "mailto:someone@example.org");
    }

    #[test]
    fn test_path_of() {
        let n = normalizer();
        assert_eq!(n.path_of("https://bible.example.org/bible/fr/1.json?v=2"), "/bible/fr/1.json");
        assert_eq!(n.path_of("https://cdn.example.net/fonts/inter.woff2"), "/fonts/inter.woff2");
        assert_eq!(n.path_of("http://[::1/x?y"), "http://[::1/x");
    }
}
