//! Build-asset harvesting from shell markup.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// `link` relations that point at resources the shell needs to boot.
const ASSET_RELS: &[&str] = &["stylesheet", "preload", "modulepreload", "icon", "apple-touch-icon", "manifest"];

/// Collect same-origin asset URLs referenced by a shell document.
///
/// Scans `script[src]`, `link[href]` with an asset relation, and `img[src]`,
/// resolves each against `base`, and drops cross-origin references and
/// duplicates. Order of first appearance is kept.
pub fn discover_assets(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script[src], link[href], img[src]").expect("invalid selector");

    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for element in document.select(&selector) {
        let value = element.value();
        let reference = match value.name() {
            "link" => {
                let rel = value.attr("rel").unwrap_or_default().to_ascii_lowercase();
                if !rel.split_whitespace().any(|r| ASSET_RELS.contains(&r)) {
                    continue;
                }
                value.attr("href")
            }
            _ => value.attr("src"),
        };

        let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
            continue;
        };

        let mut resolved = match base.join(reference) {
            Ok(u) => u,
            Err(_) => continue,
        };
        resolved.set_fragment(None);

        if resolved.origin() != base.origin() {
            continue;
        }

        if seen.insert(resolved.to_string()) {
            assets.push(resolved);
        }
    }

    assets
}
