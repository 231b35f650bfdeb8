//! Resource classification.
//!
//! One closed set of classes and one total function onto it; the dispatcher
//! maps each class to exactly one strategy.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::WorkerConfig;
use crate::fetch::FetchRequest;

/// What kind of resource a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    /// Full-document page load.
    Navigation,
    /// A document of the Bible content corpus.
    BibleContent,
    /// Build output: scripts, styles, fonts, images.
    StaticAsset,
    Other,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceClass::Navigation => "navigation",
            ResourceClass::BibleContent => "bible-content",
            ResourceClass::StaticAsset => "static-asset",
            ResourceClass::Other => "other",
        };
        f.write_str(name)
    }
}

/// Path rules used to classify requests.
#[derive(Debug, Clone)]
pub struct Classifier {
    content_prefix: String,
    content_extensions: Vec<String>,
    asset_prefixes: Vec<String>,
    asset_extensions: Vec<String>,
}

impl Classifier {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            content_prefix: config.content_prefix.clone(),
            content_extensions: lowercase_all(&config.content_extensions),
            asset_prefixes: config.asset_prefixes.clone(),
            asset_extensions: lowercase_all(&config.asset_extensions),
        }
    }

    /// Classify a GET request given its resolved path.
    ///
    /// Rules, first match wins: navigation mode, content prefix with a
    /// content extension, asset prefix or asset extension, anything else.
    pub fn classify(&self, request: &FetchRequest, path: &str) -> ResourceClass {
        if request.is_navigation() {
            return ResourceClass::Navigation;
        }

        let extension = extension_of(path);
        let has_extension = |allowed: &[String]| extension.as_deref().is_some_and(|ext| allowed.iter().any(|a| a == ext));

        if path.starts_with(&self.content_prefix) && has_extension(&self.content_extensions) {
            ResourceClass::BibleContent
        } else if self.asset_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
            || has_extension(&self.asset_extensions)
        {
            ResourceClass::StaticAsset
        } else {
            ResourceClass::Other
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim_start_matches('.').to_ascii_lowercase()).collect()
}

/// Lowercased extension of the last path segment, if any.
fn extension_of(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
