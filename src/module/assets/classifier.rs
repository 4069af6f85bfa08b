//! Asset classification
//!
//! A locator is a style asset iff it ends in `.css`, optionally followed by a
//! non-empty query string that does not itself end in `.js`. Everything else is
//! executable.

use serde::{Deserialize, Serialize};

const STYLE_SUFFIX: &str = ".css";
const SCRIPT_SUFFIX: &str = ".js";

/// One locator or many, as written in a descriptor or manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetUrls {
    One(String),
    Many(Vec<String>),
}

impl AssetUrls {
    /// Normalize into an ordered list
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            AssetUrls::One(url) => vec![url.clone()],
            AssetUrls::Many(urls) => urls.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AssetUrls::One(url) => url.is_empty(),
            AssetUrls::Many(urls) => urls.is_empty(),
        }
    }
}

impl From<&str> for AssetUrls {
    fn from(url: &str) -> Self {
        AssetUrls::One(url.to_string())
    }
}

impl From<String> for AssetUrls {
    fn from(url: String) -> Self {
        AssetUrls::One(url)
    }
}

impl From<Vec<String>> for AssetUrls {
    fn from(urls: Vec<String>) -> Self {
        AssetUrls::Many(urls)
    }
}

impl From<Vec<&str>> for AssetUrls {
    fn from(urls: Vec<&str>) -> Self {
        AssetUrls::Many(urls.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for AssetUrls {
    fn from(urls: [&str; N]) -> Self {
        AssetUrls::Many(urls.iter().map(|u| u.to_string()).collect())
    }
}

/// Result of [`classify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedAssets {
    /// Scripts to fetch and evaluate, in input order
    pub executable: Vec<String>,
    /// Style resources to attach, in input order
    pub style: Vec<String>,
}

/// Partition locators into executable and style assets, preserving order
pub fn classify(urls: impl Into<AssetUrls>) -> ClassifiedAssets {
    let mut assets = ClassifiedAssets::default();
    for url in urls.into().to_vec() {
        if is_style_url(&url) {
            assets.style.push(url);
        } else {
            assets.executable.push(url);
        }
    }
    assets
}

/// Whether a single locator names a style resource
pub fn is_style_url(url: &str) -> bool {
    url.match_indices(STYLE_SUFFIX).any(|(idx, _)| {
        let rest = &url[idx + STYLE_SUFFIX.len()..];
        match rest.strip_prefix('?') {
            None => rest.is_empty(),
            Some(query) => !query.is_empty() && !query.ends_with(SCRIPT_SUFFIX),
        }
    })
}
