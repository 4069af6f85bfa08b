//! Module asset handling
//!
//! Splits a module's locators into executable and style assets, and tracks
//! shared style resources across modules by reference count.

pub mod classifier;
pub mod styles;

pub use classifier::{classify, is_style_url, AssetUrls, ClassifiedAssets};
pub use styles::{StyleRefCounter, StyleRelease};
