//! Static asset fingerprinting.
//!
//! Binary assets (images, fonts, anything unclassified) are content-hashed
//! and assigned output names from the configured pattern, default
//! `assets/[name].[hash].[ext]`. Identical content always produces identical
//! names, so unchanged assets stay cacheable across builds.

use crate::config::expand_pattern;
use bindle_util::hash::fingerprint;
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};

/// A fingerprinted asset.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Original source path.
    pub source_path: PathBuf,
    /// Output name, pattern-expanded (e.g. `assets/logo.a1b2c3d4.png`).
    pub output_name: String,
    /// Short content hash.
    pub hash: String,
    /// File contents.
    pub content: Vec<u8>,
}

/// All assets collected during a build, keyed by source path.
#[derive(Debug, Default)]
pub struct AssetCollection {
    assets: HashMap<String, Asset>,
}

impl AssetCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint an asset and record it. Returns the output name.
    pub fn add(&mut self, path: &Path, content: Vec<u8>, pattern: &str) -> String {
        let hash = fingerprint(&content);
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("bin");
        let output_name = expand_pattern(pattern, name, &hash, ext);

        self.assets.insert(
            path.display().to_string(),
            Asset {
                source_path: path.to_path_buf(),
                output_name: output_name.clone(),
                hash,
                content,
            },
        );

        output_name
    }

    /// Root-absolute URL an asset is served under, by source path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> Option<String> {
        self.assets.get(path).map(|a| format!("/{}", a.output_name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
