//! Build configuration and mode selection.

use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};

/// Environment variable whose presence switches the build into development
/// mode, regardless of any `--mode` flag. The `serve` command sets it for
/// its child build so plugins see the same signal.
pub const SERVE_ENV_VAR: &str = "BINDLE_SERVE";

/// Build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Dev build: CSS injected from JS, HTML page and reload client emitted.
    Development,
    /// Optimized build: CSS extracted per chunk, minified output.
    #[default]
    Production,
}

impl Mode {
    /// Select the mode from an optional `--mode` flag value.
    ///
    /// Development wins when the flag says `development` or when
    /// [`SERVE_ENV_VAR`] is present in the environment; production otherwise.
    #[must_use]
    pub fn detect(flag: Option<&str>) -> Self {
        if flag == Some("development") || std::env::var_os(SERVE_ENV_VAR).is_some() {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    #[must_use]
    pub fn is_dev(self) -> bool {
        self == Mode::Development
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

/// A named entry point.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Chunk name this entry produces.
    pub name: String,
    /// Absolute path to the entry file.
    pub path: PathBuf,
}

/// Configuration for a single build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root directory.
    pub root: PathBuf,
    /// Entry points, in order. The first entry is the primary one and emits
    /// as `bundle_name`.
    pub entries: Vec<Entry>,
    /// Output directory for `build`.
    pub out_dir: PathBuf,
    /// Output filename of the primary entry chunk.
    pub bundle_name: String,
    /// Per-chunk stylesheet filename pattern.
    pub style_pattern: String,
    /// Fingerprinted asset filename pattern.
    pub asset_pattern: String,
    /// Build mode.
    pub mode: Mode,
    /// Define replacements applied to script sources.
    pub defines: HashMap<String, String>,
    /// Content-hash non-primary chunk filenames (`[name].[hash].js`).
    pub hashed_chunks: bool,
    /// Split async chunks on dynamic imports.
    pub splitting: bool,
}

impl BuildConfig {
    /// Create a config with the default entry (`app` -> `src/main.tsx`) and
    /// default output layout (`dist/index.js`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let entries = vec![Entry {
            name: "app".to_string(),
            path: root.join("src").join("main.tsx"),
        }];
        Self {
            out_dir: root.join("dist"),
            root,
            entries,
            bundle_name: "index.js".to_string(),
            style_pattern: "[name].css".to_string(),
            asset_pattern: "assets/[name].[hash].[ext]".to_string(),
            mode: Mode::Production,
            defines: HashMap::default(),
            hashed_chunks: false,
            splitting: true,
        }
    }

    /// Replace the default entry point.
    #[must_use]
    pub fn with_entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries = vec![Entry {
            name: name.into(),
            path: path.into(),
        }];
        self
    }

    /// Add an additional entry point.
    #[must_use]
    pub fn add_entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.push(Entry {
            name: name.into(),
            path: path.into(),
        });
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_defines(mut self, defines: HashMap<String, String>) -> Self {
        self.defines = defines;
        self
    }

    /// Whether emitted CSS should be minified.
    #[must_use]
    pub fn minify(&self) -> bool {
        self.mode == Mode::Production
    }
}

/// Expand a `[name]` / `[hash]` / `[ext]` filename pattern.
#[must_use]
pub fn expand_pattern(pattern: &str, name: &str, hash: &str, ext: &str) -> String {
    pattern
        .replace("[name]", name)
        .replace("[hash]", hash)
        .replace("[ext]", ext)
}
