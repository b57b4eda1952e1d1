//! Build errors.
//!
//! Every build failure carries a stable SCREAMING_SNAKE_CASE code so the
//! CLI's `--json` output stays machine-readable across releases.

use crate::plugin::PluginError;
use crate::resolve::ResolveError;
use crate::style::StyleError;

/// A failed build step.
#[derive(Debug)]
pub struct BuildError {
    /// Stable machine-readable error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// File the error refers to, when known.
    pub path: Option<String>,
}

impl BuildError {
    /// Create an error without an associated file.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Create an error pointing at a file.
    #[must_use]
    pub fn with_path(code: &'static str, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} ({})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BuildError {}

impl From<ResolveError> for BuildError {
    fn from(err: ResolveError) -> Self {
        BuildError {
            code: "IMPORT_NOT_RESOLVED",
            message: format!("cannot resolve '{}': {}", err.specifier, err.message),
            path: Some(err.from),
        }
    }
}

impl From<StyleError> for BuildError {
    fn from(err: StyleError) -> Self {
        let path = match &err {
            StyleError::Io { path, .. } | StyleError::Compile { path, .. } => path.clone(),
        };
        BuildError {
            code: "STYLE_COMPILE_ERROR",
            message: err.to_string(),
            path: Some(path),
        }
    }
}

impl From<PluginError> for BuildError {
    fn from(err: PluginError) -> Self {
        BuildError {
            code: "PLUGIN_ERROR",
            message: err.to_string(),
            path: None,
        }
    }
}
