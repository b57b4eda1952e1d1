//! Import specifier resolution.
//!
//! Maps an import specifier to a concrete file on disk:
//!
//! - Relative: `./utils`, `../lib/theme.css`
//! - Root-relative: `/src/app` (relative to the project root)
//! - Bare: `react`, `@scope/pkg`: treated as external and left to the page
//!   to provide; never bundled.
//!
//! Extensionless script specifiers probe `.ts .tsx .js .jsx .mjs .cjs` and
//! directory `index.*` files. Stylesheet and asset specifiers carry their
//! extension and resolve as plain files.

use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Extensions probed for extensionless specifiers, in priority order.
pub const SCRIPT_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Result of resolving an import specifier.
#[derive(Debug, Clone)]
pub enum ResolveResult {
    /// Resolved to a file in the project.
    Found(PathBuf),
    /// Bare specifier: external, not bundled.
    External(String),
}

/// Failed resolution.
#[derive(Debug)]
pub struct ResolveError {
    pub specifier: String,
    /// Importing file.
    pub from: String,
    pub message: String,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot resolve '{}' from '{}': {}",
            self.specifier, self.from, self.message
        )
    }
}

impl std::error::Error for ResolveError {}

/// Specifier resolver with a per-build cache.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: RwLock<HashMap<(String, String), ResolveResult>>,
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `specifier` as imported from `from`, with `root` as the
    /// project root for root-relative specifiers.
    pub fn resolve(
        &self,
        specifier: &str,
        from: &Path,
        root: &Path,
    ) -> Result<ResolveResult, ResolveError> {
        let key = (specifier.to_string(), from.display().to_string());
        if let Some(cached) = self.cache.read().expect("resolver cache poisoned").get(&key) {
            return Ok(cached.clone());
        }

        let result = self.resolve_uncached(specifier, from, root)?;
        self.cache
            .write()
            .expect("resolver cache poisoned")
            .insert(key, result.clone());
        Ok(result)
    }

    fn resolve_uncached(
        &self,
        specifier: &str,
        from: &Path,
        root: &Path,
    ) -> Result<ResolveResult, ResolveError> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let from_dir = from.parent().unwrap_or(Path::new("."));
            return resolve_file_or_directory(&from_dir.join(specifier), specifier, from);
        }

        if let Some(rest) = specifier.strip_prefix('/') {
            return resolve_file_or_directory(&root.join(rest), specifier, from);
        }

        Ok(ResolveResult::External(specifier.to_string()))
    }
}

/// Probe a target path: as-is, with script extensions appended, then as a
/// directory containing an `index.*` file.
fn resolve_file_or_directory(
    target: &Path,
    specifier: &str,
    from: &Path,
) -> Result<ResolveResult, ResolveError> {
    let not_found = |message: String| ResolveError {
        specifier: specifier.to_string(),
        from: from.display().to_string(),
        message,
    };

    if target.is_file() {
        let path = dunce::canonicalize(target).map_err(|e| not_found(e.to_string()))?;
        return Ok(ResolveResult::Found(path));
    }

    for ext in SCRIPT_EXTENSIONS {
        let with_ext = PathBuf::from(format!("{}.{ext}", target.display()));
        if with_ext.is_file() {
            let path = dunce::canonicalize(with_ext).map_err(|e| not_found(e.to_string()))?;
            return Ok(ResolveResult::Found(path));
        }
    }

    if target.is_dir() {
        for ext in SCRIPT_EXTENSIONS {
            let index = target.join(format!("index.{ext}"));
            if index.is_file() {
                let path = dunce::canonicalize(index).map_err(|e| not_found(e.to_string()))?;
                return Ok(ResolveResult::Found(path));
            }
        }
    }

    Err(not_found("file not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_relative_with_extension_probe() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("main.tsx"), "import './utils';").unwrap();
        std::fs::write(src.join("utils.ts"), "export const x = 1;").unwrap();

        let resolver = Resolver::new();
        let result = resolver
            .resolve("./utils", &src.join("main.tsx"), dir.path())
            .unwrap();
        match result {
            ResolveResult::Found(path) => assert!(path.ends_with("utils.ts")),
            ResolveResult::External(_) => panic!("expected Found"),
        }
    }

    #[test]
    fn test_resolve_explicit_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("theme.css"), ".x{}").unwrap();
        std::fs::write(dir.path().join("main.ts"), "").unwrap();

        let resolver = Resolver::new();
        let result = resolver
            .resolve("./theme.css", &dir.path().join("main.ts"), dir.path())
            .unwrap();
        assert!(matches!(result, ResolveResult::Found(p) if p.ends_with("theme.css")));
    }

    #[test]
    fn test_resolve_directory_index() {
        let dir = tempdir().unwrap();
        let pages = dir.path().join("pages");
        std::fs::create_dir(&pages).unwrap();
        std::fs::write(pages.join("index.ts"), "").unwrap();
        std::fs::write(dir.path().join("main.ts"), "").unwrap();

        let resolver = Resolver::new();
        let result = resolver
            .resolve("./pages", &dir.path().join("main.ts"), dir.path())
            .unwrap();
        assert!(matches!(result, ResolveResult::Found(p) if p.ends_with("index.ts")));
    }

    #[test]
    fn test_resolve_root_relative() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir(&lib).unwrap();
        std::fs::write(lib.join("api.ts"), "").unwrap();
        let deep = dir.path().join("src/nested");
        std::fs::create_dir_all(&deep).unwrap();
        let from = deep.join("widget.ts");
        std::fs::write(&from, "").unwrap();

        let resolver = Resolver::new();
        let result = resolver.resolve("/lib/api", &from, dir.path()).unwrap();
        assert!(matches!(result, ResolveResult::Found(p) if p.ends_with("api.ts")));
    }

    #[test]
    fn test_bare_specifier_is_external() {
        let dir = tempdir().unwrap();
        let resolver = Resolver::new();
        let result = resolver
            .resolve("react", &dir.path().join("main.ts"), dir.path())
            .unwrap();
        assert!(matches!(result, ResolveResult::External(name) if name == "react"));
    }

    #[test]
    fn test_unresolvable_is_an_error() {
        let dir = tempdir().unwrap();
        let resolver = Resolver::new();
        let err = resolver
            .resolve("./missing", &dir.path().join("main.ts"), dir.path())
            .unwrap_err();
        assert_eq!(err.specifier, "./missing");
        assert!(err.to_string().contains("cannot resolve"));
    }
}
