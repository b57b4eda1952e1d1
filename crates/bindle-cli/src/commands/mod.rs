pub mod build;
pub mod serve;
pub mod version;

use bindle_core::{env, BuildConfig, Mode};
use std::path::{Path, PathBuf};

/// Assemble a build config from command-line inputs. Loads `.env` files for
/// the mode and turns them into define replacements.
pub fn project_config(
    cwd: &Path,
    entry: Option<&PathBuf>,
    mode: Mode,
    out_dir: Option<&PathBuf>,
) -> BuildConfig {
    let mut config = BuildConfig::new(cwd).with_mode(mode);

    if let Some(entry) = entry {
        let path = if entry.is_absolute() {
            entry.clone()
        } else {
            cwd.join(entry)
        };
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("app")
            .to_string();
        config = config.with_entry(name, path);
    }

    if let Some(out_dir) = out_dir {
        config.out_dir = if out_dir.is_absolute() {
            out_dir.clone()
        } else {
            cwd.join(out_dir)
        };
    }

    let dot_env = env::load_env_files(cwd, mode);
    config.with_defines(env::define_replacements(&dot_env, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry_and_out_dir() {
        let config = project_config(Path::new("/proj"), None, Mode::Production, None);
        assert_eq!(config.entries[0].name, "app");
        assert_eq!(config.entries[0].path, Path::new("/proj/src/main.tsx"));
        assert_eq!(config.out_dir, Path::new("/proj/dist"));
    }

    #[test]
    fn test_explicit_entry_named_after_stem() {
        let entry = PathBuf::from("src/admin.ts");
        let config = project_config(Path::new("/proj"), Some(&entry), Mode::Production, None);
        assert_eq!(config.entries[0].name, "admin");
        assert_eq!(config.entries[0].path, Path::new("/proj/src/admin.ts"));
    }

    #[test]
    fn test_mode_defines_present() {
        let config = project_config(Path::new("/proj"), None, Mode::Development, None);
        assert_eq!(
            config.defines.get("process.env.NODE_ENV").map(String::as_str),
            Some("\"development\"")
        );
    }
}
