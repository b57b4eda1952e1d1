//! `bindle build` command implementation.
//!
//! Runs one build and writes the output set to the output directory. With
//! `--json`, prints exactly one JSON object to stdout describing the result;
//! error codes stay SCREAMING_SNAKE_CASE so scripts can match on them.

use bindle_core::{Bundler, Mode};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Build command action.
#[derive(Debug, Clone)]
pub struct BuildAction {
    /// Working directory (project root).
    pub cwd: PathBuf,
    /// Entry point file (None = default `src/main.tsx`).
    pub entry: Option<PathBuf>,
    /// Output directory (None = default `dist`).
    pub out_dir: Option<PathBuf>,
    /// Explicit `--mode` flag value.
    pub mode: Option<String>,
    /// Split async chunks on dynamic imports.
    pub splitting: bool,
    /// Content-hash non-primary chunk filenames.
    pub hashed_chunks: bool,
}

/// JSON output for the build command (stable contract).
#[derive(Serialize)]
struct BuildResultJson {
    ok: bool,
    mode: String,
    out_dir: String,
    files: Vec<FileJson>,
    modules: usize,
    duration_ms: u64,
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<BuildErrorJson>,
}

#[derive(Serialize)]
struct FileJson {
    name: String,
    size_bytes: usize,
}

#[derive(Serialize)]
struct BuildErrorJson {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

/// Run the build command.
pub fn run(action: &BuildAction, json: bool) -> Result<()> {
    let start = Instant::now();
    let mode = Mode::detect(action.mode.as_deref());
    let config = super::project_config(
        &action.cwd,
        action.entry.as_ref(),
        mode,
        action.out_dir.as_ref(),
    );
    let mut config = config;
    config.splitting = action.splitting;
    config.hashed_chunks = action.hashed_chunks;

    let bundler = Bundler::with_default_plugins(&config);
    let result = bundler.build(&config);
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(output) => {
            output.write_to(&config.out_dir).into_diagnostic()?;

            if json {
                let json_result = BuildResultJson {
                    ok: true,
                    mode: mode.as_str().to_string(),
                    out_dir: config.out_dir.display().to_string(),
                    files: output
                        .files
                        .iter()
                        .map(|f| FileJson {
                            name: f.name.clone(),
                            size_bytes: f.contents.len(),
                        })
                        .collect(),
                    modules: output.modules,
                    duration_ms,
                    warnings: output.warnings.clone(),
                    error: None,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json_result).into_diagnostic()?
                );
            } else {
                for warning in &output.warnings {
                    eprintln!("  warning: {warning}");
                }
                for file in &output.files {
                    println!("  {:>10}  {}", human_size(file.contents.len()), file.name);
                }
                println!(
                    "\n  {} modules -> {} files in {} ms ({})",
                    output.modules,
                    output.files.len(),
                    duration_ms,
                    mode.as_str()
                );
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let json_result = BuildResultJson {
                    ok: false,
                    mode: mode.as_str().to_string(),
                    out_dir: config.out_dir.display().to_string(),
                    files: Vec::new(),
                    modules: 0,
                    duration_ms,
                    warnings: Vec::new(),
                    error: Some(BuildErrorJson {
                        code: e.code.to_string(),
                        message: e.message.clone(),
                        path: e.path.clone(),
                    }),
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json_result).into_diagnostic()?
                );
                std::process::exit(1);
            }
            Err(miette::miette!("{e}"))
        }
    }
}

fn human_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_build_action_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("main.tsx"), "console.log(\"hi\");\n").unwrap();

        let action = BuildAction {
            cwd: dir.path().to_path_buf(),
            entry: None,
            out_dir: None,
            mode: Some("production".to_string()),
            splitting: true,
            hashed_chunks: false,
        };
        run(&action, false).unwrap();

        assert!(dir.path().join("dist/index.js").is_file());
        assert!(dir.path().join("dist/manifest.json").is_file());
    }
}
