//! `.env` file loading.
//!
//! Loads `.env`, `.env.local`, `.env.[mode]`, `.env.[mode].local` in order,
//! later files overriding earlier ones. Variables already set in the process
//! environment take precedence and are never overwritten. Loaded variables
//! become define replacements on `process.env.*` in script sources.

use crate::config::Mode;
use rustc_hash::FxHashMap as HashMap;
use std::path::Path;

/// Parse the contents of one `.env` file.
///
/// Supports `KEY=value`, double-quoted values with escape sequences,
/// single-quoted literal values, an optional `export ` prefix, full-line and
/// inline comments.
#[must_use]
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut env = HashMap::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq) = line.find('=') else {
            continue;
        };

        let key = line[..eq].trim();
        let key = key.strip_prefix("export ").unwrap_or(key).trim();
        if key.is_empty() {
            continue;
        }

        let raw = line[eq + 1..].trim();
        let value = match raw.bytes().next() {
            Some(b'"') => unescape_double_quoted(&raw[1..]),
            Some(b'\'') => raw[1..]
                .split_once('\'')
                .map_or_else(|| raw[1..].to_string(), |(inner, _)| inner.to_string()),
            _ => match raw.find(" #") {
                Some(pos) => raw[..pos].trim_end().to_string(),
                None => raw.to_string(),
            },
        };

        env.insert(key.to_string(), value);
    }

    env
}

fn unescape_double_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
    out
}

/// Load the `.env` file family from the project root for the given mode.
///
/// Order: `.env`, `.env.local`, `.env.[mode]`, `.env.[mode].local`; later
/// files override earlier ones. Keys already present in the process
/// environment are dropped so the real environment wins.
#[must_use]
pub fn load_env_files(root: &Path, mode: Mode) -> HashMap<String, String> {
    let files = [
        root.join(".env"),
        root.join(".env.local"),
        root.join(format!(".env.{}", mode.as_str())),
        root.join(format!(".env.{}.local", mode.as_str())),
    ];

    let mut env = HashMap::default();
    for file in &files {
        if let Ok(content) = std::fs::read_to_string(file) {
            env.extend(parse_env_file(&content));
        }
    }

    env.retain(|key, _| std::env::var(key).is_err());
    env
}

/// Build the define table for a mode and a loaded `.env` map.
///
/// Every loaded variable is exposed as `process.env.KEY`. Built-ins:
/// `process.env.NODE_ENV`, `import.meta.env.MODE`, `import.meta.env.DEV`,
/// `import.meta.env.PROD`.
#[must_use]
pub fn define_replacements(env: &HashMap<String, String>, mode: Mode) -> HashMap<String, String> {
    let mut defines = HashMap::default();

    defines.insert(
        "process.env.NODE_ENV".to_string(),
        quote_js(mode.as_str()),
    );
    defines.insert("import.meta.env.MODE".to_string(), quote_js(mode.as_str()));
    defines.insert("import.meta.env.DEV".to_string(), mode.is_dev().to_string());
    defines.insert(
        "import.meta.env.PROD".to_string(),
        (!mode.is_dev()).to_string(),
    );

    for (key, value) in env {
        defines.insert(format!("process.env.{key}"), quote_js(value));
    }

    defines
}

/// Quote a value as a JS string literal.
fn quote_js(value: &str) -> String {
    format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    )
}
