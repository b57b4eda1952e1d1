//! Stylesheet compilation and rewriting.
//!
//! `.scss`/`.sass` sources compile to CSS with grass. Production builds
//! minify the result (comment removal and whitespace collapse) after `url()`
//! references have been rewritten to fingerprinted asset names.

use crate::scan::{read_string, read_url_token, skip_block_comment, skip_string, skip_ws};
use std::path::Path;
use thiserror::Error;

/// Stylesheet processing error.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("sass error in {path}: {message}")]
    Compile { path: String, message: String },
}

/// Compile a Sass/SCSS source to expanded CSS.
///
/// The file's parent directory is added as a load path so `@use` and Sass
/// `@import` partials resolve next to the file.
pub fn compile_sass(source: &str, path: &Path) -> Result<String, StyleError> {
    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    if let Some(parent) = path.parent() {
        options = options.load_path(parent);
    }

    grass::from_string(source.to_string(), &options).map_err(|e| StyleError::Compile {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Remove `@import` statements whose specifier the callback recognizes.
///
/// An imported sheet is inlined into the chunk ahead of its importer, so the
/// `@import` line itself must not survive: the reference would point at a
/// file that is never emitted, and `@import` is only valid at the top of a
/// sheet. References the callback rejects (externals, `http://` URLs) stay.
#[must_use]
pub fn strip_imports(css: &str, resolved: impl Fn(&str) -> bool) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut line = 0u32;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let start = i;
            i = skip_block_comment(bytes, i, &mut line);
            out.push_str(&css[start..i]);
            continue;
        }

        if bytes[i] == b'"' || bytes[i] == b'\'' {
            let start = i;
            i = skip_string(bytes, i);
            out.push_str(&css[start..i]);
            continue;
        }

        if bytes[i] == b'@' && bytes[i..].starts_with(b"@import") {
            let start = i;
            let mut j = skip_ws(bytes, i + 7, &mut line);

            let spec = if let Some((spec, end)) = read_url_token(bytes, j) {
                j = end;
                Some(spec)
            } else if j < bytes.len() && (bytes[j] == b'"' || bytes[j] == b'\'') {
                let (spec, end) = read_string(bytes, j);
                j = end;
                Some(spec)
            } else {
                None
            };

            if spec.as_deref().is_some_and(&resolved) {
                // Drop the whole statement: any media query, the terminating
                // semicolon, and one trailing newline.
                while j < bytes.len() && bytes[j] != b';' && bytes[j] != b'\n' {
                    j += 1;
                }
                if bytes.get(j) == Some(&b';') {
                    j += 1;
                }
                if bytes.get(j) == Some(&b'\n') {
                    j += 1;
                }
                i = j;
                continue;
            }

            let end = j.max(start + 7);
            out.push_str(&css[start..end]);
            i = end;
            continue;
        }

        // Advance one character (not one byte) to keep UTF-8 intact.
        let ch_len = css[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&css[i..i + ch_len]);
        i += ch_len;
    }

    out
}

/// Rewrite `url(...)` references through a resolver callback.
///
/// The callback receives the raw specifier and returns the replacement URL,
/// or `None` to leave the reference untouched (externals, data URIs).
#[must_use]
pub fn rewrite_urls(css: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut i = 0;

    while i < bytes.len() {
        // Copy comments through untouched.
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let start = i;
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            out.push_str(&css[start..i]);
            continue;
        }

        if bytes[i..].starts_with(b"url(")
            && (i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'-' || bytes[i - 1] == b'_'))
        {
            let inner_start = i + 4;
            if let Some(close) = css[inner_start..].find(')') {
                let inner = &css[inner_start..inner_start + close];
                let spec = inner.trim().trim_matches('"').trim_matches('\'');
                if let Some(url) = resolve(spec) {
                    out.push_str("url(");
                    out.push_str(&url);
                    out.push(')');
                } else {
                    out.push_str(&css[i..inner_start + close + 1]);
                }
                i = inner_start + close + 1;
                continue;
            }
        }

        // Advance one character (not one byte) to keep UTF-8 intact.
        let ch_len = css[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&css[i..i + ch_len]);
        i += ch_len;
    }

    out
}

/// Minify CSS: strip comments, collapse whitespace.
#[must_use]
pub fn minify(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut in_comment = false;
    let mut last = ' ';

    for c in css.chars() {
        if in_comment {
            if last == '*' && c == '/' {
                in_comment = false;
                last = ' ';
                continue;
            }
            last = c;
            continue;
        }

        if last == '/' && c == '*' {
            in_comment = true;
            out.pop();
            last = c;
            continue;
        }

        if c.is_whitespace() {
            if !last.is_whitespace() && last != '{' && last != ';' && last != ':' && last != ',' {
                out.push(' ');
            }
            last = ' ';
            continue;
        }

        if last == ' ' && matches!(c, '{' | '}' | ';' | ':' | ',') {
            out.pop();
        }

        out.push(c);
        last = c;
    }

    out.trim().to_string()
}
