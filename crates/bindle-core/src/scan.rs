//! Import specifier scanning.
//!
//! Extracts import specifiers from script and stylesheet sources without a
//! full parser. The scanner is comment- and string-aware: specifiers inside
//! comments, string literals, or template literals are never reported.

use rustc_hash::FxHashMap as HashMap;

/// An import discovered in a script source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Specifier exactly as written.
    pub specifier: String,
    /// Whether this was a dynamic `import(...)` (a code split point).
    pub dynamic: bool,
    /// Line number (1-indexed, best-effort).
    pub line: u32,
}

/// Kind of reference found in a stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssRefKind {
    /// `@import "..."` or `@import url(...)`: another stylesheet.
    Import,
    /// `url(...)` inside a declaration: a static asset.
    Url,
}

/// A reference discovered in a stylesheet source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRef {
    pub specifier: String,
    pub kind: CssRefKind,
}

/// Scan script source for import specifiers.
///
/// Returns imports in first-appearance order, deduplicated by specifier. A
/// specifier that is imported both statically and dynamically is reported as
/// static, since it would never split into its own chunk anyway.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<Import> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut results: Vec<Import> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::default();
    let mut line: u32 = 1;
    let mut i = 0;

    let mut push = |results: &mut Vec<Import>,
                    seen: &mut HashMap<String, usize>,
                    spec: String,
                    dynamic: bool,
                    line: u32| {
        if spec.is_empty() {
            return;
        }
        if let Some(&idx) = seen.get(&spec) {
            if !dynamic {
                results[idx].dynamic = false;
            }
        } else {
            seen.insert(spec.clone(), results.len());
            results.push(Import {
                specifier: spec,
                dynamic,
                line,
            });
        }
    };

    while i < len {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'/' => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                i = skip_block_comment(bytes, i, &mut line);
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
            }
            b'`' => {
                i = skip_template(bytes, i, &mut line);
            }
            _ if at_keyword(bytes, i, b"import") => {
                i = scan_import_at(bytes, i, &mut line, &mut |spec, dynamic, line| {
                    push(&mut results, &mut seen, spec, dynamic, line);
                });
            }
            _ if at_keyword(bytes, i, b"export") => {
                i = scan_export_at(bytes, i, &mut line, &mut |spec, line| {
                    push(&mut results, &mut seen, spec, false, line);
                });
            }
            _ => i += 1,
        }
    }

    results
}

/// Scan stylesheet source for `@import` and `url()` references.
///
/// External references (`http://`, `https://`, `//`, `data:`, fragments) are
/// skipped. Results are deduplicated, keeping first-appearance order.
#[must_use]
pub fn scan_css_refs(source: &str) -> Vec<CssRef> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut results: Vec<CssRef> = Vec::new();
    let mut i = 0;

    let mut push = |results: &mut Vec<CssRef>, spec: String, kind: CssRefKind| {
        if spec.is_empty() || is_external_css_ref(&spec) {
            return;
        }
        if !results.iter().any(|r| r.specifier == spec && r.kind == kind) {
            results.push(CssRef {
                specifier: spec,
                kind,
            });
        }
    };

    while i < len {
        match bytes[i] {
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                let mut line = 0;
                i = skip_block_comment(bytes, i, &mut line);
            }
            b'@' if bytes[i..].starts_with(b"@import") => {
                i += 7;
                let mut line = 0;
                i = skip_ws(bytes, i, &mut line);
                if let Some((spec, end)) = read_url_token(bytes, i) {
                    push(&mut results, spec, CssRefKind::Import);
                    i = end;
                } else if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                    let (spec, end) = read_string(bytes, i);
                    push(&mut results, spec, CssRefKind::Import);
                    i = end;
                }
            }
            b'u' if at_css_ident(bytes, i, b"url") => {
                if let Some((spec, end)) = read_url_token(bytes, i) {
                    push(&mut results, spec, CssRefKind::Url);
                    i = end;
                } else {
                    i += 3;
                }
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
            }
            _ => i += 1,
        }
    }

    results
}

fn is_external_css_ref(spec: &str) -> bool {
    spec.starts_with("data:")
        || spec.starts_with("http://")
        || spec.starts_with("https://")
        || spec.starts_with("//")
        || spec.starts_with('#')
}

pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Keyword match with word boundaries on both sides.
pub(crate) fn at_keyword(bytes: &[u8], i: usize, kw: &[u8]) -> bool {
    if !bytes[i..].starts_with(kw) {
        return false;
    }
    if i > 0 && (is_ident_byte(bytes[i - 1]) || bytes[i - 1] == b'.') {
        return false;
    }
    let after = i + kw.len();
    after >= bytes.len() || !is_ident_byte(bytes[after])
}

/// CSS identifier match: `-` counts as an identifier byte, so `border-url(`
/// does not match `url(`.
fn at_css_ident(bytes: &[u8], i: usize, kw: &[u8]) -> bool {
    if !bytes[i..].starts_with(kw) {
        return false;
    }
    if i > 0 && (is_ident_byte(bytes[i - 1]) || bytes[i - 1] == b'-') {
        return false;
    }
    bytes.get(i + kw.len()) == Some(&b'(')
}

pub(crate) fn skip_ws(bytes: &[u8], mut i: usize, line: &mut u32) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        if bytes[i] == b'\n' {
            *line += 1;
        }
        i += 1;
    }
    i
}

pub(crate) fn skip_block_comment(bytes: &[u8], mut i: usize, line: &mut u32) -> usize {
    i += 2;
    while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
        if bytes[i] == b'\n' {
            *line += 1;
        }
        i += 1;
    }
    (i + 2).min(bytes.len())
}

/// Skip a `"` or `'` string literal. Returns the position after the closing
/// quote (or end of line for an unterminated literal).
pub(crate) fn skip_string(bytes: &[u8], mut i: usize) -> usize {
    let quote = bytes[i];
    i += 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

pub(crate) fn skip_template(bytes: &[u8], mut i: usize, line: &mut u32) -> usize {
    i += 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => {
                *line += 1;
                i += 1;
            }
            b'`' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Read a string literal at `i` (any quote). Returns (contents, end).
pub(crate) fn read_string(bytes: &[u8], mut i: usize) -> (String, usize) {
    let quote = bytes[i];
    i += 1;
    let start = i;
    while i < bytes.len() && bytes[i] != quote {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        i += 1;
    }
    let spec = String::from_utf8_lossy(&bytes[start..i.min(bytes.len())]).into_owned();
    (spec, (i + 1).min(bytes.len()))
}

/// Read a CSS `url(...)` token at `i` (pointing at `url`). Returns the inner
/// specifier and the position after the closing paren.
pub(crate) fn read_url_token(bytes: &[u8], i: usize) -> Option<(String, usize)> {
    if !bytes[i..].starts_with(b"url") {
        return None;
    }
    let mut j = i + 3;
    if bytes.get(j) != Some(&b'(') {
        return None;
    }
    j += 1;
    let mut line = 0;
    j = skip_ws(bytes, j, &mut line);
    if j < bytes.len() && (bytes[j] == b'"' || bytes[j] == b'\'') {
        let (spec, end) = read_string(bytes, j);
        let mut k = skip_ws(bytes, end, &mut line);
        if bytes.get(k) == Some(&b')') {
            k += 1;
        }
        Some((spec, k))
    } else {
        let start = j;
        while j < bytes.len() && bytes[j] != b')' && bytes[j] != b'\n' {
            j += 1;
        }
        let spec = String::from_utf8_lossy(&bytes[start..j]).trim().to_string();
        if bytes.get(j) == Some(&b')') {
            j += 1;
        }
        Some((spec, j))
    }
}

/// Handle the `import` keyword at `i`. Calls `found(spec, dynamic, line)` if
/// a specifier was extracted; returns the position to continue scanning from.
fn scan_import_at(
    bytes: &[u8],
    i: usize,
    line: &mut u32,
    found: &mut dyn FnMut(String, bool, u32),
) -> usize {
    let after_kw = i + 6;
    let j = skip_ws(bytes, after_kw, line);

    // import.meta: not an import statement
    if bytes.get(j) == Some(&b'.') {
        return after_kw;
    }

    // Dynamic import: import("...")
    if bytes.get(j) == Some(&b'(') {
        let k = skip_ws(bytes, j + 1, line);
        if k < bytes.len() && (bytes[k] == b'"' || bytes[k] == b'\'' || bytes[k] == b'`') {
            let (spec, end) = read_string(bytes, k);
            found(spec, true, *line);
            return end;
        }
        // Non-literal argument: cannot be followed statically.
        return j + 1;
    }

    // Type-only import: skip the whole statement.
    if at_keyword(bytes, j, b"type") {
        return skip_to_statement_end(bytes, j, line);
    }

    // Side-effect import: import "specifier"
    if j < bytes.len() && (bytes[j] == b'"' || bytes[j] == b'\'' || bytes[j] == b'`') {
        let (spec, end) = read_string(bytes, j);
        found(spec, false, *line);
        return end;
    }

    // Clause import: scan ahead for `from "specifier"`.
    let mut k = j;
    let limit = (j + 1000).min(bytes.len());
    while k < limit {
        if bytes[k] == b'\n' {
            *line += 1;
        }
        if at_keyword(bytes, k, b"from") {
            let m = skip_ws(bytes, k + 4, line);
            if m < bytes.len() && (bytes[m] == b'"' || bytes[m] == b'\'' || bytes[m] == b'`') {
                let (spec, end) = read_string(bytes, m);
                found(spec, false, *line);
                return end;
            }
        }
        if bytes[k] == b';' {
            break;
        }
        k += 1;
    }
    after_kw
}

/// Handle the `export` keyword at `i`, looking for `export ... from "..."`.
fn scan_export_at(
    bytes: &[u8],
    i: usize,
    line: &mut u32,
    found: &mut dyn FnMut(String, u32),
) -> usize {
    let after_kw = i + 6;
    let j = skip_ws(bytes, after_kw, line);

    if at_keyword(bytes, j, b"type") {
        return skip_to_statement_end(bytes, j, line);
    }

    // Only `export {...} from` and `export * [as ns] from` carry specifiers.
    if bytes.get(j) != Some(&b'{') && bytes.get(j) != Some(&b'*') {
        return after_kw;
    }

    let mut k = j;
    let limit = (j + 500).min(bytes.len());
    while k < limit {
        if bytes[k] == b'\n' {
            *line += 1;
        }
        if at_keyword(bytes, k, b"from") {
            let m = skip_ws(bytes, k + 4, line);
            if m < bytes.len() && (bytes[m] == b'"' || bytes[m] == b'\'' || bytes[m] == b'`') {
                let (spec, end) = read_string(bytes, m);
                found(spec, *line);
                return end;
            }
        }
        if bytes[k] == b';' {
            break;
        }
        k += 1;
    }
    after_kw
}

/// Skip forward past the terminating `;` (or end of input), stepping over
/// string literals so a `;` inside one does not end the statement early.
fn skip_to_statement_end(bytes: &[u8], mut i: usize, line: &mut u32) -> usize {
    let limit = (i + 2000).min(bytes.len());
    while i < limit {
        match bytes[i] {
            b'\n' => {
                *line += 1;
                i += 1;
            }
            b'"' | b'\'' | b'`' => i = skip_string(bytes, i),
            b';' => return i + 1,
            _ => i += 1,
        }
    }
    i
}
