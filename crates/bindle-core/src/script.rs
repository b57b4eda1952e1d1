//! Script source transforms.
//!
//! Two scanner-based passes run on every script module before imports are
//! scanned: type-only import/export stripping (so `import type` never
//! creates a graph edge) and define replacement (`process.env.NODE_ENV`,
//! `import.meta.env.*`, user defines). Neither pass is a transpiler; both
//! preserve line numbers by replacing stripped statements with blanks.

use rustc_hash::FxHashMap as HashMap;

/// Remove `import type ...` and `export type ...` statements.
///
/// Stripped statements are blanked (newlines kept) so line numbers in the
/// output still match the source.
#[must_use]
pub fn strip_type_statements(source: &str) -> String {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let start = i;
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
                out.push_str(&source[start..i]);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(len);
                out.push_str(&source[start..i]);
            }
            b'"' | b'\'' | b'`' => {
                let start = i;
                i = skip_string(bytes, i);
                out.push_str(&source[start..i]);
            }
            _ if (at_keyword(bytes, i, b"import") || at_keyword(bytes, i, b"export"))
                && followed_by_type(bytes, i + 6) =>
            {
                let end = statement_end(bytes, i);
                // Keep the newlines, drop everything else.
                for &b in &bytes[i..end] {
                    if b == b'\n' {
                        out.push('\n');
                    }
                }
                i = end;
            }
            _ => {
                let ch_len = source[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&source[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    out
}

/// Replace define keys with their values, outside comments and strings, at
/// identifier boundaries only. Longer keys win over their prefixes, so
/// `import.meta.env.MODE` is tried before `import.meta.env`.
#[must_use]
pub fn apply_defines(source: &str, defines: &HashMap<String, String>) -> String {
    if defines.is_empty() {
        return source.to_string();
    }

    let mut keys: Vec<&String> = defines.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    'outer: while i < len {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let start = i;
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
                out.push_str(&source[start..i]);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(len);
                out.push_str(&source[start..i]);
            }
            b'"' | b'\'' | b'`' => {
                let start = i;
                i = skip_string(bytes, i);
                out.push_str(&source[start..i]);
            }
            _ => {
                for key in &keys {
                    if bytes[i..].starts_with(key.as_bytes()) && at_boundary(bytes, i, key.len()) {
                        out.push_str(&defines[*key]);
                        i += key.len();
                        continue 'outer;
                    }
                }
                let ch_len = source[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&source[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    out
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn at_keyword(bytes: &[u8], i: usize, kw: &[u8]) -> bool {
    if !bytes[i..].starts_with(kw) {
        return false;
    }
    if i > 0 && (is_ident_byte(bytes[i - 1]) || bytes[i - 1] == b'.') {
        return false;
    }
    let after = i + kw.len();
    after >= bytes.len() || !is_ident_byte(bytes[after])
}

/// A define key matches only when not embedded in a longer dotted path or
/// identifier on either side.
fn at_boundary(bytes: &[u8], i: usize, key_len: usize) -> bool {
    if i > 0 && (is_ident_byte(bytes[i - 1]) || bytes[i - 1] == b'.') {
        return false;
    }
    let after = i + key_len;
    if after < bytes.len() && (is_ident_byte(bytes[after]) || bytes[after] == b'.') {
        return false;
    }
    true
}

/// After `import`/`export`, is the next token the `type` keyword starting a
/// type-only statement? `import type from './x'` imports a binding named
/// `type` and is not matched.
fn followed_by_type(bytes: &[u8], mut i: usize) -> bool {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if !at_keyword(bytes, i, b"type") {
        return false;
    }
    let mut j = i + 4;
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    !bytes[j..].starts_with(b"from")
}

fn skip_string(bytes: &[u8], mut i: usize) -> usize {
    let quote = bytes[i];
    i += 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if quote != b'`' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Position just past the `;` ending the statement at `i`, stepping over
/// string literals.
fn statement_end(bytes: &[u8], mut i: usize) -> usize {
    let limit = (i + 2000).min(bytes.len());
    while i < limit {
        match bytes[i] {
            b'"' | b'\'' | b'`' => i = skip_string(bytes, i),
            b';' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_strip_import_type() {
        let src = "import type { Props } from \"./types\";\nimport { real } from \"./real\";\n";
        let out = strip_type_statements(src);
        assert!(!out.contains("Props"));
        assert!(out.contains("real"));
        // Line count preserved
        assert_eq!(src.lines().count(), out.lines().count());
    }

    #[test]
    fn test_strip_export_type() {
        let out = strip_type_statements("export type { A } from './a';\nconst x = 1;");
        assert!(!out.contains("{ A }"));
        assert!(out.contains("const x = 1;"));
    }

    #[test]
    fn test_strip_multiline_type_import() {
        let src = "import type {\n  A,\n  B,\n} from \"./types\";\nlet y = 2;";
        let out = strip_type_statements(src);
        assert!(!out.contains("./types"));
        assert!(out.contains("let y = 2;"));
    }

    #[test]
    fn test_strip_leaves_value_imports() {
        let src = "import { type as alias } from \"./x\";";
        // `type` here is a named import, not a type-only statement prefix,
        // but the scanner only looks at the token right after `import`.
        let out = strip_type_statements(src);
        assert_eq!(out, src);
    }

    #[test]
    fn test_strip_ignores_comments_and_strings() {
        let src = "// import type { X } from './x';\nconst s = \"import type Y\";";
        assert_eq!(strip_type_statements(src), src);
    }

    #[test]
    fn test_apply_defines_basic() {
        let out = apply_defines(
            "if (process.env.NODE_ENV === \"production\") { run(); }",
            &defines(&[("process.env.NODE_ENV", "\"production\"")]),
        );
        assert_eq!(out, "if (\"production\" === \"production\") { run(); }");
    }

    #[test]
    fn test_apply_defines_boundary() {
        let d = defines(&[("DEBUG", "false")]);
        assert_eq!(apply_defines("if (DEBUG) x();", &d), "if (false) x();");
        assert_eq!(apply_defines("const DEBUGGER = 1;", &d), "const DEBUGGER = 1;");
        assert_eq!(apply_defines("obj.DEBUG = 1;", &d), "obj.DEBUG = 1;");
        assert_eq!(apply_defines("DEBUG.flag", &d), "DEBUG.flag");
    }

    #[test]
    fn test_apply_defines_not_in_strings_or_comments() {
        let d = defines(&[("process.env.NODE_ENV", "\"production\"")]);
        let src = "const s = \"process.env.NODE_ENV\"; // process.env.NODE_ENV";
        assert_eq!(apply_defines(src, &d), src);
    }

    #[test]
    fn test_apply_defines_longest_key_wins() {
        let d = defines(&[
            ("import.meta.env.MODE", "\"development\""),
            ("import.meta.env.DEV", "true"),
        ]);
        let out = apply_defines("console.log(import.meta.env.MODE, import.meta.env.DEV);", &d);
        assert_eq!(out, "console.log(\"development\", true);");
    }

    #[test]
    fn test_apply_defines_empty_table() {
        let src = "const a = 1;";
        assert_eq!(apply_defines(src, &HashMap::default()), src);
    }
}
