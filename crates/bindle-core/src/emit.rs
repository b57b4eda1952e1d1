//! Chunk code generation.
//!
//! Turns an assembled chunk into a self-contained script: every member
//! module becomes a `__bindle.define(id, factory)` registration, import and
//! export statements are rewritten to registry calls, and an entry chunk
//! ends with a `__bindle.require(entry)` kick-off. Stylesheets in the chunk
//! either concatenate into the chunk's CSS output (production) or become
//! style-tag injector modules (development).
//!
//! The rewriter is the same kind of scanner as the import scanner: it walks
//! bytes, steps over comments and strings, and only touches `import` and
//! `export` statements. Everything else passes through untouched.

use crate::assets::AssetCollection;
use crate::chunks::{Chunk, ChunkGraph, ChunkId, ChunkKind};
use crate::config::Mode;
use crate::error::BuildError;
use crate::graph::{Module, ModuleGraph, ModuleId, ModuleKind};
use crate::scan::{at_keyword, is_ident_byte, read_string, skip_string};
use crate::style;
use rustc_hash::FxHashMap as HashMap;

/// Shared state for emitting every chunk of one build.
pub struct EmitContext<'a> {
    pub graph: &'a ModuleGraph,
    pub chunk_graph: &'a ChunkGraph,
    pub assets: &'a AssetCollection,
    /// Final output filename per chunk, needed for async chunk loading.
    pub chunk_files: &'a HashMap<ChunkId, String>,
    pub mode: Mode,
}

/// Generated code for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkCode {
    pub js: String,
    /// Concatenated stylesheet output. Empty in development, where styles
    /// ship inside the JS as injector modules.
    pub css: String,
    pub warnings: Vec<String>,
}

/// Registry runtime prepended to every chunk. Guarded so that loading a
/// second chunk reuses the registry installed by the first.
const RUNTIME: &str = r#"var __bindle = (typeof window !== "undefined" && window.__bindle) || (function () {
  var modules = {};
  var cache = {};
  var loading = {};
  function define(id, factory) { modules[id] = factory; }
  function require(id) {
    var cached = cache[id];
    if (cached) return cached.exports;
    var module = { exports: {} };
    cache[id] = module;
    modules[id](module, module.exports, require);
    return module.exports;
  }
  function external(name) {
    var registry = (typeof window !== "undefined" && window.__bindle_externals) || {};
    if (!(name in registry)) {
      throw new Error('external module "' + name + '" is not provided; set window.__bindle_externals["' + name + '"]');
    }
    return registry[name];
  }
  function load(file, id) {
    if (modules[id]) return Promise.resolve(require(id));
    if (!loading[file]) {
      loading[file] = new Promise(function (resolve, reject) {
        var script = document.createElement("script");
        script.src = "/" + file;
        script.onload = resolve;
        script.onerror = function () { reject(new Error("failed to load chunk " + file)); };
        document.head.appendChild(script);
      });
    }
    return loading[file].then(function () { return require(id); });
  }
  var api = { define: define, require: require, external: external, load: load };
  if (typeof window !== "undefined") window.__bindle = api;
  return api;
})();
"#;

/// Emit one chunk.
pub fn emit_chunk(chunk: &Chunk, ctx: &EmitContext) -> Result<ChunkCode, BuildError> {
    let mut js = String::with_capacity(4096);
    js.push_str(RUNTIME);

    let mut css_parts: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    for &module_id in &chunk.modules {
        let module = ctx.graph.get(module_id).ok_or_else(|| {
            BuildError::new(
                "CHUNK_MODULE_MISSING",
                format!("chunk '{}' references unknown module {module_id}", chunk.name),
            )
        })?;

        match module.kind {
            ModuleKind::Script => {
                let body = lower_script(module, module_id, chunk, ctx, &mut warnings)?;
                push_define(&mut js, module_id, &body);
            }
            ModuleKind::Json => {
                let body = format!("exports.default = {};", module.source.trim());
                push_define(&mut js, module_id, &body);
            }
            ModuleKind::Stylesheet | ModuleKind::Sass => {
                // Imported sheets are inlined ahead of this one, so their
                // `@import` statements must not reach the output.
                let css = style::strip_imports(&module.source, |spec| {
                    ctx.graph.resolve_specifier(&module.path, spec).is_some()
                });
                let css = style::rewrite_urls(&css, |spec| {
                    ctx.graph
                        .resolve_specifier(&module.path, spec)
                        .and_then(|dep| ctx.graph.get(dep))
                        .and_then(|dep| ctx.assets.url_for(&dep.path))
                });
                if ctx.mode.is_dev() {
                    let style_deps: Vec<ModuleId> = module
                        .dependencies
                        .iter()
                        .copied()
                        .filter(|&dep| {
                            ctx.graph.get(dep).is_some_and(|m| m.kind.is_style())
                        })
                        .collect();
                    let body = style_inject_body(module, &css, &style_deps);
                    push_define(&mut js, module_id, &body);
                } else {
                    css_parts.push(css);
                }
            }
            ModuleKind::Asset | ModuleKind::Html => {}
        }
    }

    if let Some(entry) = chunk.entry {
        if chunk.kind != ChunkKind::Async {
            js.push_str(&format!("__bindle.require({entry});\n"));
        }
    }

    let mut css = css_parts.join("\n");
    if !ctx.mode.is_dev() && !css.is_empty() {
        css = style::minify(&css);
    }

    Ok(ChunkCode { js, css, warnings })
}

fn push_define(js: &mut String, id: ModuleId, body: &str) {
    js.push_str(&format!(
        "__bindle.define({id}, function (module, exports, __require) {{\n{body}\n}});\n"
    ));
}

/// Factory body for a stylesheet module in development: export the CSS text
/// and inject it into the page as a style tag.
fn style_inject_body(module: &Module, css: &str, style_deps: &[ModuleId]) -> String {
    let stem = std::path::Path::new(&module.path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("style");

    let mut body = String::new();
    // Pull in @import dependencies before this sheet, matching cascade
    // order.
    for &dep in style_deps {
        body.push_str(&format!("__require({dep});\n"));
    }
    body.push_str(&format!("var css = {};\n", js_string(css)));
    body.push_str("exports.default = css;\n");
    body.push_str("var style = document.createElement(\"style\");\n");
    body.push_str(&format!(
        "style.setAttribute(\"data-bindle\", {});\n",
        js_string(stem)
    ));
    body.push_str("style.textContent = css;\n");
    body.push_str("document.head.appendChild(style);");
    body
}

/// Escape a string as a JS double-quoted literal.
fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Rewrite a script module's import/export statements to registry calls.
fn lower_script(
    module: &Module,
    module_id: ModuleId,
    chunk: &Chunk,
    ctx: &EmitContext,
    warnings: &mut Vec<String>,
) -> Result<String, BuildError> {
    let mut lowerer = Lowerer {
        module,
        module_id,
        chunk,
        ctx,
        src: &module.source,
        bytes: module.source.as_bytes(),
        out: String::with_capacity(module.source.len()),
        tail: Vec::new(),
        warnings,
    };
    lowerer.run()?;
    let Lowerer { mut out, tail, .. } = lowerer;
    if !tail.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        for line in tail {
            out.push_str(&line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Parsed import clause: `import default, * as ns, { a as b } from "..."`.
#[derive(Default)]
struct ImportClause {
    default: Option<String>,
    namespace: Option<String>,
    /// (imported, local) pairs.
    named: Vec<(String, String)>,
}

impl ImportClause {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty()
    }
}

struct Lowerer<'a> {
    module: &'a Module,
    module_id: ModuleId,
    chunk: &'a Chunk,
    ctx: &'a EmitContext<'a>,
    src: &'a str,
    bytes: &'a [u8],
    out: String,
    /// `exports.name = value;` lines appended after the module body.
    tail: Vec<String>,
    warnings: &'a mut Vec<String>,
}

impl Lowerer<'_> {
    fn run(&mut self) -> Result<(), BuildError> {
        let len = self.bytes.len();
        let mut i = 0;
        while i < len {
            match self.bytes[i] {
                b'/' if self.bytes.get(i + 1) == Some(&b'/') => {
                    let start = i;
                    while i < len && self.bytes[i] != b'\n' {
                        i += 1;
                    }
                    self.out.push_str(&self.src[start..i]);
                }
                b'/' if self.bytes.get(i + 1) == Some(&b'*') => {
                    let start = i;
                    i += 2;
                    while i + 1 < len && !(self.bytes[i] == b'*' && self.bytes[i + 1] == b'/') {
                        i += 1;
                    }
                    i = (i + 2).min(len);
                    self.out.push_str(&self.src[start..i]);
                }
                b'"' | b'\'' | b'`' => {
                    let start = i;
                    i = skip_string(self.bytes, i);
                    self.out.push_str(&self.src[start..i]);
                }
                _ if at_keyword(self.bytes, i, b"import") => {
                    i = self.handle_import(i)?;
                }
                _ if at_keyword(self.bytes, i, b"export") => {
                    i = self.handle_export(i)?;
                }
                _ => {
                    let ch_len = self.src[i..].chars().next().map_or(1, char::len_utf8);
                    self.out.push_str(&self.src[i..i + ch_len]);
                    i += ch_len;
                }
            }
        }
        Ok(())
    }

    /// At an `import` keyword. Returns the position to continue copying
    /// from.
    fn handle_import(&mut self, i: usize) -> Result<usize, BuildError> {
        let j = self.skip_ws(i + 6);
        match self.bytes.get(j) {
            // import.meta passes through untouched.
            Some(b'.') => {
                self.out.push_str("import");
                Ok(i + 6)
            }
            Some(b'(') => self.handle_dynamic_import(i, j),
            Some(b'"') | Some(b'\'') => {
                // Side-effect import.
                let (spec, end) = read_string(self.bytes, j);
                let end = self.consume_semi(end);
                let replacement = self.import_replacement(&spec, &ImportClause::default())?;
                self.out.push_str(&replacement);
                Ok(end)
            }
            _ => match self.parse_import_clause(i + 6) {
                Some((clause, spec, end)) => {
                    let replacement = self.import_replacement(&spec, &clause)?;
                    self.out.push_str(&replacement);
                    Ok(end)
                }
                None => {
                    // Not a shape we understand; copy the keyword and move
                    // on.
                    self.out.push_str("import");
                    Ok(i + 6)
                }
            },
        }
    }

    /// `import(...)` with a string literal argument becomes a registry call;
    /// anything else is left alone with a warning.
    fn handle_dynamic_import(&mut self, i: usize, paren: usize) -> Result<usize, BuildError> {
        let k = self.skip_ws(paren + 1);
        if !matches!(self.bytes.get(k), Some(b'"') | Some(b'\'')) {
            self.warnings.push(format!(
                "{}: dynamic import with non-literal specifier is not rewritten",
                self.module.path
            ));
            self.out.push_str("import");
            return Ok(i + 6);
        }
        let (spec, after) = read_string(self.bytes, k);
        let close = self.skip_ws(after);
        if self.bytes.get(close) != Some(&b')') {
            self.out.push_str("import");
            return Ok(i + 6);
        }
        let end = close + 1;

        match self.ctx.graph.resolve_specifier(&self.module.path, &spec) {
            Some(dep_id) => {
                let target = self.ctx.chunk_graph.chunk_for_module(dep_id);
                let in_async_chunk = target
                    .and_then(|tc| self.ctx.chunk_graph.chunks().get(tc))
                    .is_some_and(|c| c.kind == ChunkKind::Async && c.id != self.chunk.id);
                if in_async_chunk {
                    let tc = target.unwrap_or_default();
                    let file = self.ctx.chunk_files.get(&tc).cloned().unwrap_or_default();
                    self.out
                        .push_str(&format!("__bindle.load({}, {dep_id})", js_string(&file)));
                } else {
                    // Same chunk, entry chunk, or shared chunk: already
                    // loaded.
                    self.out
                        .push_str(&format!("Promise.resolve(__require({dep_id}))"));
                }
            }
            None => {
                self.out.push_str(&format!(
                    "Promise.resolve(__bindle.external({}))",
                    js_string(&spec)
                ));
            }
        }
        Ok(end)
    }

    /// Parse `default`, `* as ns`, `{ a, b as c }` groups up to
    /// `from "spec"`. Returns None when the statement does not match.
    fn parse_import_clause(&self, start: usize) -> Option<(ImportClause, String, usize)> {
        let mut clause = ImportClause::default();
        let mut j = self.skip_ws(start);

        loop {
            match self.bytes.get(j)? {
                b'*' => {
                    j = self.skip_ws(j + 1);
                    if !at_keyword(self.bytes, j, b"as") {
                        return None;
                    }
                    j = self.skip_ws(j + 2);
                    let (name, next) = self.read_ident(j)?;
                    clause.namespace = Some(name);
                    j = self.skip_ws(next);
                }
                b'{' => {
                    j = j + 1;
                    loop {
                        j = self.skip_ws(j);
                        if self.bytes.get(j) == Some(&b'}') {
                            j += 1;
                            break;
                        }
                        let (imported, next) = self.read_ident(j)?;
                        j = self.skip_ws(next);
                        let local = if at_keyword(self.bytes, j, b"as") {
                            j = self.skip_ws(j + 2);
                            let (local, next) = self.read_ident(j)?;
                            j = self.skip_ws(next);
                            local
                        } else {
                            imported.clone()
                        };
                        clause.named.push((imported, local));
                        if self.bytes.get(j) == Some(&b',') {
                            j += 1;
                        }
                    }
                    j = self.skip_ws(j);
                }
                b if is_ident_byte(*b) => {
                    if at_keyword(self.bytes, j, b"from") {
                        j = self.skip_ws(j + 4);
                        if !matches!(self.bytes.get(j), Some(b'"') | Some(b'\'')) {
                            return None;
                        }
                        let (spec, end) = read_string(self.bytes, j);
                        let end = self.consume_semi(end);
                        return Some((clause, spec, end));
                    }
                    let (name, next) = self.read_ident(j)?;
                    clause.default = Some(name);
                    j = self.skip_ws(next);
                }
                b',' => j = self.skip_ws(j + 1),
                _ => return None,
            }
        }
    }

    /// Replacement statement for a static import of `spec` with the given
    /// bindings.
    fn import_replacement(
        &mut self,
        spec: &str,
        clause: &ImportClause,
    ) -> Result<String, BuildError> {
        let Some(dep_id) = self.ctx.graph.resolve_specifier(&self.module.path, spec) else {
            // Bare specifier: resolved against the host page's externals
            // registry.
            let source = format!("__bindle.external({})", js_string(spec));
            return Ok(bind_from(clause, &source));
        };

        let dep = self.ctx.graph.get(dep_id).ok_or_else(|| {
            BuildError::new(
                "CHUNK_MODULE_MISSING",
                format!("import of unknown module {dep_id}"),
            )
        })?;

        match dep.kind {
            ModuleKind::Script | ModuleKind::Json => {
                Ok(bind_from(clause, &format!("__require({dep_id})")))
            }
            ModuleKind::Stylesheet | ModuleKind::Sass => {
                if self.ctx.mode.is_dev() {
                    Ok(bind_from(clause, &format!("__require({dep_id})")))
                } else {
                    // Extracted to the chunk's CSS file; JS bindings have
                    // nothing to point at.
                    let mut parts: Vec<String> = Vec::new();
                    if let Some(name) = &clause.default {
                        parts.push(format!("var {name} = undefined;"));
                    }
                    if let Some(name) = &clause.namespace {
                        parts.push(format!("var {name} = undefined;"));
                    }
                    if !clause.named.is_empty() || clause.default.is_some() {
                        self.warnings.push(format!(
                            "{}: stylesheet import bindings from '{spec}' are undefined in production",
                            self.module.path
                        ));
                    }
                    for (_, local) in &clause.named {
                        parts.push(format!("var {local} = undefined;"));
                    }
                    Ok(parts.join(" "))
                }
            }
            ModuleKind::Asset | ModuleKind::Html => {
                let url = match self.ctx.assets.url_for(&dep.path) {
                    Some(url) => url,
                    None => {
                        self.warnings.push(format!(
                            "{}: no emitted asset for '{spec}'",
                            self.module.path
                        ));
                        String::new()
                    }
                };
                let mut parts: Vec<String> = Vec::new();
                if let Some(name) = &clause.default {
                    parts.push(format!("var {name} = {};", js_string(&url)));
                }
                if let Some(name) = &clause.namespace {
                    parts.push(format!("var {name} = {};", js_string(&url)));
                }
                if !clause.named.is_empty() {
                    self.warnings.push(format!(
                        "{}: named imports from asset '{spec}' are not supported",
                        self.module.path
                    ));
                }
                Ok(parts.join(" "))
            }
        }
    }

    /// At an `export` keyword.
    fn handle_export(&mut self, i: usize) -> Result<usize, BuildError> {
        let j = self.skip_ws(i + 6);

        if at_keyword(self.bytes, j, b"default") {
            self.out.push_str("exports.default =");
            return Ok(j + 7);
        }

        match self.bytes.get(j) {
            Some(b'{') => self.handle_export_list(j),
            Some(b'*') => self.handle_export_star(j),
            _ if at_keyword(self.bytes, j, b"function") => {
                let k = self.skip_ws(j + 8);
                let k = if self.bytes.get(k) == Some(&b'*') {
                    self.skip_ws(k + 1)
                } else {
                    k
                };
                if let Some((name, _)) = self.read_ident(k) {
                    self.tail.push(format!("exports.{name} = {name};"));
                }
                Ok(j)
            }
            _ if at_keyword(self.bytes, j, b"async") => {
                let k = self.skip_ws(j + 5);
                if !at_keyword(self.bytes, k, b"function") {
                    self.out.push_str("export");
                    return Ok(i + 6);
                }
                let k = self.skip_ws(k + 8);
                let k = if self.bytes.get(k) == Some(&b'*') {
                    self.skip_ws(k + 1)
                } else {
                    k
                };
                if let Some((name, _)) = self.read_ident(k) {
                    self.tail.push(format!("exports.{name} = {name};"));
                }
                Ok(j)
            }
            _ if at_keyword(self.bytes, j, b"class") => {
                let k = self.skip_ws(j + 5);
                if let Some((name, _)) = self.read_ident(k) {
                    self.tail.push(format!("exports.{name} = {name};"));
                }
                Ok(j)
            }
            _ if at_keyword(self.bytes, j, b"const")
                || at_keyword(self.bytes, j, b"let")
                || at_keyword(self.bytes, j, b"var") =>
            {
                let kw_len = if at_keyword(self.bytes, j, b"const") {
                    5
                } else {
                    3
                };
                for name in self.declarator_names(j + kw_len) {
                    self.tail.push(format!("exports.{name} = {name};"));
                }
                Ok(j)
            }
            _ => {
                // Unrecognized form, leave it in place.
                self.out.push_str("export");
                Ok(i + 6)
            }
        }
    }

    /// `export { a, b as c }` with or without a `from` clause.
    fn handle_export_list(&mut self, brace: usize) -> Result<usize, BuildError> {
        let mut names: Vec<(String, String)> = Vec::new();
        let mut j = brace + 1;
        loop {
            j = self.skip_ws(j);
            match self.bytes.get(j) {
                Some(b'}') => {
                    j += 1;
                    break;
                }
                None => return Ok(j),
                _ => {}
            }
            let Some((local, next)) = self.read_ident(j) else {
                // Malformed list; bail out without rewriting further.
                return Ok(j);
            };
            j = self.skip_ws(next);
            let exported = if at_keyword(self.bytes, j, b"as") {
                j = self.skip_ws(j + 2);
                match self.read_ident(j) {
                    Some((name, next)) => {
                        j = self.skip_ws(next);
                        name
                    }
                    None => local.clone(),
                }
            } else {
                local.clone()
            };
            names.push((local, exported));
            if self.bytes.get(j) == Some(&b',') {
                j += 1;
            }
        }

        j = self.skip_ws(j);
        if at_keyword(self.bytes, j, b"from") {
            j = self.skip_ws(j + 4);
            if !matches!(self.bytes.get(j), Some(b'"') | Some(b'\'')) {
                return Ok(j);
            }
            let (spec, end) = read_string(self.bytes, j);
            let end = self.consume_semi(end);
            let source = self.reexport_source(&spec)?;
            match source {
                Some(source) => {
                    let lines: Vec<String> = names
                        .iter()
                        .map(|(local, exported)| {
                            format!("exports.{exported} = {source}.{local};")
                        })
                        .collect();
                    self.out.push_str(&lines.join(" "));
                }
                None => {
                    self.warnings.push(format!(
                        "{}: re-export from non-script '{spec}' is dropped",
                        self.module.path
                    ));
                }
            }
            Ok(end)
        } else {
            let end = self.consume_semi(j);
            for (local, exported) in names {
                self.tail.push(format!("exports.{exported} = {local};"));
            }
            Ok(end)
        }
    }

    /// `export * from "..."` and `export * as ns from "..."`.
    fn handle_export_star(&mut self, star: usize) -> Result<usize, BuildError> {
        let mut j = self.skip_ws(star + 1);
        let mut ns: Option<String> = None;
        if at_keyword(self.bytes, j, b"as") {
            j = self.skip_ws(j + 2);
            let Some((name, next)) = self.read_ident(j) else {
                return Ok(j);
            };
            ns = Some(name);
            j = self.skip_ws(next);
        }
        if !at_keyword(self.bytes, j, b"from") {
            return Ok(j);
        }
        j = self.skip_ws(j + 4);
        if !matches!(self.bytes.get(j), Some(b'"') | Some(b'\'')) {
            return Ok(j);
        }
        let (spec, end) = read_string(self.bytes, j);
        let end = self.consume_semi(end);
        let source = self.reexport_source(&spec)?;
        match source {
            Some(source) => match ns {
                Some(ns) => self.out.push_str(&format!("exports.{ns} = {source};")),
                None => self
                    .out
                    .push_str(&format!("Object.assign(exports, {source});")),
            },
            None => {
                self.warnings.push(format!(
                    "{}: re-export from non-script '{spec}' is dropped",
                    self.module.path
                ));
            }
        }
        Ok(end)
    }

    /// Expression yielding the namespace object of a re-export source, or
    /// None for module kinds that have no exports.
    fn reexport_source(&mut self, spec: &str) -> Result<Option<String>, BuildError> {
        match self.ctx.graph.resolve_specifier(&self.module.path, spec) {
            Some(dep_id) => {
                let dep = self.ctx.graph.get(dep_id).ok_or_else(|| {
                    BuildError::new(
                        "CHUNK_MODULE_MISSING",
                        format!("re-export of unknown module {dep_id}"),
                    )
                })?;
                match dep.kind {
                    ModuleKind::Script | ModuleKind::Json => {
                        Ok(Some(format!("__require({dep_id})")))
                    }
                    _ => Ok(None),
                }
            }
            None => Ok(Some(format!("__bindle.external({})", js_string(spec)))),
        }
    }

    /// Names declared by `const`/`let`/`var` declarators starting at `k`
    /// (just past the keyword). Lookahead only; nothing is consumed.
    fn declarator_names(&self, mut k: usize) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            k = self.skip_ws(k);
            let Some((name, next)) = self.read_ident(k) else {
                break;
            };
            names.push(name);
            k = self.skip_ws(next);
            if self.bytes.get(k) == Some(&b'=') {
                k = self.skip_expression(k + 1);
            }
            if self.bytes.get(k) == Some(&b',') {
                k += 1;
            } else {
                break;
            }
        }
        names
    }

    /// Skip an initializer expression, stopping at a top-level `,` or `;`.
    fn skip_expression(&self, mut k: usize) -> usize {
        let len = self.bytes.len();
        let mut depth: i32 = 0;
        while k < len {
            match self.bytes[k] {
                b'(' | b'[' | b'{' => {
                    depth += 1;
                    k += 1;
                }
                b')' | b']' | b'}' => {
                    if depth == 0 {
                        return k;
                    }
                    depth -= 1;
                    k += 1;
                }
                b'"' | b'\'' | b'`' => k = skip_string(self.bytes, k),
                b'/' if self.bytes.get(k + 1) == Some(&b'/') => {
                    while k < len && self.bytes[k] != b'\n' {
                        k += 1;
                    }
                }
                b'/' if self.bytes.get(k + 1) == Some(&b'*') => {
                    k += 2;
                    while k + 1 < len && !(self.bytes[k] == b'*' && self.bytes[k + 1] == b'/') {
                        k += 1;
                    }
                    k = (k + 2).min(len);
                }
                b',' | b';' if depth == 0 => return k,
                _ => k += 1,
            }
        }
        k
    }

    fn read_ident(&self, i: usize) -> Option<(String, usize)> {
        let mut j = i;
        while j < self.bytes.len() && is_ident_byte(self.bytes[j]) {
            j += 1;
        }
        if j == i || self.bytes[i].is_ascii_digit() {
            return None;
        }
        Some((self.src[i..j].to_string(), j))
    }

    fn skip_ws(&self, mut i: usize) -> usize {
        while i < self.bytes.len() && self.bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    }

    /// Consume trailing spaces and an optional `;` on the same line.
    fn consume_semi(&self, mut i: usize) -> usize {
        let start = i;
        while i < self.bytes.len() && (self.bytes[i] == b' ' || self.bytes[i] == b'\t') {
            i += 1;
        }
        if self.bytes.get(i) == Some(&b';') {
            i + 1
        } else {
            start
        }
    }
}

/// Statement-level binding generation from a namespace-object expression.
fn bind_from(clause: &ImportClause, source: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(name) = &clause.namespace {
        parts.push(format!("var {name} = {source};"));
    }
    if let Some(name) = &clause.default {
        parts.push(format!("var {name} = {source}.default;"));
    }
    if !clause.named.is_empty() {
        let fields: Vec<String> = clause
            .named
            .iter()
            .map(|(imported, local)| {
                if imported == local {
                    local.clone()
                } else {
                    format!("{imported}: {local}")
                }
            })
            .collect();
        parts.push(format!("var {{ {} }} = {source};", fields.join(", ")));
    }
    if parts.is_empty() {
        parts.push(format!("{source};"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::ChunkGraph;
    use crate::graph::Module;

    struct Fixture {
        graph: ModuleGraph,
        chunk_graph: ChunkGraph,
        assets: AssetCollection,
        chunk_files: HashMap<ChunkId, String>,
    }

    /// Build a graph from (path, source, deps-as-specifiers) triples; the
    /// first module is the entry.
    fn fixture(modules: &[(&str, &str, &[(&str, &str, bool)])]) -> Fixture {
        let mut graph = ModuleGraph::new();
        for (path, source, _) in modules {
            let kind = ModuleKind::from_path(std::path::Path::new(path));
            graph.add(Module::new(*path, *source, kind));
        }
        let mut dep_info: HashMap<String, Vec<(String, String, bool)>> = HashMap::default();
        for (path, _, deps) in modules {
            dep_info.insert(
                (*path).to_string(),
                deps.iter()
                    .map(|(spec, target, dynamic)| {
                        ((*spec).to_string(), (*target).to_string(), *dynamic)
                    })
                    .collect(),
            );
        }
        graph.set_dependencies(&dep_info);

        let entry = graph.id_by_path(modules[0].0).unwrap();
        let chunk_graph = ChunkGraph::assemble(&graph, &[("app".to_string(), entry)], true);
        let mut chunk_files = HashMap::default();
        for chunk in chunk_graph.chunks() {
            let file = if chunk.is_entry() {
                "index.js".to_string()
            } else {
                format!("{}.js", chunk.name)
            };
            chunk_files.insert(chunk.id, file);
        }
        Fixture {
            graph,
            chunk_graph,
            assets: AssetCollection::new(),
            chunk_files,
        }
    }

    fn emit(fx: &Fixture, mode: Mode) -> ChunkCode {
        let ctx = EmitContext {
            graph: &fx.graph,
            chunk_graph: &fx.chunk_graph,
            assets: &fx.assets,
            chunk_files: &fx.chunk_files,
            mode,
        };
        let entry = fx.chunk_graph.entry_chunks().next().unwrap();
        emit_chunk(entry, &ctx).unwrap()
    }

    #[test]
    fn test_default_and_named_imports() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import App, { render as mount, helper } from \"./app\";\nmount(App, helper);\n",
                &[("./app", "/src/app.ts", false)],
            ),
            (
                "/src/app.ts",
                "export default 1;\nexport function render() {}\nexport const helper = 2;\n",
                &[],
            ),
        ]);
        let code = emit(&fx, Mode::Production);
        let app_id = fx.graph.id_by_path("/src/app.ts").unwrap();

        assert!(code.js.contains(&format!("var App = __require({app_id}).default;")));
        assert!(code
            .js
            .contains(&format!("var {{ render: mount, helper }} = __require({app_id});")));
        assert!(code.js.contains("exports.default = 1;"));
        assert!(code.js.contains("exports.render = render;"));
        assert!(code.js.contains("exports.helper = helper;"));
        assert!(!code.js.contains("import App"));
    }

    #[test]
    fn test_namespace_and_side_effect_imports() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import * as util from \"./util\";\nimport \"./init\";\n",
                &[
                    ("./util", "/src/util.ts", false),
                    ("./init", "/src/init.ts", false),
                ],
            ),
            ("/src/util.ts", "export const x = 1;\n", &[]),
            ("/src/init.ts", "console.log(\"init\");\n", &[]),
        ]);
        let code = emit(&fx, Mode::Production);
        let util_id = fx.graph.id_by_path("/src/util.ts").unwrap();
        let init_id = fx.graph.id_by_path("/src/init.ts").unwrap();

        assert!(code.js.contains(&format!("var util = __require({util_id});")));
        assert!(code.js.contains(&format!("__require({init_id});")));
    }

    #[test]
    fn test_external_import() {
        let fx = fixture(&[(
            "/src/main.ts",
            "import React from \"react\";\nimport { useState } from \"react\";\n",
            &[],
        )]);
        let code = emit(&fx, Mode::Production);
        assert!(code
            .js
            .contains("var React = __bindle.external(\"react\").default;"));
        assert!(code
            .js
            .contains("var { useState } = __bindle.external(\"react\");"));
    }

    #[test]
    fn test_export_forms() {
        let fx = fixture(&[(
            "/src/main.ts",
            concat!(
                "export default function main() {}\n",
                "export class Widget {}\n",
                "export async function fetchData() {}\n",
                "export const a = 1, b = [1, 2], c = { d: 3 };\n",
                "const internal = 9;\n",
                "export { internal as visible };\n",
            ),
            &[],
        )]);
        let code = emit(&fx, Mode::Production);

        assert!(code.js.contains("exports.default = function main() {}"));
        assert!(code.js.contains("exports.Widget = Widget;"));
        assert!(code.js.contains("exports.fetchData = fetchData;"));
        assert!(code.js.contains("exports.a = a;"));
        assert!(code.js.contains("exports.b = b;"));
        assert!(code.js.contains("exports.c = c;"));
        assert!(code.js.contains("exports.visible = internal;"));
        assert!(!code.js.contains("export class"));
        assert!(!code.js.contains("export const"));
    }

    #[test]
    fn test_reexports() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                concat!(
                    "export { helper as util } from \"./a\";\n",
                    "export * from \"./a\";\n",
                    "export * as ns from \"./a\";\n",
                ),
                &[("./a", "/src/a.ts", false)],
            ),
            ("/src/a.ts", "export const helper = 1;\n", &[]),
        ]);
        let code = emit(&fx, Mode::Production);
        let a_id = fx.graph.id_by_path("/src/a.ts").unwrap();

        assert!(code
            .js
            .contains(&format!("exports.util = __require({a_id}).helper;")));
        assert!(code
            .js
            .contains(&format!("Object.assign(exports, __require({a_id}));")));
        assert!(code.js.contains(&format!("exports.ns = __require({a_id});")));
    }

    #[test]
    fn test_dynamic_import_to_async_chunk() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "const page = import(\"./about\");\n",
                &[("./about", "/src/about.ts", true)],
            ),
            ("/src/about.ts", "export default \"about\";\n", &[]),
        ]);
        let code = emit(&fx, Mode::Production);
        let about_id = fx.graph.id_by_path("/src/about.ts").unwrap();

        assert!(code
            .js
            .contains(&format!("__bindle.load(\"about.js\", {about_id})")));
        // The async chunk does not auto-execute its entry.
        let ctx = EmitContext {
            graph: &fx.graph,
            chunk_graph: &fx.chunk_graph,
            assets: &fx.assets,
            chunk_files: &fx.chunk_files,
            mode: Mode::Production,
        };
        let lazy = fx.chunk_graph.async_chunks().next().unwrap();
        let lazy_code = emit_chunk(lazy, &ctx).unwrap();
        assert!(!lazy_code.js.contains(&format!("__bindle.require({about_id});")));
    }

    #[test]
    fn test_dynamic_import_same_chunk_resolves_inline() {
        // Statically imported elsewhere, so the target stays in the entry
        // chunk.
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import { x } from \"./both\";\nimport(\"./both\");\n",
                &[("./both", "/src/both.ts", false)],
            ),
            ("/src/both.ts", "export const x = 1;\n", &[]),
        ]);
        let code = emit(&fx, Mode::Production);
        let both_id = fx.graph.id_by_path("/src/both.ts").unwrap();
        assert!(code
            .js
            .contains(&format!("Promise.resolve(__require({both_id}))")));
        assert!(!code.js.contains("__bindle.load"));
    }

    #[test]
    fn test_dynamic_import_non_literal_warns() {
        let fx = fixture(&[(
            "/src/main.ts",
            "const m = import(modulePath);\n",
            &[],
        )]);
        let code = emit(&fx, Mode::Production);
        assert!(code.js.contains("import(modulePath)"));
        assert_eq!(code.warnings.len(), 1);
    }

    #[test]
    fn test_json_module() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import pkg from \"./pkg.json\";\n",
                &[("./pkg.json", "/src/pkg.json", false)],
            ),
            ("/src/pkg.json", "{\"name\": \"demo\"}", &[]),
        ]);
        let code = emit(&fx, Mode::Production);
        let json_id = fx.graph.id_by_path("/src/pkg.json").unwrap();
        assert!(code
            .js
            .contains(&format!("var pkg = __require({json_id}).default;")));
        assert!(code.js.contains("exports.default = {\"name\": \"demo\"}"));
    }

    #[test]
    fn test_stylesheet_extracted_in_production() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import \"./app.css\";\n",
                &[("./app.css", "/src/app.css", false)],
            ),
            ("/src/app.css", "body { color: red; }\n", &[]),
        ]);
        let code = emit(&fx, Mode::Production);
        assert!(code.css.contains("color:red"));
        assert!(!code.js.contains("createElement(\"style\")"));
    }

    #[test]
    fn test_stylesheet_injected_in_development() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import \"./app.css\";\n",
                &[("./app.css", "/src/app.css", false)],
            ),
            ("/src/app.css", "body { color: red; }\n", &[]),
        ]);
        let code = emit(&fx, Mode::Development);
        assert!(code.css.is_empty());
        assert!(code.js.contains("createElement(\"style\")"));
        assert!(code.js.contains("data-bindle"));
        assert!(code.js.contains("color: red"));
    }

    #[test]
    fn test_css_import_chain_strips_import_statements() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import \"./app.css\";\n",
                &[("./app.css", "/src/app.css", false)],
            ),
            (
                "/src/app.css",
                "@import \"./base.css\";\n.app { color: red; }\n",
                &[("./base.css", "/src/base.css", false)],
            ),
            ("/src/base.css", ".base { color: blue; }\n", &[]),
        ]);
        let code = emit(&fx, Mode::Production);

        // Both sheets inlined, imported one first, and no dangling reference.
        assert!(code.css.contains(".base{color:blue}"));
        assert!(code.css.contains(".app{color:red}"));
        assert!(!code.css.contains("@import"));
        let base = code.css.find(".base").unwrap();
        let app = code.css.find(".app").unwrap();
        assert!(base < app);
    }

    #[test]
    fn test_css_import_chain_stripped_in_development() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import \"./app.css\";\n",
                &[("./app.css", "/src/app.css", false)],
            ),
            (
                "/src/app.css",
                "@import \"./base.css\";\n.app { color: red; }\n",
                &[("./base.css", "/src/base.css", false)],
            ),
            ("/src/base.css", ".base { color: blue; }\n", &[]),
        ]);
        let code = emit(&fx, Mode::Development);
        let base_id = fx.graph.id_by_path("/src/base.css").unwrap();

        // The importer requires its dependency sheet and injects only its
        // own rules; the @import line does not reach the style tag.
        assert!(code.js.contains(&format!("__require({base_id});")));
        assert!(code.js.contains(".base { color: blue; }"));
        assert!(code.js.contains(".app { color: red; }"));
        assert!(!code.js.contains("@import"));
    }

    #[test]
    fn test_css_external_import_survives() {
        let fx = fixture(&[
            (
                "/src/main.ts",
                "import \"./app.css\";\n",
                &[("./app.css", "/src/app.css", false)],
            ),
            (
                "/src/app.css",
                "@import url(\"https://example.com/font.css\");\n.app { color: red; }\n",
                &[],
            ),
        ]);
        let code = emit(&fx, Mode::Production);
        assert!(code.css.contains("@import url(\"https://example.com/font.css\")"));
    }

    #[test]
    fn test_asset_import_becomes_url() {
        let mut fx = fixture(&[
            (
                "/src/main.ts",
                "import logo from \"./logo.png\";\n",
                &[("./logo.png", "/src/logo.png", false)],
            ),
            ("/src/logo.png", "", &[]),
        ]);
        let name = fx.assets.add(
            std::path::Path::new("/src/logo.png"),
            vec![1, 2, 3],
            "assets/[name].[hash].[ext]",
        );
        let code = emit(&fx, Mode::Production);
        assert!(code.js.contains(&format!("var logo = \"/{name}\";")));
    }

    #[test]
    fn test_entry_chunk_kicks_off() {
        let fx = fixture(&[("/src/main.ts", "console.log(1);\n", &[])]);
        let code = emit(&fx, Mode::Production);
        let main_id = fx.graph.id_by_path("/src/main.ts").unwrap();
        assert!(code.js.trim_end().ends_with(&format!("__bindle.require({main_id});")));
    }

    #[test]
    fn test_runtime_is_guarded() {
        let fx = fixture(&[("/src/main.ts", "console.log(1);\n", &[])]);
        let code = emit(&fx, Mode::Production);
        assert!(code.js.starts_with("var __bindle = (typeof window"));
        assert!(code.js.contains("window.__bindle) ||"));
    }

    #[test]
    fn test_import_meta_untouched() {
        let fx = fixture(&[(
            "/src/main.ts",
            "console.log(import.meta.url);\n",
            &[],
        )]);
        let code = emit(&fx, Mode::Production);
        assert!(code.js.contains("import.meta.url"));
    }

    #[test]
    fn test_imports_in_strings_and_comments_untouched() {
        let fx = fixture(&[(
            "/src/main.ts",
            "// import x from \"./x\";\nconst s = \"import y from './y'\";\n",
            &[],
        )]);
        let code = emit(&fx, Mode::Production);
        assert!(code.js.contains("// import x from \"./x\";"));
        assert!(code.js.contains("\"import y from './y'\""));
    }

    #[test]
    fn test_js_string_escaping() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(js_string("line\nbreak"), "\"line\\nbreak\"");
        assert_eq!(js_string("back\\slash"), "\"back\\\\slash\"");
    }
}
