//! Plugin system.
//!
//! Hooks run at fixed build stages: `build_start`, `load`, `transform`,
//! `render_chunk`, `generate`, `build_end`. Built-ins cover define
//! replacement, the HTML page, and the live-reload client; the default
//! plugin list is a pure function of the build config's mode.

use crate::bundle::{OutputFile, OutputKind};
use crate::config::{BuildConfig, Mode};
use crate::graph::ModuleKind;
use crate::html::{render_page, HtmlOptions};
use crate::script::apply_defines;
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Error raised by a plugin hook.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin that failed.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// What went wrong.
    pub message: String,
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Context passed to every hook.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Project root.
    pub root: PathBuf,
    /// Build mode.
    pub mode: Mode,
}

/// Chunk metadata passed to `render_chunk`.
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    /// Chunk name.
    pub name: String,
    /// Output filename.
    pub file: String,
    /// Whether this is an entry chunk.
    pub is_entry: bool,
}

/// A build plugin. All hooks default to no-ops.
pub trait Plugin: Send + Sync {
    /// Plugin name for error messages.
    fn name(&self) -> &str;

    /// Called once before the graph is built.
    fn build_start(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }

    /// Provide the source for a path instead of reading it from disk.
    /// Return `None` to fall through to the default loader.
    fn load(&self, _id: &str, _ctx: &PluginContext) -> HookResult<Option<String>> {
        Ok(None)
    }

    /// Transform a module source. Return `None` to pass it through.
    fn transform(&self, _code: &str, _id: &str, _ctx: &PluginContext) -> HookResult<Option<String>> {
        Ok(None)
    }

    /// Post-process a rendered chunk. Return `None` to pass it through.
    fn render_chunk(
        &self,
        _code: &str,
        _chunk: &RenderedChunk,
        _ctx: &PluginContext,
    ) -> HookResult<Option<String>> {
        Ok(None)
    }

    /// Add or rewrite output files after all chunks are rendered.
    fn generate(&self, _ctx: &PluginContext, _files: &mut Vec<OutputFile>) -> HookResult<()> {
        Ok(())
    }

    /// Called once after the build completes.
    fn build_end(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }
}

/// Runs every registered plugin's hooks in registration order.
pub struct PluginContainer {
    plugins: Vec<Box<dyn Plugin>>,
    ctx: PluginContext,
}

impl PluginContainer {
    #[must_use]
    pub fn new(root: PathBuf, mode: Mode) -> Self {
        Self {
            plugins: Vec::new(),
            ctx: PluginContext { root, mode },
        }
    }

    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered plugin names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn build_start(&self) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.build_start(&self.ctx)?;
        }
        Ok(())
    }

    /// First plugin to return a source wins.
    pub fn load(&self, id: &str) -> HookResult<Option<String>> {
        for plugin in &self.plugins {
            if let Some(code) = plugin.load(id, &self.ctx)? {
                return Ok(Some(code));
            }
        }
        Ok(None)
    }

    /// Chain transforms through every plugin.
    pub fn transform(&self, code: String, id: &str) -> HookResult<String> {
        let mut current = code;
        for plugin in &self.plugins {
            if let Some(next) = plugin.transform(&current, id, &self.ctx)? {
                current = next;
            }
        }
        Ok(current)
    }

    /// Chain chunk renderers through every plugin.
    pub fn render_chunk(&self, code: String, chunk: &RenderedChunk) -> HookResult<String> {
        let mut current = code;
        for plugin in &self.plugins {
            if let Some(next) = plugin.render_chunk(&current, chunk, &self.ctx)? {
                current = next;
            }
        }
        Ok(current)
    }

    pub fn generate(&self, files: &mut Vec<OutputFile>) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.generate(&self.ctx, files)?;
        }
        Ok(())
    }

    pub fn build_end(&self) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.build_end(&self.ctx)?;
        }
        Ok(())
    }
}

/// Constant replacement on script sources.
pub struct DefinePlugin {
    defines: HashMap<String, String>,
}

impl DefinePlugin {
    #[must_use]
    pub fn new(defines: HashMap<String, String>) -> Self {
        Self { defines }
    }
}

impl Plugin for DefinePlugin {
    fn name(&self) -> &str {
        "define"
    }

    fn transform(&self, code: &str, id: &str, _ctx: &PluginContext) -> HookResult<Option<String>> {
        if ModuleKind::from_path(Path::new(id)) != ModuleKind::Script {
            return Ok(None);
        }
        Ok(Some(apply_defines(code, &self.defines)))
    }
}

/// Emits the HTML page referencing the entry scripts and stylesheets.
///
/// Uses `src/index.html` under the project root as the template when it
/// exists, otherwise a generated skeleton.
pub struct HtmlTemplatePlugin {
    title: String,
}

impl HtmlTemplatePlugin {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for HtmlTemplatePlugin {
    fn default() -> Self {
        Self::new("App")
    }
}

impl Plugin for HtmlTemplatePlugin {
    fn name(&self) -> &str {
        "html-template"
    }

    fn generate(&self, ctx: &PluginContext, files: &mut Vec<OutputFile>) -> HookResult<()> {
        let scripts: Vec<String> = files
            .iter()
            .filter(|f| f.kind == OutputKind::Script && f.entry)
            .map(|f| format!("/{}", f.name))
            .collect();
        let styles: Vec<String> = files
            .iter()
            .filter(|f| f.kind == OutputKind::Stylesheet && f.entry)
            .map(|f| format!("/{}", f.name))
            .collect();

        let template_path = ctx.root.join("src").join("index.html");
        let template = std::fs::read_to_string(&template_path).ok();

        let html = render_page(
            template.as_deref(),
            &scripts,
            &styles,
            &HtmlOptions {
                title: self.title.clone(),
                minimize: !ctx.mode.is_dev(),
            },
        );

        files.push(OutputFile {
            name: "index.html".to_string(),
            contents: html.into_bytes(),
            kind: OutputKind::Html,
            entry: false,
        });
        Ok(())
    }
}

/// Appends the live-reload WebSocket client to entry chunks.
pub struct ReloadClientPlugin {
    host: String,
    port: u16,
}

impl ReloadClientPlugin {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for ReloadClientPlugin {
    fn default() -> Self {
        Self::new("127.0.0.1", 3600)
    }
}

impl Plugin for ReloadClientPlugin {
    fn name(&self) -> &str {
        "reload-client"
    }

    fn render_chunk(
        &self,
        code: &str,
        chunk: &RenderedChunk,
        _ctx: &PluginContext,
    ) -> HookResult<Option<String>> {
        if !chunk.is_entry {
            return Ok(None);
        }
        Ok(Some(format!(
            "{code}\n{}\n",
            reload_client_script(&self.host, self.port)
        )))
    }
}

/// The client half of the live-reload protocol: reconnecting WebSocket,
/// full page reload on `reload`, error overlay on `error`.
fn reload_client_script(host: &str, port: u16) -> String {
    format!(
        r#"(function () {{
  var url = "ws://{host}:{port}/ws";
  var OVERLAY_ID = "__bindle_error_overlay";
  function clearOverlay() {{
    var el = document.getElementById(OVERLAY_ID);
    if (el) el.remove();
  }}
  function showOverlay(message) {{
    clearOverlay();
    var el = document.createElement("div");
    el.id = OVERLAY_ID;
    el.style.cssText =
      "position:fixed;inset:0;z-index:99999;background:rgba(20,20,20,0.92);" +
      "color:#ff8080;font-family:monospace;white-space:pre-wrap;padding:2rem;overflow:auto";
    el.textContent = "build failed\n\n" + message;
    document.body.appendChild(el);
  }}
  function connect() {{
    var ws = new WebSocket(url);
    ws.onmessage = function (event) {{
      var msg = JSON.parse(event.data);
      if (msg.type === "reload") window.location.reload();
      else if (msg.type === "error") showOverlay(msg.message);
      else if (msg.type === "connected") clearOverlay();
    }};
    ws.onclose = function () {{
      setTimeout(connect, 1000);
    }};
  }}
  connect();
}})();"#
    )
}

/// The default plugin list for a config: define replacement always; the HTML
/// page and reload client only in development mode.
#[must_use]
pub fn default_plugins(config: &BuildConfig) -> Vec<Box<dyn Plugin>> {
    let mut plugins: Vec<Box<dyn Plugin>> =
        vec![Box::new(DefinePlugin::new(config.defines.clone()))];
    if config.mode.is_dev() {
        plugins.push(Box::new(HtmlTemplatePlugin::default()));
        plugins.push(Box::new(ReloadClientPlugin::default()));
    }
    plugins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;

    fn names(plugins: &[Box<dyn Plugin>]) -> Vec<&str> {
        plugins.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_default_plugins_production() {
        let config = BuildConfig::new("/proj").with_mode(Mode::Production);
        let plugins = default_plugins(&config);
        let names = names(&plugins);
        assert_eq!(names, vec!["define"]);
    }

    #[test]
    fn test_default_plugins_development() {
        let config = BuildConfig::new("/proj").with_mode(Mode::Development);
        let plugins = default_plugins(&config);
        let names = names(&plugins);
        assert_eq!(names, vec!["define", "html-template", "reload-client"]);
    }

    #[test]
    fn test_define_plugin_scripts_only() {
        let mut defines = HashMap::default();
        defines.insert("FLAG".to_string(), "true".to_string());
        let plugin = DefinePlugin::new(defines);
        let ctx = PluginContext {
            root: PathBuf::from("/proj"),
            mode: Mode::Production,
        };

        let out = plugin.transform("if (FLAG) go();", "/proj/src/a.ts", &ctx).unwrap();
        assert_eq!(out.unwrap(), "if (true) go();");

        let out = plugin.transform("FLAG { }", "/proj/src/a.css", &ctx).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_reload_client_appended_to_entry_chunks_only() {
        let plugin = ReloadClientPlugin::new("localhost", 4000);
        let ctx = PluginContext {
            root: PathBuf::from("/proj"),
            mode: Mode::Development,
        };
        let entry = RenderedChunk {
            name: "app".to_string(),
            file: "index.js".to_string(),
            is_entry: true,
        };
        let lazy = RenderedChunk {
            name: "about".to_string(),
            file: "about.js".to_string(),
            is_entry: false,
        };

        let out = plugin.render_chunk("x();", &entry, &ctx).unwrap().unwrap();
        assert!(out.contains("ws://localhost:4000/ws"));
        assert!(plugin.render_chunk("x();", &lazy, &ctx).unwrap().is_none());
    }

    #[test]
    fn test_html_plugin_lists_entry_files() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = HtmlTemplatePlugin::new("My App");
        let ctx = PluginContext {
            root: dir.path().to_path_buf(),
            mode: Mode::Development,
        };
        let mut files = vec![
            OutputFile {
                name: "index.js".to_string(),
                contents: Vec::new(),
                kind: OutputKind::Script,
                entry: true,
            },
            OutputFile {
                name: "about.js".to_string(),
                contents: Vec::new(),
                kind: OutputKind::Script,
                entry: false,
            },
            OutputFile {
                name: "app.css".to_string(),
                contents: Vec::new(),
                kind: OutputKind::Stylesheet,
                entry: true,
            },
        ];

        plugin.generate(&ctx, &mut files).unwrap();
        let html_file = files.iter().find(|f| f.name == "index.html").unwrap();
        let html = String::from_utf8(html_file.contents.clone()).unwrap();
        assert!(html.contains("src=\"/index.js\""));
        assert!(html.contains("href=\"/app.css\""));
        assert!(!html.contains("about.js"));
        assert!(html.contains("My App"));
    }
}
