//! Build orchestration.
//!
//! A build runs in four stages: the module graph is built breadth-first
//! from the configured entries, every module is transformed for its kind,
//! chunks are assembled from the graph, and each chunk is emitted through
//! the plugin container into the output set. The output set is plain data;
//! `build` writes nothing to disk, so the dev server can serve it straight
//! from memory and the build command writes it out afterwards.

use crate::assets::AssetCollection;
use crate::chunks::{ChunkGraph, ChunkId, ChunkKind, ChunkManifest};
use crate::config::{expand_pattern, BuildConfig};
use crate::emit::{emit_chunk, EmitContext};
use crate::error::BuildError;
use crate::graph::{Module, ModuleGraph, ModuleId, ModuleKind};
use crate::plugin::{default_plugins, Plugin, PluginContainer, RenderedChunk};
use crate::resolve::{ResolveResult, Resolver};
use crate::scan::{scan_css_refs, scan_imports};
use crate::script::strip_type_statements;
use crate::style::compile_sass;
use bindle_util::fs::atomic_write;
use bindle_util::hash::fingerprint;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of an output file, used for content types and HTML generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Script,
    Stylesheet,
    Asset,
    Html,
    Manifest,
}

/// One file of the build output.
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// Path relative to the output directory, e.g. `assets/logo.a1b2c3d4.png`.
    pub name: String,
    pub contents: Vec<u8>,
    pub kind: OutputKind,
    /// Whether the file belongs to the initial page load. Async chunks and
    /// assets are not entry files.
    pub entry: bool,
}

impl OutputFile {
    /// MIME type the file should be served with.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self.kind {
            OutputKind::Script => "application/javascript; charset=utf-8",
            OutputKind::Stylesheet => "text/css; charset=utf-8",
            OutputKind::Html => "text/html; charset=utf-8",
            OutputKind::Manifest => "application/json",
            OutputKind::Asset => asset_content_type(&self.name),
        }
    }
}

fn asset_content_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// The complete result of one build.
#[derive(Debug)]
pub struct BuildOutput {
    pub files: Vec<OutputFile>,
    pub manifest: ChunkManifest,
    /// Number of modules in the graph.
    pub modules: usize,
    pub warnings: Vec<String>,
}

impl BuildOutput {
    /// Look up an output file by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OutputFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Write every output file under `dir`, creating directories as needed.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        for file in &self.files {
            let path = dir.join(&file.name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            atomic_write(&path, &file.contents)?;
        }
        Ok(())
    }
}

/// The bundler: a resolver plus a plugin container, reusable across builds
/// of the same project.
pub struct Bundler {
    resolver: Resolver,
    plugins: PluginContainer,
}

impl Bundler {
    /// A bundler with no plugins.
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            resolver: Resolver::new(),
            plugins: PluginContainer::new(config.root.clone(), config.mode),
        }
    }

    /// A bundler with the default plugin list for the config's mode.
    #[must_use]
    pub fn with_default_plugins(config: &BuildConfig) -> Self {
        let mut bundler = Self::new(config);
        for plugin in default_plugins(config) {
            bundler.plugins.add(plugin);
        }
        bundler
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.add(plugin);
    }

    /// Run a full build. Nothing is written to disk; see
    /// [`BuildOutput::write_to`].
    pub fn build(&self, config: &BuildConfig) -> Result<BuildOutput, BuildError> {
        self.plugins.build_start()?;

        let mut warnings: Vec<String> = Vec::new();
        let (graph, assets, entries) = self.build_graph(config, &mut warnings)?;
        debug!(modules = graph.len(), assets = assets.len(), "module graph built");

        let chunk_graph = ChunkGraph::assemble(&graph, &entries, config.splitting);
        let chunk_files = chunk_filenames(config, &graph, &chunk_graph);
        debug!(chunks = chunk_graph.chunks().len(), "chunks assembled");

        let ctx = EmitContext {
            graph: &graph,
            chunk_graph: &chunk_graph,
            assets: &assets,
            chunk_files: &chunk_files,
            mode: config.mode,
        };

        let mut files: Vec<OutputFile> = Vec::new();
        for chunk in chunk_graph.chunks() {
            let code = emit_chunk(chunk, &ctx)?;
            warnings.extend(code.warnings);

            let file = chunk_files
                .get(&chunk.id)
                .cloned()
                .unwrap_or_else(|| format!("{}.js", chunk.name));
            let entry = chunk.kind != ChunkKind::Async;

            let rendered = RenderedChunk {
                name: chunk.name.clone(),
                file: file.clone(),
                is_entry: chunk.is_entry(),
            };
            let js = self.plugins.render_chunk(code.js, &rendered)?;

            files.push(OutputFile {
                name: file,
                contents: js.into_bytes(),
                kind: OutputKind::Script,
                entry,
            });

            if !code.css.is_empty() {
                let hash = fingerprint(code.css.as_bytes());
                let name = expand_pattern(&config.style_pattern, &chunk.name, &hash, "css");
                files.push(OutputFile {
                    name,
                    contents: code.css.into_bytes(),
                    kind: OutputKind::Stylesheet,
                    entry,
                });
            }
        }

        for asset in assets.iter() {
            files.push(OutputFile {
                name: asset.output_name.clone(),
                contents: asset.content.clone(),
                kind: OutputKind::Asset,
                entry: false,
            });
        }

        let manifest = chunk_graph.manifest(&graph, &chunk_files);
        let manifest_json = manifest
            .to_json()
            .map_err(|e| BuildError::new("MANIFEST_ERROR", e.to_string()))?;
        files.push(OutputFile {
            name: "manifest.json".to_string(),
            contents: manifest_json.into_bytes(),
            kind: OutputKind::Manifest,
            entry: false,
        });

        self.plugins.generate(&mut files)?;
        self.plugins.build_end()?;

        Ok(BuildOutput {
            files,
            manifest,
            modules: graph.len(),
            warnings,
        })
    }

    /// Breadth-first graph construction from the configured entries.
    fn build_graph(
        &self,
        config: &BuildConfig,
        warnings: &mut Vec<String>,
    ) -> Result<(ModuleGraph, AssetCollection, Vec<(String, ModuleId)>), BuildError> {
        let mut graph = ModuleGraph::new();
        let mut assets = AssetCollection::new();
        let mut dep_info: HashMap<String, Vec<(String, String, bool)>> = HashMap::default();
        let mut externals: HashSet<String> = HashSet::default();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        let mut entry_paths: Vec<(String, String)> = Vec::new();

        for entry in &config.entries {
            if !entry.path.is_file() {
                return Err(BuildError::with_path(
                    "ENTRY_NOT_FOUND",
                    format!("entry '{}' does not exist", entry.name),
                    entry.path.display().to_string(),
                ));
            }
            let path = dunce::canonicalize(&entry.path).map_err(|e| {
                BuildError::with_path(
                    "MODULE_READ_ERROR",
                    e.to_string(),
                    entry.path.display().to_string(),
                )
            })?;
            entry_paths.push((entry.name.clone(), path.display().to_string()));
            queue.push_back(path);
        }

        while let Some(path) = queue.pop_front() {
            let path_str = path.display().to_string();
            if graph.id_by_path(&path_str).is_some() {
                continue;
            }

            let kind = ModuleKind::from_path(&path);
            let mut deps: Vec<(String, String, bool)> = Vec::new();

            let source = match kind {
                ModuleKind::Script => {
                    let raw = match self.plugins.load(&path_str)? {
                        Some(code) => code,
                        None => read_source(&path)?,
                    };
                    let stripped = strip_type_statements(&raw);
                    let transformed = self.plugins.transform(stripped, &path_str)?;

                    for import in scan_imports(&transformed) {
                        match self.resolver.resolve(&import.specifier, &path, &config.root)? {
                            ResolveResult::Found(dep) => {
                                deps.push((
                                    import.specifier.clone(),
                                    dep.display().to_string(),
                                    import.dynamic,
                                ));
                                queue.push_back(dep);
                            }
                            ResolveResult::External(name) => {
                                if externals.insert(name.clone()) {
                                    debug!(module = %name, "external import, not bundled");
                                }
                            }
                        }
                    }
                    transformed
                }
                ModuleKind::Stylesheet | ModuleKind::Sass => {
                    let raw = read_source(&path)?;
                    let css = if kind == ModuleKind::Sass {
                        compile_sass(&raw, &path)?
                    } else {
                        raw
                    };

                    for css_ref in scan_css_refs(&css) {
                        let spec = normalize_css_specifier(&css_ref.specifier);
                        match self.resolver.resolve(&spec, &path, &config.root) {
                            Ok(ResolveResult::Found(dep)) => {
                                deps.push((css_ref.specifier.clone(), dep.display().to_string(), false));
                                queue.push_back(dep);
                            }
                            Ok(ResolveResult::External(_)) | Err(_) => {
                                warnings.push(format!(
                                    "{path_str}: unresolved reference '{}'",
                                    css_ref.specifier
                                ));
                            }
                        }
                    }
                    css
                }
                ModuleKind::Json => read_source(&path)?,
                ModuleKind::Asset | ModuleKind::Html => {
                    let bytes = std::fs::read(&path).map_err(|e| {
                        BuildError::with_path("MODULE_READ_ERROR", e.to_string(), path_str.clone())
                    })?;
                    assets.add(&path, bytes, &config.asset_pattern);
                    String::new()
                }
            };

            graph.add(Module::new(path_str.clone(), source, kind));
            dep_info.insert(path_str, deps);
        }

        graph.set_dependencies(&dep_info);

        let mut entries: Vec<(String, ModuleId)> = Vec::new();
        for (name, path) in entry_paths {
            let id = graph.id_by_path(&path).ok_or_else(|| {
                BuildError::with_path("ENTRY_NOT_FOUND", format!("entry '{name}' was not loaded"), path)
            })?;
            entries.push((name, id));
        }

        Ok((graph, assets, entries))
    }
}

fn read_source(path: &Path) -> Result<String, BuildError> {
    bindle_util::fs::read_to_string_lossy(path).map_err(|e| {
        BuildError::with_path("MODULE_READ_ERROR", e.to_string(), path.display().to_string())
    })
}

/// CSS references are relative to the file even without a `./` prefix.
fn normalize_css_specifier(spec: &str) -> String {
    if spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/') {
        spec.to_string()
    } else {
        format!("./{spec}")
    }
}

/// Final filename per chunk. The primary entry chunk emits as the configured
/// bundle name; the rest are `[name].js`, or `[name].[hash].js` with hashed
/// chunks enabled. The hash covers member module sources, so it is stable
/// before any chunk is emitted.
fn chunk_filenames(
    config: &BuildConfig,
    graph: &ModuleGraph,
    chunk_graph: &ChunkGraph,
) -> HashMap<ChunkId, String> {
    let primary = chunk_graph.entry_chunks().next().map(|c| c.id);
    let mut files: HashMap<ChunkId, String> = HashMap::default();

    for chunk in chunk_graph.chunks() {
        let file = if Some(chunk.id) == primary {
            config.bundle_name.clone()
        } else if config.hashed_chunks {
            let mut hasher_input = Vec::new();
            for &id in &chunk.modules {
                if let Some(module) = graph.get(id) {
                    hasher_input.extend_from_slice(module.source.as_bytes());
                    hasher_input.push(0);
                }
            }
            format!("{}.{}.js", chunk.name, fingerprint(&hasher_input))
        } else {
            format!("{}.js", chunk.name)
        };
        files.insert(chunk.id, file);
    }

    files
}
