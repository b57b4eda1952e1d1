//! Module dependency graph.

use rustc_hash::FxHashMap as HashMap;
use std::path::Path;

/// Unique identifier for a module in the graph.
pub type ModuleId = usize;

/// What a graph node is, derived from its file extension.
///
/// The derivation is a single total function of the extension, so a file maps
/// to exactly one kind and can never be processed by two pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// `.ts .tsx .js .jsx .mjs .cjs`
    Script,
    /// `.css`
    Stylesheet,
    /// `.scss .sass`: compiled to CSS before anything else sees it.
    Sass,
    /// `.json`: becomes a module with a `default` export.
    Json,
    /// `.html`: copied through as a fingerprinted asset.
    Html,
    /// Everything else: fingerprinted and referenced by URL.
    Asset,
}

impl ModuleKind {
    /// Classify a path by its extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => ModuleKind::Script,
            "css" => ModuleKind::Stylesheet,
            "scss" | "sass" => ModuleKind::Sass,
            "json" => ModuleKind::Json,
            "html" | "htm" => ModuleKind::Html,
            _ => ModuleKind::Asset,
        }
    }

    /// Stylesheet or Sass.
    #[must_use]
    pub fn is_style(self) -> bool {
        matches!(self, ModuleKind::Stylesheet | ModuleKind::Sass)
    }

    /// Copied through as a fingerprinted file rather than emitted as JS.
    #[must_use]
    pub fn is_asset(self) -> bool {
        matches!(self, ModuleKind::Asset | ModuleKind::Html)
    }
}

/// A module in the dependency graph.
#[derive(Debug, Clone)]
pub struct Module {
    /// Absolute path.
    pub path: String,
    /// Transformed source. Empty for binary assets, whose bytes live in the
    /// asset collection.
    pub source: String,
    /// Node kind.
    pub kind: ModuleKind,
    /// Module IDs this module statically depends on.
    pub dependencies: Vec<ModuleId>,
    /// Module IDs this module dynamically imports (code split points).
    pub dynamic_dependencies: Vec<ModuleId>,
}

impl Module {
    /// Create a module with no dependencies wired yet.
    #[must_use]
    pub fn new(path: impl Into<String>, source: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            kind,
            dependencies: Vec::new(),
            dynamic_dependencies: Vec::new(),
        }
    }
}

/// The module dependency graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    /// Path to ID mapping for deduplication.
    path_to_id: HashMap<String, ModuleId>,
    /// (from_path, specifier) -> target module id, for emit-time rewriting.
    specifier_map: HashMap<(String, String), ModuleId>,
}

impl ModuleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning its ID. A path already in the graph keeps its
    /// existing ID and the new module is ignored.
    pub fn add(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }
        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);
        id
    }

    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    #[must_use]
    pub fn id_by_path(&self, path: &str) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Wire dependency edges from a map of module path to
    /// `(specifier, resolved_path, is_dynamic)` tuples, and populate the
    /// specifier map used at emit time.
    pub fn set_dependencies(&mut self, dep_info: &HashMap<String, Vec<(String, String, bool)>>) {
        for module in &mut self.modules {
            let Some(deps) = dep_info.get(&module.path) else {
                continue;
            };

            module.dependencies = deps
                .iter()
                .filter(|(_, _, dynamic)| !dynamic)
                .filter_map(|(_, dep_path, _)| self.path_to_id.get(dep_path).copied())
                .collect();

            module.dynamic_dependencies = deps
                .iter()
                .filter(|(_, _, dynamic)| *dynamic)
                .filter_map(|(_, dep_path, _)| self.path_to_id.get(dep_path).copied())
                .collect();

            for (specifier, dep_path, _) in deps {
                if let Some(&target) = self.path_to_id.get(dep_path) {
                    self.specifier_map
                        .insert((module.path.clone(), specifier.clone()), target);
                }
            }
        }
    }

    /// Look up the module a specifier resolved to, from a given module.
    #[must_use]
    pub fn resolve_specifier(&self, from_path: &str, specifier: &str) -> Option<ModuleId> {
        self.specifier_map
            .get(&(from_path.to_string(), specifier.to_string()))
            .copied()
    }

    /// Modules in topological order: dependencies before dependents.
    ///
    /// Kahn's algorithm. On a cycle the remaining modules are appended in id
    /// order; import cycles are legal in the source language and must not
    /// abort the build.
    #[must_use]
    pub fn toposort(&self) -> Vec<ModuleId> {
        let n = self.modules.len();
        if n == 0 {
            return Vec::new();
        }

        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<ModuleId>> = vec![Vec::new(); n];
        for (id, module) in self.modules.iter().enumerate() {
            for &dep in &module.dependencies {
                adj[dep].push(id);
                in_degree[id] += 1;
            }
        }

        let mut queue: std::collections::VecDeque<ModuleId> = (0..n)
            .filter(|&id| in_degree[id] == 0)
            .collect();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(id) = queue.pop_front() {
            placed[id] = true;
            order.push(id);
            for &next in &adj[id] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < n {
            for id in 0..n {
                if !placed[id] {
                    order.push(id);
                }
            }
        }

        order
    }

    /// Iterate over all modules.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str, deps: Vec<ModuleId>) -> Module {
        Module {
            path: path.to_string(),
            source: String::new(),
            kind: ModuleKind::Script,
            dependencies: deps,
            dynamic_dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ModuleKind::from_path(Path::new("a/main.tsx")), ModuleKind::Script);
        assert_eq!(ModuleKind::from_path(Path::new("a/x.mjs")), ModuleKind::Script);
        assert_eq!(ModuleKind::from_path(Path::new("s.css")), ModuleKind::Stylesheet);
        assert_eq!(ModuleKind::from_path(Path::new("s.SCSS")), ModuleKind::Sass);
        assert_eq!(ModuleKind::from_path(Path::new("pkg.json")), ModuleKind::Json);
        assert_eq!(ModuleKind::from_path(Path::new("page.html")), ModuleKind::Html);
        assert_eq!(ModuleKind::from_path(Path::new("logo.png")), ModuleKind::Asset);
        assert_eq!(ModuleKind::from_path(Path::new("no_extension")), ModuleKind::Asset);
    }

    #[test]
    fn test_add_deduplicates_by_path() {
        let mut graph = ModuleGraph::new();
        let a = graph.add(module("/a.ts", vec![]));
        let again = graph.add(module("/a.ts", vec![]));
        assert_eq!(a, again);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_toposort_linear() {
        let mut graph = ModuleGraph::new();
        graph.add(module("/c.ts", vec![]));
        graph.add(module("/b.ts", vec![0]));
        graph.add(module("/a.ts", vec![1]));
        assert_eq!(graph.toposort(), vec![0, 1, 2]);
    }

    #[test]
    fn test_toposort_cycle_does_not_abort() {
        let mut graph = ModuleGraph::new();
        graph.add(module("/a.ts", vec![1]));
        graph.add(module("/b.ts", vec![0]));
        let order = graph.toposort();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_set_dependencies_and_specifier_map() {
        let mut graph = ModuleGraph::new();
        graph.add(module("/main.ts", vec![]));
        graph.add(module("/util.ts", vec![]));
        graph.add(module("/lazy.ts", vec![]));

        let mut dep_info: HashMap<String, Vec<(String, String, bool)>> = HashMap::default();
        dep_info.insert(
            "/main.ts".to_string(),
            vec![
                ("./util".to_string(), "/util.ts".to_string(), false),
                ("./lazy".to_string(), "/lazy.ts".to_string(), true),
            ],
        );
        graph.set_dependencies(&dep_info);

        let main = graph.get(0).unwrap();
        assert_eq!(main.dependencies, vec![1]);
        assert_eq!(main.dynamic_dependencies, vec![2]);
        assert_eq!(graph.resolve_specifier("/main.ts", "./util"), Some(1));
        assert_eq!(graph.resolve_specifier("/main.ts", "./lazy"), Some(2));
        assert_eq!(graph.resolve_specifier("/main.ts", "./nope"), None);
    }
}
