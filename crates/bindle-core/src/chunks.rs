//! Chunk assembly.
//!
//! Groups graph modules into output bundles: one entry chunk per entry
//! point, one async chunk per dynamic import target (split point), and a
//! single `shared` chunk for modules statically reachable from more than one
//! entry. Member assignment walks static edges without crossing split
//! points, so a dynamically imported subtree stays out of the chunk that
//! imports it.

use crate::graph::{ModuleGraph, ModuleId};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::Serialize;

/// Unique identifier for a chunk.
pub type ChunkId = usize;

/// How a chunk is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Loaded by the page, executes its entry module.
    Entry,
    /// Loaded by the page before any entry chunk.
    Shared,
    /// Loaded on demand through a dynamic import.
    Async,
}

/// A group of modules loaded together.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    /// Chunk name; drives the output filename.
    pub name: String,
    /// Member modules in topological order.
    pub modules: Vec<ModuleId>,
    /// The module executed when the chunk loads. `None` for the shared
    /// chunk, which only defines modules.
    pub entry: Option<ModuleId>,
    pub kind: ChunkKind,
    /// Chunks that must be loaded before this one.
    pub dependencies: Vec<ChunkId>,
}

impl Chunk {
    #[must_use]
    pub fn is_entry(&self) -> bool {
        self.kind == ChunkKind::Entry
    }
}

/// Result of chunk assembly.
#[derive(Debug)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
    /// First chunk each module was assigned to.
    module_to_chunk: HashMap<ModuleId, ChunkId>,
}

impl ChunkGraph {
    /// Assemble chunks for the given entries.
    ///
    /// `splitting` off folds dynamic dependencies into their importer's
    /// chunk instead of creating async chunks.
    #[must_use]
    pub fn assemble(
        graph: &ModuleGraph,
        entries: &[(String, ModuleId)],
        splitting: bool,
    ) -> Self {
        let split_points = if splitting {
            find_split_points(graph)
        } else {
            HashSet::default()
        };

        let topo_index = topo_positions(graph);

        // Static closure per entry, not crossing split points.
        let entry_closures: Vec<HashSet<ModuleId>> = entries
            .iter()
            .map(|&(_, id)| static_closure(graph, id, &split_points, splitting))
            .collect();

        // Modules reachable from more than one entry hoist into the shared
        // chunk.
        let mut shared: HashSet<ModuleId> = HashSet::default();
        if entries.len() > 1 {
            let mut counts: HashMap<ModuleId, usize> = HashMap::default();
            for closure in &entry_closures {
                for &id in closure {
                    *counts.entry(id).or_default() += 1;
                }
            }
            shared = counts
                .into_iter()
                .filter(|&(_, n)| n > 1)
                .map(|(id, _)| id)
                .collect();
        }

        let mut chunk_graph = ChunkGraph {
            chunks: Vec::new(),
            module_to_chunk: HashMap::default(),
        };

        let shared_id = if shared.is_empty() {
            None
        } else {
            let id = chunk_graph.push_chunk(
                "shared".to_string(),
                None,
                ChunkKind::Shared,
                sorted_by_topo(&shared, &topo_index),
            );
            Some(id)
        };

        for ((name, entry_id), closure) in entries.iter().zip(&entry_closures) {
            let members: HashSet<ModuleId> =
                closure.difference(&shared).copied().collect();
            let id = chunk_graph.push_chunk(
                name.clone(),
                Some(*entry_id),
                ChunkKind::Entry,
                sorted_by_topo(&members, &topo_index),
            );
            if let Some(shared_id) = shared_id {
                chunk_graph.chunks[id].dependencies.push(shared_id);
            }
        }

        // One async chunk per split point. Modules already defined by the
        // shared chunk or an entry chunk are not duplicated.
        let assigned: HashSet<ModuleId> =
            chunk_graph.module_to_chunk.keys().copied().collect();
        let mut split_ids: Vec<ModuleId> = split_points.iter().copied().collect();
        split_ids.sort_unstable();
        for split_id in split_ids {
            if assigned.contains(&split_id) {
                continue;
            }
            let closure = static_closure(graph, split_id, &split_points, splitting);
            let members: HashSet<ModuleId> =
                closure.difference(&assigned).copied().collect();
            let name = chunk_name_for(graph, split_id, &chunk_graph.chunks);
            let id = chunk_graph.push_chunk(
                name,
                Some(split_id),
                ChunkKind::Async,
                sorted_by_topo(&members, &topo_index),
            );
            if let Some(shared_id) = shared_id {
                chunk_graph.chunks[id].dependencies.push(shared_id);
            }
        }

        chunk_graph
    }

    fn push_chunk(
        &mut self,
        name: String,
        entry: Option<ModuleId>,
        kind: ChunkKind,
        modules: Vec<ModuleId>,
    ) -> ChunkId {
        let id = self.chunks.len();
        for &module_id in &modules {
            self.module_to_chunk.entry(module_id).or_insert(id);
        }
        self.chunks.push(Chunk {
            id,
            name,
            modules,
            entry,
            kind,
            dependencies: Vec::new(),
        });
        id
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn entry_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.kind == ChunkKind::Entry)
    }

    #[must_use]
    pub fn shared_chunk(&self) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.kind == ChunkKind::Shared)
    }

    pub fn async_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.kind == ChunkKind::Async)
    }

    /// The chunk a module was first assigned to.
    #[must_use]
    pub fn chunk_for_module(&self, module_id: ModuleId) -> Option<ChunkId> {
        self.module_to_chunk.get(&module_id).copied()
    }

    #[must_use]
    pub fn has_async(&self) -> bool {
        self.chunks.iter().any(|c| c.kind == ChunkKind::Async)
    }

    /// Build the manifest given the final per-chunk filenames.
    #[must_use]
    pub fn manifest(
        &self,
        graph: &ModuleGraph,
        files: &HashMap<ChunkId, String>,
    ) -> ChunkManifest {
        ChunkManifest {
            chunks: self
                .chunks
                .iter()
                .map(|chunk| ChunkManifestEntry {
                    id: chunk.id,
                    name: chunk.name.clone(),
                    file: files.get(&chunk.id).cloned().unwrap_or_default(),
                    is_entry: chunk.is_entry(),
                    modules: chunk
                        .modules
                        .iter()
                        .filter_map(|&id| graph.get(id).map(|m| m.path.clone()))
                        .collect(),
                    dependencies: chunk.dependencies.clone(),
                })
                .collect(),
        }
    }
}

/// Targets of dynamic imports.
fn find_split_points(graph: &ModuleGraph) -> HashSet<ModuleId> {
    let mut split_points = HashSet::default();
    for (_, module) in graph.iter() {
        for &dep in &module.dynamic_dependencies {
            split_points.insert(dep);
        }
    }
    split_points
}

/// Static closure from `start`, never crossing into other split points.
/// With splitting disabled, dynamic edges are followed too.
fn static_closure(
    graph: &ModuleGraph,
    start: ModuleId,
    split_points: &HashSet<ModuleId>,
    splitting: bool,
) -> HashSet<ModuleId> {
    let mut visited = HashSet::default();
    let mut stack = vec![start];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if id != start && split_points.contains(&id) {
            visited.remove(&id);
            continue;
        }
        if let Some(module) = graph.get(id) {
            stack.extend(module.dependencies.iter().copied());
            if !splitting {
                stack.extend(module.dynamic_dependencies.iter().copied());
            }
        }
    }

    visited
}

/// Position of every module in the graph's topological order.
fn topo_positions(graph: &ModuleGraph) -> HashMap<ModuleId, usize> {
    graph
        .toposort()
        .into_iter()
        .enumerate()
        .map(|(pos, id)| (id, pos))
        .collect()
}

fn sorted_by_topo(
    members: &HashSet<ModuleId>,
    topo_index: &HashMap<ModuleId, usize>,
) -> Vec<ModuleId> {
    let mut modules: Vec<ModuleId> = members.iter().copied().collect();
    modules.sort_unstable_by_key(|id| topo_index.get(id).copied().unwrap_or(usize::MAX));
    modules
}

/// Async chunk name from the split point's file stem, deduplicated against
/// names already taken.
fn chunk_name_for(graph: &ModuleGraph, module_id: ModuleId, existing: &[Chunk]) -> String {
    let stem = graph
        .get(module_id)
        .and_then(|m| {
            std::path::Path::new(&m.path)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "chunk".to_string());

    if !existing.iter().any(|c| c.name == stem) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem}{n}");
        if !existing.iter().any(|c| c.name == candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Manifest describing every emitted chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkManifest {
    pub chunks: Vec<ChunkManifestEntry>,
}

/// One chunk in the manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkManifestEntry {
    pub id: ChunkId,
    pub name: String,
    pub file: String,
    pub is_entry: bool,
    pub modules: Vec<String>,
    pub dependencies: Vec<ChunkId>,
}

impl ChunkManifest {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
