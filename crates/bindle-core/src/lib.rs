//! Build engine behind the `bindle` CLI.
//!
//! The pipeline runs in four stages:
//!
//! 1. **Graph**: walk the entry points, resolve every import specifier, and
//!    build a [`graph::ModuleGraph`] of scripts, stylesheets, and assets.
//! 2. **Transform**: per-node content transforms selected by file kind:
//!    type-only import stripping and define replacement for scripts, Sass
//!    compilation and `url()` rewriting for stylesheets, content
//!    fingerprinting for binary assets.
//! 3. **Chunks**: group modules into an entry chunk per entry point, an
//!    async chunk per dynamic import target, and a shared chunk for modules
//!    reachable from more than one entry.
//! 4. **Emit**: serialize each chunk into a small module registry runtime,
//!    extract or inject per-chunk CSS, and collect everything into a
//!    [`bundle::BuildOutput`] that can be written to disk or served from
//!    memory by the dev server.

pub mod assets;
pub mod bundle;
pub mod chunks;
pub mod config;
pub mod emit;
pub mod env;
pub mod error;
pub mod graph;
pub mod html;
pub mod plugin;
pub mod resolve;
pub mod scan;
pub mod script;
pub mod style;

pub use bundle::{BuildOutput, Bundler, OutputFile, OutputKind};
pub use config::{BuildConfig, Entry, Mode, SERVE_ENV_VAR};
pub use error::BuildError;
pub use graph::{Module, ModuleGraph, ModuleId, ModuleKind};
pub use plugin::{default_plugins, Plugin, PluginContainer};
