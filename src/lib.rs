//! asmlens — a local, offline compiler explorer for the terminal.
//!
//! Point it at a source file; it recompiles on every save and shows the
//! cleaned, demangled, cycle-annotated assembly. The pipeline runs in
//! strictly forward stages: raw assembly through the [`lexer`], symbol
//! resolution in [`demangle`], performance correlation in [`perf`], all
//! sequenced by the [`engine`] under debounced watch triggers with stale
//! results discarded at the publish boundary.

pub mod build_db;
pub mod config;
pub mod demangle;
pub mod engine;
pub mod lexer;
pub mod patterns;
pub mod perf;
pub mod toolchain;
pub mod ui;
pub mod watcher;

pub use config::AppConfig;
pub use engine::{Engine, EngineOptions, Snapshot};
pub use lexer::{CleanedAssembly, FileTable, FilterOptions};
