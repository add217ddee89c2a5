//! Structural navigation of WebAssembly modules.
//!
//! A module is loaded into an isolated analysis worker, which splits it into
//! named byte ranges (sections and their entries). The client rebuilds the
//! nesting of those ranges into a tree, searches it by name or offset, and
//! asks the worker to print any range as plain or styled text.
//!
//! # Architecture
//!
//! - **Worker thread**: Runs the analysis loop (`analysis::run_analysis_loop`).
//!   It owns every loaded artifact and is the only place the engine runs.
//!
//! - **Transport**: Correlates requests and responses by id over a bounded
//!   request queue and an unbounded response channel.
//!
//! - **Analyzer / AnalysisHandle**: Async client proxies. A handle caches
//!   printed ranges and destroys its worker-side artifact when dropped.
//!
//! - **Tree and search**: Pure functions over the item list returned at load
//!   time; they never touch the worker.

pub mod analysis;
pub mod engine;
pub mod error;
pub mod rich;
pub mod search;
pub mod tree;

pub use analysis::{
    AnalysisHandle, Analyzer, ArtifactId, Item, PrintPart, Range, ValidationError,
};
pub use engine::{dump_module, AnalysisEngine, DumpRow, WasmEngine};
pub use error::{BridgeError, EngineError, RemoteException};
pub use rich::{SpanKind, StyledText};
pub use search::{search, search_with, SearchMatch, SearchOptions};
pub use tree::{check_order, TreeNode};
