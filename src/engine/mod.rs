//! Parsing/printing engines driven by the analysis service.
//!
//! The service only talks to an engine through [`AnalysisEngine`]; the
//! artifacts it produces never leave the worker thread.

mod dump;
mod items;
mod printer;
mod wasm;

pub use dump::{dump_module, DumpRow};
pub use wasm::{WasmArtifact, WasmEngine};

use crate::analysis::types::{Item, PrintPart, Range, ValidationError};
use crate::error::EngineError;

/// Result of constructing an artifact from raw bytes.
pub struct Construction<A> {
    pub artifact: A,
    pub items: Vec<Item>,
    /// Set when the artifact is structurally invalid. The artifact is still
    /// returned so its source stays retrievable.
    pub error: Option<ValidationError>,
}

/// Engine that parses artifacts and renders ranges of them.
pub trait AnalysisEngine {
    type Artifact;

    fn construct(&mut self, bytes: Vec<u8>) -> Result<Construction<Self::Artifact>, EngineError>;

    fn print_rich(&self, artifact: &Self::Artifact, range: Range)
        -> Result<Vec<PrintPart>, EngineError>;

    fn print_plain(&self, artifact: &Self::Artifact, range: Range) -> Result<String, EngineError>;

    fn source(&self, artifact: &Self::Artifact) -> Result<Vec<u8>, EngineError>;
}
