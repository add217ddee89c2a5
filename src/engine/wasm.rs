//! WebAssembly engine built on `wasmparser`, `wasmprinter` and `wat`.

use super::items::gather_items;
use super::printer::{PlainWriter, RichWriter};
use super::{AnalysisEngine, Construction};
use crate::analysis::types::{PrintPart, Range, ValidationError};
use crate::error::EngineError;
use std::borrow::Cow;
use tracing::debug;

/// A loaded module in binary form.
pub struct WasmArtifact {
    bytes: Vec<u8>,
}

impl WasmArtifact {
    /// Accept either the binary or the text format. Input that is not valid
    /// text is kept as-is so validation can report what is wrong with it.
    pub fn new(init: Vec<u8>) -> Self {
        match wat::parse_bytes(&init) {
            Ok(Cow::Owned(bytes)) => {
                debug!(text_len = init.len(), binary_len = bytes.len(), "Converted text module");
                Self { bytes }
            }
            _ => Self { bytes: init },
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn validate(&self) -> Option<ValidationError> {
        match wasmparser::validate(&self.bytes) {
            Ok(_) => None,
            Err(e) => Some(ValidationError {
                message: e.message().to_owned(),
                offset: u32::try_from(e.offset()).unwrap_or(u32::MAX),
            }),
        }
    }

    fn check_range(&self, range: Range) -> Result<(), EngineError> {
        if range.start > range.end || range.end as usize > self.bytes.len() {
            return Err(EngineError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: self.bytes.len(),
            });
        }
        Ok(())
    }
}

/// Stateless engine; all state lives in the artifacts it hands out.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmEngine;

impl WasmEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisEngine for WasmEngine {
    type Artifact = WasmArtifact;

    fn construct(&mut self, bytes: Vec<u8>) -> Result<Construction<WasmArtifact>, EngineError> {
        let artifact = WasmArtifact::new(bytes);
        if let Some(error) = artifact.validate() {
            return Ok(Construction {
                artifact,
                items: Vec::new(),
                error: Some(error),
            });
        }
        let items = gather_items(artifact.bytes()).map_err(|e| EngineError::Parse(format!("{e:#}")))?;
        Ok(Construction {
            artifact,
            items,
            error: None,
        })
    }

    fn print_rich(&self, artifact: &WasmArtifact, range: Range) -> Result<Vec<PrintPart>, EngineError> {
        artifact.check_range(range)?;
        let mut writer = RichWriter::new(range);
        wasmprinter::Config::new().print(artifact.bytes(), &mut writer)?;
        Ok(writer.finish())
    }

    fn print_plain(&self, artifact: &WasmArtifact, range: Range) -> Result<String, EngineError> {
        artifact.check_range(range)?;
        let mut writer = PlainWriter::new(range);
        wasmprinter::Config::new().print(artifact.bytes(), &mut writer)?;
        Ok(writer.finish())
    }

    fn source(&self, artifact: &WasmArtifact) -> Result<Vec<u8>, EngineError> {
        Ok(artifact.bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = r#"(module
        (func $add (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.add)
        (export "add" (func $add)))"#;

    #[test]
    fn text_input_is_converted_to_binary() {
        let mut engine = WasmEngine::new();
        let built = engine.construct(ADD.as_bytes().to_vec()).unwrap();
        assert!(built.error.is_none());
        let source = engine.source(&built.artifact).unwrap();
        assert_eq!(&source[..4], b"\0asm");
        assert_eq!(built.items[0].range.end as usize, source.len());
    }

    #[test]
    fn invalid_binary_reports_validation_error() {
        let mut engine = WasmEngine::new();
        let built = engine.construct(b"\0asm\x01\0\0\0\x05".to_vec()).unwrap();
        assert!(built.items.is_empty());
        assert!(built.error.is_some());
        // Source stays available for export.
        assert_eq!(engine.source(&built.artifact).unwrap().len(), 9);
    }

    #[test]
    fn plain_print_of_function_range() {
        let mut engine = WasmEngine::new();
        let built = engine.construct(ADD.as_bytes().to_vec()).unwrap();
        let func = built.items.iter().find(|i| i.raw_name == "func 0").unwrap();
        let text = engine.print_plain(&built.artifact, func.range).unwrap();
        assert!(text.contains("i32.add"), "{text}");
        assert!(!text.contains("export"), "{text}");
    }

    #[test]
    fn rich_print_contains_keyword_spans() {
        let mut engine = WasmEngine::new();
        let built = engine.construct(ADD.as_bytes().to_vec()).unwrap();
        let module = built.items[0].range;
        let parts = engine.print_rich(&built.artifact, module).unwrap();
        assert!(parts.contains(&PrintPart::Keyword));
        assert!(parts.iter().any(|p| matches!(p, PrintPart::NewLine(_))));
    }

    #[test]
    fn out_of_bounds_range_is_an_engine_error() {
        let mut engine = WasmEngine::new();
        let built = engine.construct(ADD.as_bytes().to_vec()).unwrap();
        let err = engine
            .print_plain(&built.artifact, Range::new(0, 1_000_000))
            .unwrap_err();
        assert!(matches!(err, EngineError::RangeOutOfBounds { .. }));
    }
}
