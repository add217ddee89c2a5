//! Error types for the analysis bridge.
//!
//! Failures raised inside the worker travel back as [`RemoteException`]
//! values inside an `Exception` response and only fail the request that
//! caused them. A structurally invalid artifact is not an error at all: it is
//! reported as [`crate::ValidationError`] data on the loaded handle.

use crate::analysis::types::ArtifactId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised by the worker while handling one request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RemoteException {
    #[error("Artifact {0} is not loaded")]
    UnknownHandle(ArtifactId),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Errors surfaced to callers of the client-side bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The worker answered with a response of the wrong kind.
    #[error("Protocol violation: expected {expected} response, got {got}")]
    Protocol {
        expected: &'static str,
        got: &'static str,
    },

    #[error(transparent)]
    Remote(#[from] RemoteException),

    #[error("Worker handshake failed: {0}")]
    Handshake(String),

    #[error("Worker channel closed")]
    WorkerClosed,
}

impl BridgeError {
    /// True when the request referenced a destroyed or unknown artifact.
    pub fn is_unknown_handle(&self) -> bool {
        matches!(self, BridgeError::Remote(RemoteException::UnknownHandle(_)))
    }
}

impl<T> From<std::sync::mpsc::SendError<T>> for BridgeError {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        BridgeError::WorkerClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for BridgeError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        BridgeError::WorkerClosed
    }
}

/// Errors produced by an [`crate::engine::AnalysisEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to print module: {0}")]
    Print(String),

    #[error("Failed to parse module: {0}")]
    Parse(String),

    #[error("Range {start}..{end} is outside the artifact ({len} bytes)")]
    RangeOutOfBounds { start: u32, end: u32, len: usize },
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Print(format!("{e:#}"))
    }
}

impl From<wasmparser::BinaryReaderError> for EngineError {
    fn from(e: wasmparser::BinaryReaderError) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<EngineError> for RemoteException {
    fn from(e: EngineError) -> Self {
        RemoteException::Engine(e.to_string())
    }
}
