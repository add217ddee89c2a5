//! Client/worker analysis bridge.
//!
//! Artifacts are parsed and printed on a dedicated worker thread that owns
//! them. The client side talks to it through a correlated request/response
//! channel: every request carries an id, and the worker echoes that id on
//! exactly one response.

pub mod handlers;
pub mod lifecycle;
mod loop_impl;
pub mod request;
pub mod transport;
pub mod types;
pub mod worker;

pub use loop_impl::{run_analysis_loop, spawn_worker, WorkerChannels, REQUEST_QUEUE_CAPACITY};
pub use request::{Request, RequestBody, RequestId, Response, ResponseBody};
pub use transport::Transport;
pub use types::*;
pub use worker::{AnalysisHandle, Analyzer};
