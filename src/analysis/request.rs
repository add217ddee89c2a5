//! Wire messages exchanged between the client bridge and the analysis worker.
//!
//! Every [`Request`] carries an id; the worker echoes it on the single
//! [`Response`] it produces so the client can route replies that arrive out
//! of order. Id `0` is reserved for the worker's startup handshake.

use crate::analysis::types::{ArtifactId, Item, PrintPart, Range, ValidationError};
use crate::error::RemoteException;
use serde::{Deserialize, Serialize};

/// Correlation id of a request.
pub type RequestId = u64;

/// Id of the `Ready` message the worker sends once before any other traffic.
pub const READY_ID: RequestId = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub body: RequestBody,
}

/// Request kinds understood by the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestBody {
    Construct { bytes: Vec<u8> },
    Destroy { artifact: ArtifactId },
    GetSource { artifact: ArtifactId },
    PrintRich { artifact: ArtifactId, range: Range },
    PrintPlain { artifact: ArtifactId, range: Range },
    Shutdown,
}

impl RequestBody {
    pub fn name(&self) -> &'static str {
        match self {
            RequestBody::Construct { .. } => "construct",
            RequestBody::Destroy { .. } => "destroy",
            RequestBody::GetSource { .. } => "get_source",
            RequestBody::PrintRich { .. } => "print_rich",
            RequestBody::PrintPlain { .. } => "print_plain",
            RequestBody::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub body: ResponseBody,
}

/// Response kinds; each mirrors a request kind, plus `Ready` and `Exception`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Ready,
    Constructed {
        artifact: ArtifactId,
        items: Vec<Item>,
        error: Option<ValidationError>,
    },
    Destroyed,
    Source { bytes: Vec<u8> },
    Rich { parts: Vec<PrintPart> },
    Plain { text: String },
    Stopped,
    Exception { error: RemoteException },
}

impl ResponseBody {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseBody::Ready => "ready",
            ResponseBody::Constructed { .. } => "constructed",
            ResponseBody::Destroyed => "destroyed",
            ResponseBody::Source { .. } => "source",
            ResponseBody::Rich { .. } => "rich",
            ResponseBody::Plain { .. } => "plain",
            ResponseBody::Stopped => "stopped",
            ResponseBody::Exception { .. } => "exception",
        }
    }
}

impl Response {
    pub fn ready() -> Self {
        Self {
            id: READY_ID,
            body: ResponseBody::Ready,
        }
    }

    pub fn exception(id: RequestId, error: RemoteException) -> Self {
        Self {
            id,
            body: ResponseBody::Exception { error },
        }
    }
}
