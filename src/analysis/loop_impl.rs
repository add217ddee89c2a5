//! Analysis service loop.

use crate::analysis::handlers::{artifacts, print, ArtifactTable};
use crate::analysis::request::{Request, RequestBody, Response, ResponseBody};
use crate::engine::AnalysisEngine;
use crate::error::RemoteException;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use tokio::sync::mpsc as async_mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the bounded request queue feeding the worker.
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Log result with debug on success and warn on error.
macro_rules! log_result {
    ($id:expr, $result:expr, $ok_msg:literal, $err_msg:literal) => {
        match &$result {
            Ok(_) => debug!(id = $id, $ok_msg),
            Err(e) => warn!(id = $id, error = %e, $err_msg),
        }
    };
}

/// Channel ends the client keeps after spawning a worker thread.
pub struct WorkerChannels {
    pub requests: mpsc::SyncSender<Request>,
    pub responses: async_mpsc::UnboundedReceiver<Response>,
    pub thread: thread::JoinHandle<()>,
}

/// Spawn the analysis service on its own OS thread.
pub fn spawn_worker<E>(engine: E) -> std::io::Result<WorkerChannels>
where
    E: AnalysisEngine + Send + 'static,
{
    let (req_tx, req_rx) = mpsc::sync_channel(REQUEST_QUEUE_CAPACITY);
    let (resp_tx, resp_rx) = async_mpsc::unbounded_channel();
    let thread = thread::Builder::new()
        .name("analysis-worker".to_string())
        .spawn(move || run_analysis_loop(engine, req_rx, resp_tx))?;
    Ok(WorkerChannels {
        requests: req_tx,
        responses: resp_rx,
        thread,
    })
}

/// Run the analysis service on the current thread.
///
/// Sends the `Ready` handshake, then answers requests strictly in arrival
/// order until `Shutdown` is received or either channel closes. A failing or
/// panicking engine call only turns into an `Exception` response for that
/// request.
pub fn run_analysis_loop<E: AnalysisEngine>(
    mut engine: E,
    rx: mpsc::Receiver<Request>,
    tx: async_mpsc::UnboundedSender<Response>,
) {
    let mut table = ArtifactTable::new();

    if tx.send(Response::ready()).is_err() {
        warn!("Client went away before the ready handshake");
        return;
    }
    info!("Analysis worker ready");

    while let Ok(Request { id, body }) = rx.recv() {
        let shutdown = matches!(body, RequestBody::Shutdown);
        let result = catch_unwind(AssertUnwindSafe(|| {
            dispatch(&mut engine, &mut table, id, body)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(id, panic = %message, "Engine panicked while handling request");
            Err(RemoteException::Engine(format!("engine panicked: {message}")))
        });

        let body = match result {
            Ok(body) => body,
            Err(error) => ResponseBody::Exception { error },
        };
        if tx.send(Response { id, body }).is_err() {
            info!("Client dropped the response channel, stopping worker");
            break;
        }
        if shutdown {
            break;
        }
    }

    info!(live = table.len(), "Analysis worker stopped");
}

fn dispatch<E: AnalysisEngine>(
    engine: &mut E,
    table: &mut ArtifactTable<E::Artifact>,
    id: u64,
    body: RequestBody,
) -> Result<ResponseBody, RemoteException> {
    match body {
        RequestBody::Construct { bytes } => {
            info!(id, len = bytes.len(), "Constructing artifact");
            let result = artifacts::handle_construct(engine, table, bytes);
            match &result {
                Ok(ResponseBody::Constructed {
                    artifact,
                    items,
                    error: Some(invalid),
                }) => warn!(
                    id,
                    artifact = %artifact,
                    items = items.len(),
                    error = %invalid,
                    "Artifact stored but failed validation"
                ),
                Ok(ResponseBody::Constructed { artifact, items, .. }) => {
                    info!(id, artifact = %artifact, items = items.len(), "Artifact constructed")
                }
                Ok(_) => {}
                Err(e) => error!(id, error = %e, "Failed to construct artifact"),
            }
            result
        }
        RequestBody::Destroy { artifact } => {
            debug!(id, artifact = %artifact, "Destroying artifact");
            Ok(artifacts::handle_destroy(table, artifact))
        }
        RequestBody::GetSource { artifact } => {
            debug!(id, artifact = %artifact, "Exporting source");
            let result = artifacts::handle_get_source(engine, table, artifact);
            log_result!(id, result, "Source exported", "Failed to export source");
            result
        }
        RequestBody::PrintRich { artifact, range } => {
            debug!(id, artifact = %artifact, range = %range, "Rich printing");
            let result = print::handle_print_rich(engine, table, artifact, range);
            log_result!(id, result, "Rich print complete", "Failed to rich print");
            result
        }
        RequestBody::PrintPlain { artifact, range } => {
            debug!(id, artifact = %artifact, range = %range, "Plain printing");
            let result = print::handle_print_plain(engine, table, artifact, range);
            log_result!(id, result, "Plain print complete", "Failed to plain print");
            result
        }
        RequestBody::Shutdown => {
            info!(id, "Shutdown requested");
            Ok(ResponseBody::Stopped)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{ArtifactId, Item, PrintPart, Range, ValidationError};
    use crate::engine::Construction;
    use crate::error::EngineError;

    /// Engine whose artifacts are their raw bytes; `b"bad"` fails validation
    /// and printing a range starting at 666 panics.
    struct FakeEngine;

    impl AnalysisEngine for FakeEngine {
        type Artifact = Vec<u8>;

        fn construct(&mut self, bytes: Vec<u8>) -> Result<Construction<Vec<u8>>, EngineError> {
            let error = (bytes == b"bad").then(|| ValidationError {
                message: "bad magic".into(),
                offset: 0,
            });
            let items = vec![Item::new("module", Range::new(0, bytes.len() as u32))];
            Ok(Construction {
                artifact: bytes,
                items,
                error,
            })
        }

        fn print_rich(&self, _: &Vec<u8>, range: Range) -> Result<Vec<PrintPart>, EngineError> {
            if range.start == 666 {
                panic!("boom");
            }
            Ok(vec![PrintPart::Str(range.key())])
        }

        fn print_plain(&self, _: &Vec<u8>, range: Range) -> Result<String, EngineError> {
            Err(EngineError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: 0,
            })
        }

        fn source(&self, artifact: &Vec<u8>) -> Result<Vec<u8>, EngineError> {
            Ok(artifact.clone())
        }
    }

    fn run(requests: Vec<RequestBody>) -> Vec<Response> {
        let (req_tx, req_rx) = mpsc::sync_channel(16);
        let (resp_tx, mut resp_rx) = async_mpsc::unbounded_channel();
        for (i, body) in requests.into_iter().enumerate() {
            req_tx
                .send(Request {
                    id: i as u64 + 1,
                    body,
                })
                .unwrap();
        }
        drop(req_tx);
        run_analysis_loop(FakeEngine, req_rx, resp_tx);
        let mut out = Vec::new();
        while let Ok(resp) = resp_rx.try_recv() {
            out.push(resp);
        }
        out
    }

    #[test]
    fn sends_ready_first_and_echoes_ids() {
        let responses = run(vec![
            RequestBody::Construct { bytes: b"abc".to_vec() },
            RequestBody::GetSource { artifact: ArtifactId(0) },
        ]);
        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0].body, ResponseBody::Ready));
        assert_eq!(responses[0].id, 0);
        assert_eq!(responses[1].id, 1);
        assert_eq!(responses[2].id, 2);
        match &responses[2].body {
            ResponseBody::Source { bytes } => assert_eq!(bytes, b"abc"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_artifact_is_stored_with_no_items() {
        let responses = run(vec![
            RequestBody::Construct { bytes: b"bad".to_vec() },
            RequestBody::GetSource { artifact: ArtifactId(0) },
        ]);
        match &responses[1].body {
            ResponseBody::Constructed { artifact, items, error } => {
                assert_eq!(*artifact, ArtifactId(0));
                assert!(items.is_empty());
                assert_eq!(error.as_ref().unwrap().message, "bad magic");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(responses[2].body, ResponseBody::Source { .. }));
    }

    #[test]
    fn destroy_twice_succeeds_both_times() {
        let responses = run(vec![
            RequestBody::Construct { bytes: b"abc".to_vec() },
            RequestBody::Destroy { artifact: ArtifactId(0) },
            RequestBody::Destroy { artifact: ArtifactId(0) },
        ]);
        assert!(matches!(responses[2].body, ResponseBody::Destroyed));
        assert!(matches!(responses[3].body, ResponseBody::Destroyed));
    }

    #[test]
    fn unknown_handle_does_not_stop_the_loop() {
        let responses = run(vec![
            RequestBody::PrintRich {
                artifact: ArtifactId(4),
                range: Range::new(0, 1),
            },
            RequestBody::Construct { bytes: b"abc".to_vec() },
        ]);
        match &responses[1].body {
            ResponseBody::Exception { error } => {
                assert_eq!(*error, RemoteException::UnknownHandle(ArtifactId(4)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(responses[2].body, ResponseBody::Constructed { .. }));
    }

    #[test]
    fn engine_errors_and_panics_become_exceptions() {
        let responses = run(vec![
            RequestBody::Construct { bytes: b"abc".to_vec() },
            RequestBody::PrintPlain {
                artifact: ArtifactId(0),
                range: Range::new(0, 3),
            },
            RequestBody::PrintRich {
                artifact: ArtifactId(0),
                range: Range::new(666, 667),
            },
            RequestBody::PrintRich {
                artifact: ArtifactId(0),
                range: Range::new(1, 2),
            },
        ]);
        assert!(matches!(
            responses[2].body,
            ResponseBody::Exception { error: RemoteException::Engine(_) }
        ));
        match &responses[3].body {
            ResponseBody::Exception { error: RemoteException::Engine(msg) } => {
                assert!(msg.contains("boom"), "{msg}")
            }
            other => panic!("unexpected {other:?}"),
        }
        match &responses[4].body {
            ResponseBody::Rich { parts } => assert_eq!(parts, &vec![PrintPart::Str("1-2".into())]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shutdown_replies_then_stops() {
        let responses = run(vec![
            RequestBody::Shutdown,
            RequestBody::Construct { bytes: b"abc".to_vec() },
        ]);
        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[1].body, ResponseBody::Stopped));
    }
}
