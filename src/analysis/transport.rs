//! Correlation transport between the client and the analysis worker.
//!
//! Each request gets a fresh id and a single pending completion. A router
//! task reads responses from the worker and completes the matching entry
//! exactly once; responses nobody waits for are dropped.

use crate::analysis::request::{Request, RequestBody, RequestId, Response, ResponseBody, READY_ID};
use crate::error::BridgeError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc as async_mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Backoff between enqueue retries while the request queue is full.
const SEND_BACKOFF_MS: u64 = 25;

type Completion = oneshot::Sender<Result<ResponseBody, BridgeError>>;

#[derive(Default)]
struct PendingTable {
    entries: HashMap<RequestId, Completion>,
    /// Set once the worker's response channel is gone.
    closed: bool,
}

#[derive(Default)]
struct Pending {
    table: Mutex<PendingTable>,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, id: RequestId, completion: Completion) -> Result<(), BridgeError> {
        let mut table = self.lock();
        if table.closed {
            return Err(BridgeError::WorkerClosed);
        }
        table.entries.insert(id, completion);
        Ok(())
    }

    fn take(&self, id: RequestId) -> Option<Completion> {
        self.lock().entries.remove(&id)
    }

    /// Fail everything still waiting and refuse new registrations.
    fn close(&self) -> usize {
        let drained: Vec<Completion> = {
            let mut table = self.lock();
            table.closed = true;
            table.entries.drain().map(|(_, c)| c).collect()
        };
        let count = drained.len();
        for completion in drained {
            let _ = completion.send(Err(BridgeError::WorkerClosed));
        }
        count
    }
}

/// Client end of the request/response protocol.
pub struct Transport {
    next_id: AtomicU64,
    pending: Arc<Pending>,
    outbound: mpsc::SyncSender<Request>,
    router: JoinHandle<()>,
}

impl Transport {
    /// Wait for the worker's ready handshake, then start routing responses.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(
        outbound: mpsc::SyncSender<Request>,
        mut inbound: async_mpsc::UnboundedReceiver<Response>,
    ) -> Result<Self, BridgeError> {
        match inbound.recv().await {
            Some(Response {
                id: READY_ID,
                body: ResponseBody::Ready,
            }) => debug!("Worker handshake complete"),
            Some(other) => {
                return Err(BridgeError::Handshake(format!(
                    "expected ready with id {READY_ID}, got {} with id {}",
                    other.body.name(),
                    other.id
                )))
            }
            None => return Err(BridgeError::WorkerClosed),
        }

        let pending = Arc::new(Pending::default());
        let router = tokio::spawn(route_responses(inbound, pending.clone()));
        Ok(Self {
            next_id: AtomicU64::new(READY_ID + 1),
            pending,
            outbound,
            router,
        })
    }

    fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for its response.
    ///
    /// An `Exception` response fails only this call. There is no timeout:
    /// the call waits until the worker answers or goes away.
    pub async fn send(&self, body: RequestBody) -> Result<ResponseBody, BridgeError> {
        let id = self.next_id();
        let kind = body.name();
        let (tx, rx) = oneshot::channel();
        // Register before sending so an early response cannot be missed.
        self.pending.register(id, tx)?;

        if let Err(e) = self.enqueue(Request { id, body }).await {
            self.pending.take(id);
            return Err(e);
        }
        debug!(id, kind, "Request sent");
        rx.await?
    }

    /// Send a request without waiting for (or routing) its response.
    ///
    /// Used from `Drop`, so it never blocks: if the queue is full the send is
    /// retried on the current runtime when there is one, otherwise dropped.
    pub fn post(&self, body: RequestBody) -> Result<RequestId, BridgeError> {
        let id = self.next_id();
        match self.outbound.try_send(Request { id, body }) {
            Ok(()) => Ok(id),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(BridgeError::WorkerClosed),
            Err(mpsc::TrySendError::Full(req)) => {
                let handle = tokio::runtime::Handle::try_current().map_err(|_| {
                    warn!(id, kind = req.body.name(), "Request queue full, dropping request");
                    BridgeError::WorkerClosed
                })?;
                let outbound = self.outbound.clone();
                handle.spawn(async move {
                    if let Err(e) = enqueue_with_retry(&outbound, req).await {
                        debug!(id, error = %e, "Deferred request not delivered");
                    }
                });
                Ok(id)
            }
        }
    }

    async fn enqueue(&self, req: Request) -> Result<(), BridgeError> {
        enqueue_with_retry(&self.outbound, req).await
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().entries.len()
    }

    /// Whether the worker's response channel has closed.
    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn enqueue_with_retry(
    outbound: &mpsc::SyncSender<Request>,
    req: Request,
) -> Result<(), BridgeError> {
    let mut pending = req;
    loop {
        match outbound.try_send(pending) {
            Ok(()) => return Ok(()),
            Err(mpsc::TrySendError::Full(req)) => {
                pending = req;
                tokio::time::sleep(Duration::from_millis(SEND_BACKOFF_MS)).await;
            }
            Err(mpsc::TrySendError::Disconnected(_)) => return Err(BridgeError::WorkerClosed),
        }
    }
}

async fn route_responses(mut inbound: async_mpsc::UnboundedReceiver<Response>, pending: Arc<Pending>) {
    while let Some(Response { id, body }) = inbound.recv().await {
        let Some(completion) = pending.take(id) else {
            debug!(id, kind = body.name(), "Dropping unroutable response");
            continue;
        };
        let result = match body {
            ResponseBody::Exception { error } => Err(BridgeError::Remote(error)),
            body => Ok(body),
        };
        if completion.send(result).is_err() {
            debug!(id, "Requester stopped waiting for response");
        }
    }
    let failed = pending.close();
    info!(failed, "Worker response channel closed");
}
