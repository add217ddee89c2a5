//! Client-side proxies for the analysis worker.

use crate::analysis::lifecycle::{Lifecycle, ReleaseGuard};
use crate::analysis::loop_impl::{spawn_worker, WorkerChannels};
use crate::analysis::request::{RequestBody, ResponseBody};
use crate::analysis::transport::Transport;
use crate::analysis::types::{ArtifactId, Item, PrintPart, Range, ValidationError};
use crate::engine::AnalysisEngine;
use crate::error::BridgeError;
use crate::tree::TreeNode;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Connection to one analysis worker; loads artifacts into handles.
#[derive(Clone)]
pub struct Analyzer {
    transport: Arc<Transport>,
    lifecycle: Arc<Lifecycle>,
}

impl Analyzer {
    /// Connect over an existing transport.
    pub fn new(transport: Transport) -> Self {
        let transport = Arc::new(transport);
        Self {
            lifecycle: Arc::new(Lifecycle::new(transport.clone())),
            transport,
        }
    }

    /// Spawn a worker thread running `engine` and connect to it.
    ///
    /// Returns the analyzer and the worker's join handle; the thread exits
    /// after [`Analyzer::shutdown`] or once every analyzer clone is dropped.
    pub async fn spawn<E>(engine: E) -> Result<(Self, thread::JoinHandle<()>), BridgeError>
    where
        E: AnalysisEngine + Send + 'static,
    {
        let WorkerChannels {
            requests,
            responses,
            thread,
        } = spawn_worker(engine).map_err(|e| BridgeError::Handshake(e.to_string()))?;
        let transport = Transport::connect(requests, responses).await?;
        Ok((Self::new(transport), thread))
    }

    /// Load an artifact. A structurally invalid artifact still yields a
    /// handle; check [`AnalysisHandle::validation_error`].
    pub async fn load(&self, bytes: Vec<u8>) -> Result<AnalysisHandle, BridgeError> {
        let len = bytes.len();
        match self.transport.send(RequestBody::Construct { bytes }).await? {
            ResponseBody::Constructed {
                artifact,
                items,
                error,
            } => {
                info!(
                    artifact = %artifact,
                    len,
                    items = items.len(),
                    valid = error.is_none(),
                    "Artifact loaded"
                );
                let guard = self.lifecycle.register(artifact);
                Ok(AnalysisHandle {
                    inner: Arc::new(HandleInner {
                        artifact,
                        items,
                        validation_error: error,
                        transport: self.transport.clone(),
                        rich: PrintCache::default(),
                        plain: PrintCache::default(),
                        guard,
                    }),
                })
            }
            other => Err(BridgeError::Protocol {
                expected: "constructed",
                got: other.name(),
            }),
        }
    }

    /// Artifacts loaded through this analyzer and not yet released.
    pub fn live_artifacts(&self) -> Vec<ArtifactId> {
        self.lifecycle.live()
    }

    /// Release every live artifact on the worker.
    pub async fn release_all(&self) {
        self.lifecycle.release_all().await;
    }

    /// Ask the worker loop to stop after answering.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        match self.transport.send(RequestBody::Shutdown).await? {
            ResponseBody::Stopped => Ok(()),
            other => Err(BridgeError::Protocol {
                expected: "stopped",
                got: other.name(),
            }),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }
}

/// Per-key cache that lets at most one fetch per key be in flight.
///
/// Concurrent callers for the same key wait on the same fetch; a failed
/// fetch leaves the slot empty so the next caller retries.
struct PrintCache<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for PrintCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> PrintCache<K, V> {
    fn slot(&self, key: K) -> Arc<OnceCell<V>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key).or_default().clone()
    }

    fn filled(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|cell| cell.initialized()).count()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, BridgeError>>,
    {
        let slot = self.slot(key.clone());
        match slot.get_or_try_init(fetch).await {
            Ok(value) => Ok(value.clone()),
            Err(err) => {
                // Drop the empty slot unless another caller has since filled
                // or replaced it.
                let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
                if slots
                    .get(&key)
                    .is_some_and(|cell| Arc::ptr_eq(cell, &slot) && !cell.initialized())
                {
                    slots.remove(&key);
                }
                Err(err)
            }
        }
    }
}

struct HandleInner {
    artifact: ArtifactId,
    items: Vec<Item>,
    validation_error: Option<ValidationError>,
    transport: Arc<Transport>,
    rich: PrintCache<String, Arc<[PrintPart]>>,
    plain: PrintCache<String, Arc<str>>,
    guard: ReleaseGuard,
}

/// Client-side proxy for one loaded artifact.
///
/// Clones share the same artifact and caches. The worker-side artifact is
/// destroyed when the last clone is dropped, or earlier via
/// [`AnalysisHandle::release`].
#[derive(Clone)]
pub struct AnalysisHandle {
    inner: Arc<HandleInner>,
}

impl AnalysisHandle {
    pub fn artifact(&self) -> ArtifactId {
        self.inner.artifact
    }

    pub fn items(&self) -> &[Item] {
        &self.inner.items
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.inner.validation_error.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.validation_error.is_none()
    }

    /// Build the containment tree over this artifact's items.
    pub fn tree(&self) -> TreeNode {
        TreeNode::build(&self.inner.items)
    }

    /// Fetch the artifact's canonical bytes. Never cached.
    pub async fn source(&self) -> Result<Vec<u8>, BridgeError> {
        let artifact = self.inner.artifact;
        match self.inner.transport.send(RequestBody::GetSource { artifact }).await? {
            ResponseBody::Source { bytes } => Ok(bytes),
            other => Err(BridgeError::Protocol {
                expected: "source",
                got: other.name(),
            }),
        }
    }

    /// Rich print a range. Repeated calls for the same range return the
    /// same shared parts without another round trip.
    pub async fn print_rich(&self, range: Range) -> Result<Arc<[PrintPart]>, BridgeError> {
        let artifact = self.inner.artifact;
        let transport = &self.inner.transport;
        self.inner
            .rich
            .get_or_fetch(range.key(), || async move {
                debug!(artifact = %artifact, range = %range, "Rich print cache miss");
                match transport.send(RequestBody::PrintRich { artifact, range }).await? {
                    ResponseBody::Rich { parts } => Ok(Arc::from(parts)),
                    other => Err(BridgeError::Protocol {
                        expected: "rich",
                        got: other.name(),
                    }),
                }
            })
            .await
    }

    /// Plain print a range, cached like [`AnalysisHandle::print_rich`].
    pub async fn print_plain(&self, range: Range) -> Result<Arc<str>, BridgeError> {
        let artifact = self.inner.artifact;
        let transport = &self.inner.transport;
        self.inner
            .plain
            .get_or_fetch(range.key(), || async move {
                debug!(artifact = %artifact, range = %range, "Plain print cache miss");
                match transport.send(RequestBody::PrintPlain { artifact, range }).await? {
                    ResponseBody::Plain { text } => Ok(Arc::from(text)),
                    other => Err(BridgeError::Protocol {
                        expected: "plain",
                        got: other.name(),
                    }),
                }
            })
            .await
    }

    /// Number of ranges with cached rich or plain output.
    pub fn cached_ranges(&self) -> usize {
        self.inner.rich.filled() + self.inner.plain.filled()
    }

    /// Destroy the worker-side artifact now instead of on drop.
    pub async fn release(&self) {
        self.inner.guard.release().await;
    }
}

impl std::fmt::Debug for AnalysisHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisHandle")
            .field("artifact", &self.inner.artifact)
            .field("items", &self.inner.items.len())
            .field("validation_error", &self.inner.validation_error)
            .finish()
    }
}
