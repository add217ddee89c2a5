//! Worker-side resource reclamation for client handles.
//!
//! Every loaded artifact is tracked here until it is released, either
//! explicitly or when the last clone of its handle is dropped. Releasing
//! sends a `Destroy` request; it never fails, because the worker may already
//! be gone and destroy is idempotent on the worker side anyway.

use crate::analysis::request::RequestBody;
use crate::analysis::transport::Transport;
use crate::analysis::types::ArtifactId;
use crate::error::BridgeError;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub struct Lifecycle {
    transport: Arc<Transport>,
    live: Mutex<BTreeSet<ArtifactId>>,
}

impl Lifecycle {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            live: Mutex::new(BTreeSet::new()),
        }
    }

    fn lock_live(&self) -> MutexGuard<'_, BTreeSet<ArtifactId>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking `artifact`; the returned guard releases it on drop.
    pub(crate) fn register(self: &Arc<Self>, artifact: ArtifactId) -> ReleaseGuard {
        self.lock_live().insert(artifact);
        ReleaseGuard {
            artifact,
            lifecycle: self.clone(),
            released: AtomicBool::new(false),
        }
    }

    /// Artifacts that have been loaded and not yet released.
    pub fn live(&self) -> Vec<ArtifactId> {
        self.lock_live().iter().copied().collect()
    }

    /// Destroy `artifact` on the worker and wait for the acknowledgement.
    pub async fn release(&self, artifact: ArtifactId) {
        self.lock_live().remove(&artifact);
        match self.transport.send(RequestBody::Destroy { artifact }).await {
            Ok(_) => debug!(artifact = %artifact, "Artifact released"),
            Err(e) => debug!(artifact = %artifact, error = %e, "Release not acknowledged"),
        }
    }

    /// Release every tracked artifact, e.g. at the end of a session.
    ///
    /// Handles that are still alive keep working locally but their worker
    /// side is gone; later round trips fail with an unknown-handle error.
    pub async fn release_all(&self) {
        let live: Vec<ArtifactId> = std::mem::take(&mut *self.lock_live()).into_iter().collect();
        for artifact in live {
            self.release(artifact).await;
        }
    }

    /// Fire-and-forget variant used from `Drop`.
    fn release_detached(&self, artifact: ArtifactId) {
        let was_live = self.lock_live().remove(&artifact);
        if !was_live {
            return;
        }
        match self.transport.post(RequestBody::Destroy { artifact }) {
            Ok(id) => debug!(id, artifact = %artifact, "Destroy posted for dropped handle"),
            Err(BridgeError::WorkerClosed) => {
                debug!(artifact = %artifact, "Worker already gone, nothing to destroy")
            }
            Err(e) => debug!(artifact = %artifact, error = %e, "Failed to post destroy"),
        }
    }
}

/// Owned by a handle; releases the artifact at most once.
pub(crate) struct ReleaseGuard {
    artifact: ArtifactId,
    lifecycle: Arc<Lifecycle>,
    released: AtomicBool,
}

impl ReleaseGuard {
    /// Mark released and return whether this call was the first.
    fn claim(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    pub(crate) async fn release(&self) {
        if self.claim() {
            self.lifecycle.release(self.artifact).await;
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.claim() {
            self.lifecycle.release_detached(self.artifact);
        }
    }
}
