//! Analysis service handlers organized by request kind.

pub mod artifacts;
pub mod print;

use crate::analysis::types::ArtifactId;
use crate::error::RemoteException;
use std::collections::HashMap;

/// Live artifacts owned by the worker, keyed by the id handed to the client.
///
/// Only the worker loop touches the table, so no locking is involved.
pub struct ArtifactTable<A> {
    next_id: u64,
    entries: HashMap<ArtifactId, A>,
}

impl<A> Default for ArtifactTable<A> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: HashMap::new(),
        }
    }
}

impl<A> ArtifactTable<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an artifact under the next id (ids start at 0 and never repeat).
    pub fn insert(&mut self, artifact: A) -> ArtifactId {
        let id = ArtifactId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, artifact);
        id
    }

    pub fn get(&self, id: ArtifactId) -> Result<&A, RemoteException> {
        self.entries
            .get(&id)
            .ok_or(RemoteException::UnknownHandle(id))
    }

    pub fn remove(&mut self, id: ArtifactId) -> Option<A> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
