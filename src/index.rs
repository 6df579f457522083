//! In-memory membership index of known ServiceImports.
//!
//! The index is a set of canonical `name.namespace` identities. It is written
//! only by the reconciliation worker and read by every query handler, so it is
//! guarded by a single reader/writer lock. Nothing here performs I/O while the
//! lock is held.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::IndexError;
use crate::metrics;

/// Thread-safe set of ServiceImport identities.
///
/// Cloning yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    inner: Arc<RwLock<IndexInner>>,
}

#[derive(Debug, Default)]
struct IndexInner {
    /// Canonical identities (`name.namespace`).
    identities: HashSet<String>,

    /// True once the initial listing has been reconciled.
    synced: bool,
}

impl MembershipIndex {
    /// Create a new, empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity. Adding an identity twice is a no-op.
    ///
    /// Returns `true` if the identity was not present before.
    pub fn add(&self, identity: &str) -> bool {
        let mut inner = self.inner.write();
        let inserted = inner.identities.insert(identity.to_string());
        if inserted {
            debug!(identity, size = inner.identities.len(), "added service import");
        }
        inserted
    }

    /// Remove an identity.
    ///
    /// Fails with [`IndexError::NotFound`] if the identity is absent; the index
    /// is left unchanged in that case.
    pub fn remove(&self, identity: &str) -> Result<(), IndexError> {
        let mut inner = self.inner.write();
        if !inner.identities.remove(identity) {
            return Err(IndexError::NotFound(identity.to_string()));
        }
        debug!(identity, size = inner.identities.len(), "removed service import");
        Ok(())
    }

    /// Check whether an identity is present.
    pub fn contains(&self, identity: &str) -> bool {
        self.inner.read().identities.contains(identity)
    }

    /// Number of identities in the index.
    pub fn len(&self) -> usize {
        self.inner.read().identities.len()
    }

    /// True if the index holds no identities.
    pub fn is_empty(&self) -> bool {
        self.inner.read().identities.is_empty()
    }

    /// Snapshot of all identities, in no particular order.
    pub fn identities(&self) -> Vec<String> {
        self.inner.read().identities.iter().cloned().collect()
    }

    /// Mark the initial listing as reconciled.
    pub fn mark_synced(&self) {
        let mut inner = self.inner.write();
        inner.synced = true;
        debug!(size = inner.identities.len(), "membership index synced");
    }

    /// Check if the initial listing has been reconciled.
    pub fn is_synced(&self) -> bool {
        self.inner.read().synced
    }

    /// Emit current index metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_index_size(inner.identities.len());
        metrics::record_synced(inner.synced);
    }
}
