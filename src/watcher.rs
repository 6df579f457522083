//! ServiceImport watcher feeding the reconciliation queue.
//!
//! The watcher lists every ServiceImport once, enqueues each key together
//! with any indexed identity the listing no longer contains, waits for the
//! queue to drain and then marks the index synced. After that it follows the
//! watch stream, enqueueing the key of every ADDED, MODIFIED or DELETED event.
//! An expired resource version triggers a fresh list.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;
use crate::identity::ServiceKey;
use crate::index::MembershipIndex;
use crate::kubernetes::{ServiceImport, ServiceImportList, WatchEvent};
use crate::metrics::{self, ReconnectReason, WatchEventType};
use crate::reconcile::WorkQueue;

const MAX_BACKOFF_SECS: u64 = 30;

/// Interval at which the initial sync checks for an idle queue.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// HTTP status signalling that a resource version is too old to watch from.
const GONE: u16 = 410;

/// Source of ServiceImport listings and watch streams.
#[async_trait]
pub trait ServiceImportSource: Send + Sync {
    /// List the collection.
    async fn list(&self) -> Result<ServiceImportList, ClientError>;

    /// Watch the collection from `resource_version`.
    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClientError>>, ClientError>;
}

#[async_trait]
impl<T: ServiceImportSource + ?Sized> ServiceImportSource for Arc<T> {
    async fn list(&self) -> Result<ServiceImportList, ClientError> {
        (**self).list().await
    }

    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClientError>>, ClientError> {
        (**self).watch(resource_version).await
    }
}

/// What to do after handling a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Continue,
    Reconnect,
    Relist,
}

/// Keys of indexed identities missing from a listing.
pub fn stale_keys(identities: &[String], listed: &HashSet<ServiceKey>) -> Vec<ServiceKey> {
    identities
        .iter()
        .filter_map(|identity| {
            let key = ServiceKey::from_identity(identity);
            if key.is_none() {
                warn!(identity = %identity, "Indexed identity cannot be split into name and namespace");
            }
            key
        })
        .filter(|key| !listed.contains(key))
        .collect()
}

/// Sleep for `duration`, returning `true` if shutdown was requested meanwhile.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Follows ServiceImports and enqueues their keys.
pub struct ServiceImportWatcher<S> {
    source: S,
    index: MembershipIndex,
    queue: WorkQueue,
}

impl<S: ServiceImportSource> ServiceImportWatcher<S> {
    /// Create a new watcher.
    pub fn new(source: S, index: MembershipIndex, queue: WorkQueue) -> Self {
        Self {
            source,
            index,
            queue,
        }
    }

    /// List, reconcile and watch until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff_secs = 1u64;
        let mut first_connect = true;
        let mut resource_version: Option<String> = None;

        loop {
            if *shutdown.borrow() {
                info!("ServiceImport watcher shutting down");
                return;
            }

            let rv = match resource_version.take() {
                Some(rv) => rv,
                None => match self.relist(&mut shutdown).await {
                    Ok(Some(rv)) => rv,
                    Ok(None) => {
                        info!("Shutdown requested before initial sync completed");
                        return;
                    }
                    Err(e) => {
                        error!("Failed to list service imports: {}", e);
                        metrics::record_watch_reconnect(ReconnectReason::Error);
                        if sleep_or_shutdown(Duration::from_secs(backoff_secs), &mut shutdown).await {
                            return;
                        }
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        continue;
                    }
                },
            };

            debug!(resource_version = %rv, "Starting service import watch");

            let mut stream = match self.source.watch(&rv).await {
                Ok(s) => {
                    backoff_secs = 1;
                    if first_connect {
                        metrics::record_watch_reconnect(ReconnectReason::InitialConnect);
                        first_connect = false;
                    }
                    s
                }
                Err(ClientError::Status { status: GONE, .. }) => {
                    warn!(resource_version = %rv, "Resource version expired, relisting");
                    metrics::record_watch_reconnect(ReconnectReason::Expired);
                    metrics::record_resync();
                    continue;
                }
                Err(e) => {
                    error!("Failed to watch service imports: {}", e);
                    metrics::record_watch_reconnect(ReconnectReason::Error);
                    resource_version = Some(rv);
                    if sleep_or_shutdown(Duration::from_secs(backoff_secs), &mut shutdown).await {
                        return;
                    }
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }
            };

            let mut current = rv;
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.changed() => {
                        info!("ServiceImport watcher received shutdown signal");
                        return;
                    }

                    result = stream.next() => {
                        match result {
                            Some(Ok(event)) => match self.handle_event(event, &mut current) {
                                Next::Continue => {}
                                Next::Reconnect => {
                                    metrics::record_watch_reconnect(ReconnectReason::Error);
                                    resource_version = Some(current);
                                    break;
                                }
                                Next::Relist => {
                                    metrics::record_watch_reconnect(ReconnectReason::Expired);
                                    metrics::record_resync();
                                    break;
                                }
                            },
                            Some(Err(e)) => {
                                warn!("Service import watch error: {}", e);
                                metrics::record_watch_reconnect(ReconnectReason::Error);
                                resource_version = Some(current);
                                break;
                            }
                            None => {
                                debug!("Service import watch stream ended");
                                metrics::record_watch_reconnect(ReconnectReason::StreamEnded);
                                resource_version = Some(current);
                                break;
                            }
                        }
                    }
                }
            }

            if sleep_or_shutdown(Duration::from_secs(1), &mut shutdown).await {
                return;
            }
        }
    }

    /// List the collection and enqueue every listed key plus every stale
    /// identity. On the first call, waits for the queue to drain and marks
    /// the index synced.
    ///
    /// Returns the resource version to watch from, or `None` on shutdown.
    async fn relist(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<String>, ClientError> {
        info!("Listing service imports");
        let list = self.source.list().await?;

        let listed: HashSet<ServiceKey> = list.items.iter().map(ServiceImport::key).collect();
        let stale = stale_keys(&self.index.identities(), &listed);

        info!(
            listed = listed.len(),
            stale = stale.len(),
            "Enqueueing listed service imports"
        );

        for key in listed {
            metrics::record_watch_event(WatchEventType::Listed);
            self.queue.add(key);
        }
        for key in stale {
            debug!(%key, "Indexed service import missing from listing");
            self.queue.add(key);
        }

        if !self.index.is_synced() {
            while !self.queue.is_idle() {
                if sleep_or_shutdown(SYNC_POLL_INTERVAL, shutdown).await {
                    return Ok(None);
                }
            }
            self.index.mark_synced();
            info!(identities = self.index.len(), "Initial service import sync complete");
        }

        Ok(Some(list.metadata.resource_version.unwrap_or_default()))
    }

    /// Apply one watch event, advancing `resource_version`.
    fn handle_event(&self, event: WatchEvent, resource_version: &mut String) -> Next {
        let (import, event_type) = match event {
            WatchEvent::Added(import) => (import, WatchEventType::Added),
            WatchEvent::Modified(import) => (import, WatchEventType::Modified),
            WatchEvent::Deleted(import) => (import, WatchEventType::Deleted),
            WatchEvent::Bookmark(import) => {
                metrics::record_watch_event(WatchEventType::Bookmark);
                if let Some(rv) = import.metadata.resource_version {
                    *resource_version = rv;
                }
                return Next::Continue;
            }
            WatchEvent::Error(status) => {
                metrics::record_watch_event(WatchEventType::Error);
                warn!(
                    code = status.code,
                    reason = %status.reason,
                    message = %status.message,
                    "Service import watch error event"
                );
                return if status.code == GONE {
                    Next::Relist
                } else {
                    Next::Reconnect
                };
            }
        };

        metrics::record_watch_event(event_type);
        debug!(key = %import.key(), event = ?event_type, "Service import event");

        if let Some(ref rv) = import.metadata.resource_version {
            resource_version.clone_from(rv);
        }
        self.queue.add(import.key());
        Next::Continue
    }
}
