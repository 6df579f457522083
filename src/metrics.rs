//! Metrics instrumentation for mcs-gateway-dns.
//!
//! All metrics are prefixed with `mcs_gw_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query decision.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::Delegated => "delegated",
        QueryResult::Error => "error",
    };

    counter!("mcs_gw_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("mcs_gw_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// A gateway record was synthesized.
    Answered,
    /// Name does not exist.
    NxDomain,
    /// Passed on to the next handler.
    Delegated,
    /// The answer could not be built.
    Error,
}

/// Record the outcome of a single reconciliation.
pub fn record_reconcile(outcome: ReconcileOutcome) {
    let outcome_str = match outcome {
        ReconcileOutcome::Observed => "observed",
        ReconcileOutcome::Removed => "removed",
        ReconcileOutcome::AlreadyAbsent => "already_absent",
        ReconcileOutcome::Inconclusive => "inconclusive",
    };

    counter!("mcs_gw_dns.reconcile.count", "outcome" => outcome_str).increment(1);
}

/// Reconciliation outcomes.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileOutcome {
    /// ServiceImport exists; identity added (or already present).
    Observed,
    /// ServiceImport is gone; identity removed.
    Removed,
    /// ServiceImport is gone and the identity was not indexed.
    AlreadyAbsent,
    /// Lookup failed; request handed back for redelivery.
    Inconclusive,
}

/// Record a watch event.
pub fn record_watch_event(event_type: WatchEventType) {
    let event_str = match event_type {
        WatchEventType::Added => "added",
        WatchEventType::Modified => "modified",
        WatchEventType::Deleted => "deleted",
        WatchEventType::Listed => "listed",
        WatchEventType::Bookmark => "bookmark",
        WatchEventType::Error => "error",
    };

    counter!("mcs_gw_dns.watch.event.count", "event" => event_str).increment(1);
}

/// Watch event types.
#[derive(Debug, Clone, Copy)]
pub enum WatchEventType {
    /// ServiceImport created.
    Added,
    /// ServiceImport changed.
    Modified,
    /// ServiceImport deleted.
    Deleted,
    /// Item returned by a (re)list.
    Listed,
    /// Resource version checkpoint.
    Bookmark,
    /// Error event from the API server.
    Error,
}

/// Record a watch reconnect.
pub fn record_watch_reconnect(reason: ReconnectReason) {
    let reason_str = match reason {
        ReconnectReason::StreamEnded => "stream_ended",
        ReconnectReason::Error => "error",
        ReconnectReason::Expired => "expired",
        ReconnectReason::InitialConnect => "initial_connect",
    };

    counter!("mcs_gw_dns.watch.reconnect.count", "reason" => reason_str).increment(1);
}

/// Reconnect reasons.
#[derive(Debug, Clone, Copy)]
pub enum ReconnectReason {
    /// Watch stream ended (server-side timeout).
    StreamEnded,
    /// Watch or list request failed.
    Error,
    /// Resource version too old, full relist needed.
    Expired,
    /// First connection to the API server.
    InitialConnect,
}

/// Record a full relist.
pub fn record_resync() {
    counter!("mcs_gw_dns.watch.resync.count").increment(1);
}

/// Record the number of indexed identities.
pub fn record_index_size(size: usize) {
    gauge!("mcs_gw_dns.index.size").set(size as f64);
}

/// Record whether the initial listing has been reconciled.
pub fn record_synced(synced: bool) {
    gauge!("mcs_gw_dns.index.synced").set(if synced { 1.0 } else { 0.0 });
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
