//! Error types for mcs-gateway-dns.

use thiserror::Error;

/// Errors that can occur while setting up or running the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Kubernetes API client error
    #[error("Kubernetes client error: {0}")]
    Client(#[from] ClientError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

/// Errors returned by [`MembershipIndex`](crate::index::MembershipIndex) mutators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The identity was not present in the index.
    #[error("service import {0} is not present in the index")]
    NotFound(String),
}

/// A query name whose zone-stripped remainder has no `name.namespace` split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed query name remainder: {0:?}")]
pub struct MalformedName(pub String);

/// Errors talking to the Kubernetes API server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API server answered with an unexpected status
    #[error("API server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading the service account token failed
    #[error("failed to read credentials: {0}")]
    Credentials(#[from] std::io::Error),

    /// Resolving API server credentials failed
    #[error("invalid credentials: {0}")]
    Kubeconfig(#[from] KubeconfigError),
}

/// Errors resolving API server credentials.
#[derive(Debug, Error)]
pub enum KubeconfigError {
    /// Reading the kubeconfig or a file it references failed
    #[error("failed to read kubeconfig: {0}")]
    Io(#[from] std::io::Error),

    /// The kubeconfig is not valid YAML
    #[error("failed to parse kubeconfig: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An inline `*-data` field is not valid base64
    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        /// Offending field.
        field: &'static str,
        /// Decoder error.
        source: base64::DecodeError,
    },

    /// Neither an explicit context nor `current-context` is set
    #[error("no context selected and no current-context set")]
    NoContext,

    /// The selected context does not exist
    #[error("context {0:?} not found in kubeconfig")]
    ContextNotFound(String),

    /// The context names a cluster that does not exist
    #[error("cluster {0:?} not found in kubeconfig")]
    ClusterNotFound(String),

    /// The context names a user that does not exist
    #[error("user {0:?} not found in kubeconfig")]
    UserNotFound(String),

    /// Only one of client certificate and client key is set
    #[error("client certificate and client key must be set together")]
    IncompleteClientCertificate,
}

/// Result of looking a ServiceImport up at its source of truth.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The resource is confirmed absent.
    #[error("service import not found")]
    NotFound,

    /// Neither presence nor absence could be established.
    #[error("lookup failed: {0}")]
    Unavailable(String),
}

impl From<ClientError> for LookupError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { status: 404, .. } => LookupError::NotFound,
            other => LookupError::Unavailable(other.to_string()),
        }
    }
}

/// Errors surfaced by a single reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The lookup was neither a clean hit nor a clean miss; the request must be
    /// redelivered.
    #[error("inconclusive lookup for {key}: {reason}")]
    InconclusiveLookup {
        /// `name.namespace` of the service import.
        key: String,
        /// Underlying lookup failure.
        reason: String,
    },
}
