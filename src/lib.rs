//! MCS Gateway DNS - answers multi-cluster service names with a gateway address.
//!
//! Names of the form `<name>.<namespace>.<zone>` resolve to a configured
//! gateway (A and AAAA) whenever a Kubernetes `ServiceImport`
//! (`multicluster.x-k8s.io/v1alpha1`) with that name and namespace exists.
//! The set of known services is kept in memory and follows the API server
//! through a list + watch loop.
//!
//! ## Features
//!
//! - Authoritative A/AAAA answers for imported services, case preserved
//! - NXDOMAIN or fallthrough to the next authority for unknown names
//! - In-cluster service account or kubeconfig (with context) credentials
//! - Idempotent reconciliation: every event is confirmed by a fresh lookup
//! - Relist on expired resource versions, with stale identities re-checked
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         mcs-gateway-dns                          │
//! │                                                                  │
//! │  ┌────────────────┐  keys  ┌────────────┐  get   ┌───────────┐  │
//! │  │ ServiceImport  │───────▶│ Work queue │───────▶│ Reconcile │──┼──▶ API server
//! │  │ watcher        │        └────────────┘        │ worker    │  │
//! │  └───────┬────────┘                              └─────┬─────┘  │
//! │          │ list/watch                       add/remove │        │
//! │          ▼                                             ▼        │
//! │     API server                              ┌──────────────────┐│
//! │                                             │ Membership index ││
//! │                                             └────────┬─────────┘│
//! │                                                      │ contains │
//! │                          ┌──────────────────┐        │          │
//! │             UDP/TCP ────▶│ Hickory catalog  │──▶ QueryResolver  │
//! │             :53          │ GatewayAuthority │                   │
//! │                          │ TerminalAuthority│                   │
//! │                          └──────────────────┘                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! myservice.test.svc.clusterset.local.
//!   → zone svc.clusterset.local., identity "myservice.test"
//!   → indexed     → A 1.1.1.1 / AAAA fd00::1, authoritative
//!   → not indexed → NXDOMAIN, or REFUSED when fallthrough applies
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use mcs_gateway_dns::{DnsConfig, DnsServer, GatewayConfig, KubernetesConfig};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig {
//!         listen_addr: "[::]:5353".parse().unwrap(),
//!         zones: vec!["svc.clusterset.local.".to_string()],
//!         gateway: GatewayConfig { ipv4: "10.0.0.10".parse().unwrap(), ipv6: None },
//!         ttl: 5,
//!         fallthrough: None,
//!     };
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         let _ = shutdown_tx.send(true);
//!     });
//!
//!     let server = DnsServer::new(config, KubernetesConfig::default());
//!     server.run(shutdown_rx).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod kubeconfig;
pub mod kubernetes;
pub mod metrics;
pub mod reconcile;
pub mod resolver;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod watcher;
pub mod zone;

// Re-export main types
pub use config::{Config, DnsConfig, GatewayConfig, KubernetesConfig, TelemetryConfig};
pub use error::DnsError;
pub use index::MembershipIndex;
pub use resolver::{QueryResolver, Resolution, Resolve};
pub use server::{build_catalog, DnsServer};
