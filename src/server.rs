//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::authority::{GatewayAuthority, TerminalAuthority};
use crate::config::{DnsConfig, KubernetesConfig};
use crate::error::DnsError;
use crate::index::MembershipIndex;
use crate::kubernetes::KubeClient;
use crate::reconcile::{work_queue, ReconciliationWorker};
use crate::resolver::{QueryResolver, Resolve};
use crate::watcher::ServiceImportWatcher;

/// Interval for emitting index metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Interval at which startup checks for the initial sync.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Periodically emit index metrics.
async fn metrics_loop(index: MembershipIndex, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                index.emit_metrics();
                debug!(identities = index.len(), "emitted index metrics");
            }
            _ = shutdown.changed() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Build a catalog with one gateway authority per configured zone, all
/// sharing a single resolver over `index`. Each zone's chain ends in a
/// [`TerminalAuthority`], so delegated queries are answered with REFUSED.
pub fn build_catalog(config: &DnsConfig, index: MembershipIndex) -> Result<Catalog, DnsError> {
    let resolver = QueryResolver::from_config(config, index)?;
    let zones: Vec<String> = resolver.zones().iter().map(String::from).collect();
    let resolver: Arc<dyn Resolve> = Arc::new(resolver);

    let mut catalog = Catalog::new();
    for zone in zones {
        let gateway: Arc<dyn AuthorityObject> = Arc::new(GatewayAuthority::new(&zone, resolver.clone())?);
        let terminal: Arc<dyn AuthorityObject> = Arc::new(TerminalAuthority::new(&zone)?);
        catalog.upsert(gateway.origin().clone(), vec![gateway, terminal]);
        debug!(zone = %zone, "registered gateway authority");
    }

    Ok(catalog)
}

/// DNS server answering multi-cluster service names with the gateway address.
pub struct DnsServer {
    dns: DnsConfig,
    kubernetes: KubernetesConfig,
    index: MembershipIndex,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(dns: DnsConfig, kubernetes: KubernetesConfig) -> Self {
        Self {
            dns,
            kubernetes,
            index: MembershipIndex::new(),
        }
    }

    /// Get a reference to the membership index.
    pub fn index(&self) -> &MembershipIndex {
        &self.index
    }

    /// Run the DNS server until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), DnsError> {
        self.dns.validate()?;

        info!(
            listen_addr = %self.dns.listen_addr,
            zones = ?self.dns.zones,
            gateway_ipv4 = %self.dns.gateway.ipv4,
            gateway_ipv6 = %self.dns.gateway.ipv6(),
            api_server = %self.kubernetes.api_server,
            "Starting mcs-gateway-dns server"
        );

        let client = KubeClient::new(&self.kubernetes)?;
        let (queue, receiver) = work_queue();

        let worker = ReconciliationWorker::new(client.clone(), self.index.clone());
        let worker_handle = tokio::spawn(worker.run(receiver, queue.clone(), shutdown.clone()));

        let watcher = ServiceImportWatcher::new(client, self.index.clone(), queue);
        let watcher_handle = tokio::spawn(watcher.run(shutdown.clone()));

        // Wait for initial sync before starting DNS server
        info!("Waiting for initial ServiceImport sync...");
        while !self.index.is_synced() {
            let stopping = tokio::select! {
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
                _ = tokio::time::sleep(SYNC_POLL_INTERVAL) => *shutdown.borrow(),
            };

            if stopping {
                info!("Shutdown requested before initial sync completed");
                let _ = watcher_handle.await;
                let _ = worker_handle.await;
                return Ok(());
            }
        }
        info!(identities = self.index.len(), "Initial sync complete");

        let catalog = build_catalog(&self.dns, self.index.clone())?;
        let mut server = ServerFuture::new(catalog);

        let udp_socket = UdpSocket::bind(self.dns.listen_addr).await?;
        info!(addr = %self.dns.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.dns.listen_addr).await?;
        info!(addr = %self.dns.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!(zones = ?self.dns.zones, "DNS server ready to serve queries");

        let metrics_handle = tokio::spawn(metrics_loop(self.index.clone(), shutdown.clone()));
        self.index.emit_metrics();

        tokio::select! {
            _ = shutdown.changed() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        let _ = metrics_handle.await;

        info!("Waiting for watcher and reconciliation worker to stop...");
        let _ = watcher_handle.await;
        let _ = worker_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}
