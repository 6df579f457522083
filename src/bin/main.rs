//! mcs-gateway-dns binary entry point.

use clap::Parser;
use mcs_gateway_dns::shutdown::{forward_shutdown, wait_for_signal};
use mcs_gateway_dns::{telemetry, Config, DnsServer};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

/// DNS server answering multi-cluster service names with a gateway address.
#[derive(Parser, Debug)]
#[command(name = "mcs-gateway-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "mcs-gateway-dns.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("MCS_GATEWAY_DNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.dns.listen_addr,
        zones = ?config.dns.zones,
        "Starting mcs-gateway-dns"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(wait_for_signal(), shutdown_tx));

    let server = DnsServer::new(config.dns, config.kubernetes);
    let result = server.run(shutdown_rx).await;

    telemetry::shutdown();

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("mcs-gateway-dns shutdown complete");
    Ok(())
}
