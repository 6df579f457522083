//! Telemetry setup for mcs-gateway-dns.
//!
//! Supports:
//! - Tracing with configurable log levels and output format
//! - Prometheus metrics endpoint (with `prometheus` feature)
//! - OpenTelemetry tracing export (with `otel` feature)

#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
#[cfg(any(feature = "prometheus", feature = "otel"))]
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};

#[cfg(feature = "otel")]
use std::sync::OnceLock;
#[cfg(feature = "otel")]
static TRACER_PROVIDER: OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> = OnceLock::new();

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Initialize telemetry (tracing, metrics, optional OTLP).
pub fn init(config: &TelemetryConfig) -> Result<(), BoxError> {
    init_tracing(config)?;

    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        start_prometheus_exporter(addr)?;
    }

    Ok(())
}

/// Log filter: `RUST_LOG` when set and valid, the configured level otherwise.
fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn init_tracing(config: &TelemetryConfig) -> Result<(), BoxError> {
    let (full, compact) = match config.log_format {
        LogFormat::Full => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact())),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(full)
        .with(compact);

    #[cfg(feature = "otel")]
    if let Some(ref otel_config) = config.opentelemetry {
        use opentelemetry::trace::TracerProvider;
        use opentelemetry::KeyValue;
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk as otlp_sdk;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&otel_config.endpoint)
            .build()?;

        let resource = otlp_sdk::Resource::builder()
            .with_attributes([
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    otel_config.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    env!("CARGO_PKG_VERSION"),
                ),
            ])
            .build();

        let provider = otlp_sdk::trace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();

        let tracer = provider.tracer("mcs-gateway-dns");
        let _ = TRACER_PROVIDER.set(provider);

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;

        info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
        return Ok(());
    }

    registry.try_init()?;
    Ok(())
}

/// Start Prometheus metrics HTTP exporter.
#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(addr: SocketAddr) -> Result<(), BoxError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!(%addr, "Prometheus metrics exporter started");

    Ok(())
}

/// Shutdown telemetry (flush OTLP spans).
pub fn shutdown() {
    #[cfg(feature = "otel")]
    {
        if let Some(provider) = TRACER_PROVIDER.get() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Error shutting down tracer provider: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_configured_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = TelemetryConfig {
            log_level: "mcs_gateway_dns=debug,warn".to_string(),
            ..Default::default()
        };

        let filter = env_filter(&config).to_string();
        assert!(filter.contains("mcs_gateway_dns=debug"), "{filter}");
        assert!(filter.contains("warn"), "{filter}");
    }
}
