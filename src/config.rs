//! Configuration types for mcs-gateway-dns.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::DnsError;
use crate::zone::{Fallthrough, Zones};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Kubernetes API access.
    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Zones this server is authoritative for (e.g., "svc.clusterset.local.").
    #[serde(default = "default_zones")]
    pub zones: Vec<String>,

    /// Multi-cluster gateway substituted into every answer.
    pub gateway: GatewayConfig,

    /// TTL for synthesized records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Names for which a miss is passed to the next handler instead of
    /// answering NXDOMAIN. Absent disables fallthrough; an empty list enables
    /// it for every name.
    #[serde(default)]
    pub fallthrough: Option<Vec<String>>,
}

impl DnsConfig {
    /// Check zones and fallthrough names.
    pub fn validate(&self) -> Result<(), DnsError> {
        self.zones()?;
        self.fallthrough()?;
        Ok(())
    }

    /// Parsed zone list.
    pub fn zones(&self) -> Result<Zones, DnsError> {
        Zones::new(&self.zones)
    }

    /// Parsed fallthrough policy.
    pub fn fallthrough(&self) -> Result<Fallthrough, DnsError> {
        Fallthrough::from_config(self.fallthrough.as_deref())
    }
}

/// Gateway address pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address returned for A queries.
    pub ipv4: Ipv4Addr,

    /// Address returned for AAAA queries. Defaults to the IPv4-mapped form of
    /// `ipv4`.
    #[serde(default)]
    pub ipv6: Option<Ipv6Addr>,
}

impl GatewayConfig {
    /// Address returned for AAAA queries.
    pub fn ipv6(&self) -> Ipv6Addr {
        self.ipv6.unwrap_or_else(|| self.ipv4.to_ipv6_mapped())
    }
}

/// Kubernetes API access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// API server base URL.
    #[serde(default = "default_api_server")]
    pub api_server: String,

    /// Bearer token file (re-read on every request).
    #[serde(default = "default_token_file")]
    pub token_file: Option<PathBuf>,

    /// PEM bundle used to verify the API server certificate.
    #[serde(default = "default_ca_file")]
    pub ca_file: Option<PathBuf>,

    /// Restrict the watch to one namespace. Watches all namespaces if unset.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Skip API server certificate verification.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Kubeconfig file. When set, its context replaces `api_server`,
    /// `token_file` and `ca_file`.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of its `current-context`.
    #[serde(default)]
    pub context: Option<String>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            api_server: default_api_server(),
            token_file: default_token_file(),
            ca_file: default_ca_file(),
            namespace: None,
            insecure_skip_tls_verify: false,
            kubeconfig: None,
            context: None,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "mcs_gateway_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log line format.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Default multi-field format.
    #[default]
    Full,
    /// Single-line compact format.
    Compact,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_zones() -> Vec<String> {
    vec!["svc.clusterset.local.".to_string()]
}

fn default_ttl() -> u32 {
    5
}

fn default_api_server() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_token_file() -> Option<PathBuf> {
    Some(PathBuf::from(
        "/var/run/secrets/kubernetes.io/serviceaccount/token",
    ))
}

fn default_ca_file() -> Option<PathBuf> {
    Some(PathBuf::from(
        "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt",
    ))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "mcs-gateway-dns".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [dns.gateway]
            ipv4 = "10.0.0.10"
            "#,
        );

        assert_eq!(config.dns.listen_addr, "0.0.0.0:53".parse().unwrap());
        assert_eq!(config.dns.zones, vec!["svc.clusterset.local.".to_string()]);
        assert_eq!(config.dns.ttl, 5);
        assert_eq!(config.dns.fallthrough, None);
        assert_eq!(config.kubernetes.api_server, "https://kubernetes.default.svc");
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Full);
        assert_eq!(config.kubernetes.kubeconfig, None);
        assert_eq!(config.kubernetes.context, None);
        config.dns.validate().unwrap();
    }

    #[test]
    fn test_kubeconfig_and_context() {
        let config = parse(
            r#"
            [dns.gateway]
            ipv4 = "10.0.0.10"

            [kubernetes]
            kubeconfig = "/home/ops/.kube/config"
            context = "cluster-east"
            "#,
        );

        assert_eq!(
            config.kubernetes.kubeconfig,
            Some(PathBuf::from("/home/ops/.kube/config"))
        );
        assert_eq!(config.kubernetes.context.as_deref(), Some("cluster-east"));
        assert_eq!(config.kubernetes.api_server, "https://kubernetes.default.svc");
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [dns]
            listen_addr = "127.0.0.1:5353"
            zones = ["svc.clusterset.local.", "clusterset.local."]
            ttl = 30
            fallthrough = ["test.svc.clusterset.local."]

            [dns.gateway]
            ipv4 = "1.1.1.1"
            ipv6 = "fd00::1"

            [kubernetes]
            api_server = "https://127.0.0.1:6443"
            namespace = "default"
            insecure_skip_tls_verify = true

            [telemetry]
            log_format = "compact"
            "#,
        );

        assert_eq!(config.dns.zones.len(), 2);
        assert_eq!(config.dns.ttl, 30);
        assert_eq!(config.dns.gateway.ipv6(), "fd00::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(config.kubernetes.namespace.as_deref(), Some("default"));
        assert!(config.kubernetes.insecure_skip_tls_verify);
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert!(config
            .dns
            .fallthrough()
            .unwrap()
            .through(&crate::zone::parse_name("a.test.svc.clusterset.local.").unwrap()));
    }

    #[test]
    fn test_empty_fallthrough_list_covers_everything() {
        let config = parse(
            r#"
            [dns]
            fallthrough = []

            [dns.gateway]
            ipv4 = "1.2.3.4"
            "#,
        );

        assert_eq!(config.dns.fallthrough().unwrap(), Fallthrough::Zones(vec![]));
    }

    #[test]
    fn test_gateway_ipv6_defaults_to_mapped_ipv4() {
        let gateway = GatewayConfig {
            ipv4: Ipv4Addr::new(1, 2, 3, 4),
            ipv6: None,
        };
        assert_eq!(
            gateway.ipv6(),
            "::ffff:1.2.3.4".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_empty_zones() {
        let config = parse(
            r#"
            [dns]
            zones = []

            [dns.gateway]
            ipv4 = "1.2.3.4"
            "#,
        );

        assert!(matches!(config.dns.validate(), Err(DnsError::Config(_))));
    }
}
