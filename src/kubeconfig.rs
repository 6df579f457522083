//! API server credentials, either in-cluster or from a kubeconfig file.
//!
//! A kubeconfig is reduced to the one context in use: its cluster supplies
//! the server URL and CA, its user supplies a bearer token or a client
//! certificate. Relative file references resolve against the directory of
//! the kubeconfig itself.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::KubernetesConfig;
use crate::error::KubeconfigError;

/// Parsed kubeconfig file. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    current_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Clone, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

/// Bearer token source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Token given inline.
    Static(String),
    /// Token file, re-read on every request.
    File(PathBuf),
}

/// PEM-encoded client certificate and its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    /// Certificate chain.
    pub certificate: Vec<u8>,
    /// Private key.
    pub key: Vec<u8>,
}

impl ClientCertificate {
    /// Certificate followed by key, the layout `reqwest::Identity::from_pem`
    /// expects.
    pub fn identity_pem(&self) -> Vec<u8> {
        let mut pem = self.certificate.clone();
        if !pem.ends_with(b"\n") {
            pem.push(b'\n');
        }
        pem.extend_from_slice(&self.key);
        pem
    }
}

/// Everything needed to reach and authenticate against the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API server base URL.
    pub server: String,
    /// PEM bundle trusted for the API server certificate.
    pub ca_pem: Option<Vec<u8>>,
    /// Skip API server certificate verification.
    pub insecure_skip_tls_verify: bool,
    /// Bearer token, if any.
    pub token: Option<Token>,
    /// Client certificate, if any.
    pub client_certificate: Option<ClientCertificate>,
}

impl Credentials {
    /// Resolve credentials for `config`.
    ///
    /// With `kubeconfig` set, the file's context (or `context`, if given)
    /// decides everything but the TLS verification override. Otherwise the
    /// in-cluster service account settings are used, skipping a CA bundle
    /// that does not exist.
    pub fn from_config(config: &KubernetesConfig) -> Result<Self, KubeconfigError> {
        let mut credentials = match config.kubeconfig {
            Some(ref path) => Kubeconfig::load(path)?.credentials(config.context.as_deref(), base_dir(path))?,
            None => Self {
                server: config.api_server.clone(),
                ca_pem: read_optional(config.ca_file.as_deref())?,
                insecure_skip_tls_verify: false,
                token: config.token_file.clone().map(Token::File),
                client_certificate: None,
            },
        };
        credentials.insecure_skip_tls_verify |= config.insecure_skip_tls_verify;
        Ok(credentials)
    }
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

/// Read a CA bundle; a missing file means "use the built-in roots".
fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>, KubeconfigError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match std::fs::read(path) {
        Ok(pem) => Ok(Some(pem)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "CA bundle not found, using built-in roots");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Inline base64 data wins over a file reference.
fn data_or_file(
    field: &'static str,
    data: Option<&str>,
    file: Option<&Path>,
    base: &Path,
) -> Result<Option<Vec<u8>>, KubeconfigError> {
    if let Some(data) = data {
        let decoded = B64
            .decode(data.trim())
            .map_err(|source| KubeconfigError::Base64 { field, source })?;
        return Ok(Some(decoded));
    }
    match file {
        Some(file) => Ok(Some(std::fs::read(base.join(file))?)),
        None => Ok(None),
    }
}

impl Kubeconfig {
    /// Read and parse a kubeconfig file.
    pub fn load(path: &Path) -> Result<Self, KubeconfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse kubeconfig YAML.
    pub fn from_yaml(text: &str) -> Result<Self, KubeconfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Resolve the credentials of `context`, or of `current-context` when
    /// `None`. Relative paths are taken against `base`.
    pub fn credentials(&self, context: Option<&str>, base: &Path) -> Result<Credentials, KubeconfigError> {
        let context_name = context
            .or(self.current_context.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or(KubeconfigError::NoContext)?;
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| KubeconfigError::ContextNotFound(context_name.to_string()))?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| KubeconfigError::ClusterNotFound(context.cluster.clone()))?;

        let user = match context.user {
            Some(ref name) => self
                .users
                .iter()
                .find(|u| &u.name == name)
                .map(|u| u.user.clone())
                .ok_or_else(|| KubeconfigError::UserNotFound(name.clone()))?,
            None => User::default(),
        };

        let ca_pem = data_or_file(
            "certificate-authority-data",
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base,
        )?;

        let token = match (user.token, user.token_file) {
            (Some(token), _) => Some(Token::Static(token)),
            (None, Some(file)) => Some(Token::File(base.join(file))),
            (None, None) => None,
        };

        let certificate = data_or_file(
            "client-certificate-data",
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            base,
        )?;
        let key = data_or_file(
            "client-key-data",
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            base,
        )?;
        let client_certificate = match (certificate, key) {
            (Some(certificate), Some(key)) => Some(ClientCertificate { certificate, key }),
            (None, None) => None,
            _ => return Err(KubeconfigError::IncompleteClientCertificate),
        };

        debug!(context = context_name, server = %cluster.server, "using kubeconfig context");

        Ok(Credentials {
            server: cluster.server.clone(),
            ca_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            token,
            client_certificate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://dev.example.com:6443
    certificate-authority-data: LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCg==
- name: prod-cluster
  cluster:
    server: https://prod.example.com:6443
    certificate-authority: certs/prod-ca.pem
    insecure-skip-tls-verify: true
users:
- name: dev-user
  user:
    token: dev-token
- name: prod-user
  user:
    tokenFile: tokens/prod
- name: cert-user
  user:
    client-certificate-data: Y2VydAo=
    client-key-data: a2V5Cg==
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
    namespace: default
- name: prod
  context:
    cluster: prod-cluster
    user: prod-user
- name: cert
  context:
    cluster: dev-cluster
    user: cert-user
- name: anonymous
  context:
    cluster: dev-cluster
"#;

    fn kubeconfig() -> Kubeconfig {
        Kubeconfig::from_yaml(KUBECONFIG).unwrap()
    }

    #[test]
    fn test_current_context_with_inline_data() {
        let creds = kubeconfig().credentials(None, Path::new("/etc/kube")).unwrap();

        assert_eq!(creds.server, "https://dev.example.com:6443");
        assert_eq!(creds.ca_pem.as_deref(), Some(&b"-----BEGIN CERTIFICATE-----\n"[..]));
        assert_eq!(creds.token, Some(Token::Static("dev-token".to_string())));
        assert!(!creds.insecure_skip_tls_verify);
        assert!(creds.client_certificate.is_none());
    }

    #[test]
    fn test_explicit_context_overrides_current() {
        let config = kubeconfig();
        let base = std::env::temp_dir().join("mcs-gateway-dns-kubeconfig-prod");
        std::fs::create_dir_all(base.join("certs")).unwrap();
        std::fs::write(base.join("certs/prod-ca.pem"), b"prod ca").unwrap();

        let creds = config.credentials(Some("prod"), &base).unwrap();

        assert_eq!(creds.server, "https://prod.example.com:6443");
        assert_eq!(creds.ca_pem.as_deref(), Some(&b"prod ca"[..]));
        assert_eq!(creds.token, Some(Token::File(base.join("tokens/prod"))));
        assert!(creds.insecure_skip_tls_verify);
    }

    #[test]
    fn test_client_certificate_data() {
        let creds = kubeconfig().credentials(Some("cert"), Path::new(".")).unwrap();

        let cert = creds.client_certificate.unwrap();
        assert_eq!(cert.certificate, b"cert\n");
        assert_eq!(cert.key, b"key\n");
        assert_eq!(cert.identity_pem(), b"cert\nkey\n");
        assert!(creds.token.is_none());
    }

    #[test]
    fn test_context_without_user_is_anonymous() {
        let creds = kubeconfig().credentials(Some("anonymous"), Path::new(".")).unwrap();
        assert!(creds.token.is_none());
        assert!(creds.client_certificate.is_none());
    }

    #[test]
    fn test_unknown_context_rejected() {
        assert!(matches!(
            kubeconfig().credentials(Some("staging"), Path::new(".")),
            Err(KubeconfigError::ContextNotFound(ref name)) if name == "staging"
        ));
    }

    #[test]
    fn test_missing_current_context_rejected() {
        let config = Kubeconfig::from_yaml("clusters: []\n").unwrap();
        assert!(matches!(
            config.credentials(None, Path::new(".")),
            Err(KubeconfigError::NoContext)
        ));
    }

    #[test]
    fn test_dangling_references_rejected() {
        let config = Kubeconfig::from_yaml(
            r#"
contexts:
- name: a
  context: {cluster: missing}
- name: b
  context: {cluster: c, user: nobody}
clusters:
- name: c
  cluster: {server: "https://c"}
"#,
        )
        .unwrap();

        assert!(matches!(
            config.credentials(Some("a"), Path::new(".")),
            Err(KubeconfigError::ClusterNotFound(_))
        ));
        assert!(matches!(
            config.credentials(Some("b"), Path::new(".")),
            Err(KubeconfigError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_bad_base64_and_half_certificate_rejected() {
        let config = Kubeconfig::from_yaml(
            r#"
current-context: a
contexts:
- name: a
  context: {cluster: c, user: u}
- name: b
  context: {cluster: ok, user: u}
clusters:
- name: c
  cluster: {server: "https://c", certificate-authority-data: "%%%"}
- name: ok
  cluster: {server: "https://ok"}
users:
- name: u
  user: {client-certificate-data: Y2VydAo=}
"#,
        )
        .unwrap();

        assert!(matches!(
            config.credentials(None, Path::new(".")),
            Err(KubeconfigError::Base64 { field: "certificate-authority-data", .. })
        ));
        assert!(matches!(
            config.credentials(Some("b"), Path::new(".")),
            Err(KubeconfigError::IncompleteClientCertificate)
        ));
    }

    #[test]
    fn test_from_config_loads_kubeconfig_file() {
        let dir = std::env::temp_dir().join("mcs-gateway-dns-kubeconfig-load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config");
        std::fs::write(&path, KUBECONFIG).unwrap();

        let config = KubernetesConfig {
            kubeconfig: Some(path),
            context: Some("anonymous".to_string()),
            insecure_skip_tls_verify: true,
            ..KubernetesConfig::default()
        };
        let creds = Credentials::from_config(&config).unwrap();

        assert_eq!(creds.server, "https://dev.example.com:6443");
        assert!(creds.insecure_skip_tls_verify);
        assert!(creds.token.is_none());
    }

    #[test]
    fn test_from_config_in_cluster_skips_missing_ca() {
        let config = KubernetesConfig {
            api_server: "https://10.96.0.1:443".to_string(),
            ca_file: Some(PathBuf::from("/nonexistent/ca.crt")),
            ..KubernetesConfig::default()
        };
        let creds = Credentials::from_config(&config).unwrap();

        assert_eq!(creds.server, "https://10.96.0.1:443");
        assert!(creds.ca_pem.is_none());
        assert_eq!(
            creds.token,
            config.token_file.clone().map(Token::File)
        );
    }
}
