//! Minimal Kubernetes API client for `multicluster.x-k8s.io/v1alpha1`
//! ServiceImports.
//!
//! Only the three calls the watcher and the reconciler need are implemented:
//! get one object, list the collection, and watch it as a stream of
//! newline-delimited JSON events.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Deserialize;
use std::io;

use crate::config::KubernetesConfig;
use crate::error::{ClientError, LookupError};
use crate::identity::ServiceKey;
use crate::kubeconfig::{Credentials, Token};
use crate::reconcile::ServiceImportLookup;
use crate::watcher::ServiceImportSource;

/// API group and version of ServiceImport.
pub const API_PATH: &str = "/apis/multicluster.x-k8s.io/v1alpha1";

/// Server-side timeout requested for each watch call.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Object metadata fields used here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    #[serde(default)]
    pub name: String,
    /// Object namespace.
    #[serde(default)]
    pub namespace: String,
    /// Resource version at which the object was read.
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// A ServiceImport. Only its metadata is decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceImport {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl ServiceImport {
    /// Create a ServiceImport carrying only a name and namespace.
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                resource_version: None,
            },
        }
    }

    /// Name and namespace of this object.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.metadata.name, &self.metadata.namespace)
    }
}

/// List metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// Resource version to start a watch from.
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// Response of a list call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceImportList {
    /// List metadata.
    #[serde(default)]
    pub metadata: ListMeta,
    /// Listed objects.
    #[serde(default)]
    pub items: Vec<ServiceImport>,
}

/// `metav1.Status` as sent in watch ERROR events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Status {
    /// HTTP-like status code (410 when the resource version expired).
    #[serde(default)]
    pub code: u16,
    /// Machine-readable reason.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// One event from a watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent {
    /// Object created.
    Added(ServiceImport),
    /// Object changed.
    Modified(ServiceImport),
    /// Object deleted.
    Deleted(ServiceImport),
    /// Progress marker; only `metadata.resourceVersion` is set.
    Bookmark(ServiceImport),
    /// Watch-level error.
    Error(Status),
}

/// Take the next complete line out of `buf`, without its terminator.
fn next_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}

/// Kubernetes API client for ServiceImports.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    api_server: String,
    token: Option<Token>,
    namespace: Option<String>,
}

impl KubeClient {
    /// Build a client from configuration.
    ///
    /// See [`Credentials::from_config`] for where the server, CA and
    /// authentication come from.
    pub fn new(config: &KubernetesConfig) -> Result<Self, ClientError> {
        Self::with_credentials(Credentials::from_config(config)?, config.namespace.clone())
    }

    /// Build a client from resolved credentials.
    pub fn with_credentials(credentials: Credentials, namespace: Option<String>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(credentials.insecure_skip_tls_verify);

        if let Some(ref pem) = credentials.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        if let Some(ref cert) = credentials.client_certificate {
            builder = builder.identity(reqwest::Identity::from_pem(&cert.identity_pem())?);
        }

        Ok(Self {
            http: builder.build()?,
            api_server: credentials.server.trim_end_matches('/').to_string(),
            token: credentials.token,
            namespace,
        })
    }

    /// URL of the watched collection.
    pub fn collection_url(&self) -> String {
        match self.namespace {
            Some(ref ns) => format!("{}{}/namespaces/{}/serviceimports", self.api_server, API_PATH, ns),
            None => format!("{}{}/serviceimports", self.api_server, API_PATH),
        }
    }

    /// URL of a single ServiceImport.
    pub fn object_url(&self, key: &ServiceKey) -> String {
        format!(
            "{}{}/namespaces/{}/serviceimports/{}",
            self.api_server, API_PATH, key.namespace, key.name
        )
    }

    /// Current bearer token. A token file that does not exist means no token.
    async fn token(&self) -> Result<Option<String>, ClientError> {
        match self.token {
            None => Ok(None),
            Some(Token::Static(ref token)) => Ok(Some(token.clone())),
            Some(Token::File(ref path)) => match tokio::fs::read_to_string(path).await {
                Ok(token) => Ok(Some(token.trim().to_string())),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response, ClientError> {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = self.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.text().await {
            Ok(body) if !body.is_empty() => body,
            _ => status.canonical_reason().unwrap_or_default().to_string(),
        };
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Fetch one ServiceImport. A missing object is `ClientError::Status`
    /// with status 404.
    pub async fn get(&self, key: &ServiceKey) -> Result<ServiceImport, ClientError> {
        let body = self.send(&self.object_url(key), &[]).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// List all ServiceImports in scope.
    pub async fn list(&self) -> Result<ServiceImportList, ClientError> {
        let body = self.send(&self.collection_url(), &[]).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Watch the collection starting after `resource_version`.
    ///
    /// The stream ends when the server closes the watch.
    pub async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClientError>>, ClientError> {
        let query = [
            ("watch", "true".to_string()),
            ("allowWatchBookmarks", "true".to_string()),
            ("resourceVersion", resource_version.to_string()),
            ("timeoutSeconds", WATCH_TIMEOUT_SECS.to_string()),
        ];
        let response = self.send(&self.collection_url(), &query).await?;
        let chunks = response.bytes_stream().boxed();

        let events = stream::unfold((chunks, Vec::new()), |(mut chunks, mut buf)| async move {
            loop {
                if let Some(line) = next_line(&mut buf) {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let event = serde_json::from_slice::<WatchEvent>(&line).map_err(ClientError::from);
                    return Some((event, (chunks, buf)));
                }
                match chunks.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(ClientError::from(e)), (chunks, buf))),
                    None => return None,
                }
            }
        });

        Ok(events.boxed())
    }
}

#[async_trait]
impl ServiceImportLookup for KubeClient {
    async fn get(&self, key: &ServiceKey) -> Result<ServiceImport, LookupError> {
        KubeClient::get(self, key).await.map_err(LookupError::from)
    }
}

#[async_trait]
impl ServiceImportSource for KubeClient {
    async fn list(&self) -> Result<ServiceImportList, ClientError> {
        KubeClient::list(self).await
    }

    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent, ClientError>>, ClientError> {
        KubeClient::watch(self, resource_version).await
    }
}
