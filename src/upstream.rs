use crate::error::RelayError;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};

pub const DEFAULT_API_VERSION: &str = "2024-10-01-preview";
pub const REALTIME_PATH: &str = "/openai/realtime";

pub const API_KEY_HEADER: &str = "api-key";
pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

pub(crate) type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Source of short-lived bearer tokens for the upstream service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<SecretString>;
}

pub enum Credential {
    ApiKey(SecretString),
    Bearer(Arc<dyn TokenProvider>),
}

impl Credential {
    /// The header carrying this credential, fetching a fresh token if needed.
    pub async fn header(&self) -> Result<(&'static str, String)> {
        match self {
            Credential::ApiKey(key) => Ok((API_KEY_HEADER, key.expose_secret().to_string())),
            Credential::Bearer(provider) => {
                let token = provider.token().await?;
                Ok((
                    AUTHORIZATION_HEADER,
                    format!("Bearer {}", token.expose_secret()),
                ))
            }
        }
    }
}

pub struct UpstreamConfig {
    endpoint: String,
    deployment: String,
    api_version: String,
    credential: Credential,
}

pub struct UpstreamConfigBuilder {
    config: UpstreamConfig,
}

impl UpstreamConfigBuilder {
    pub fn new(endpoint: &str, deployment: &str, credential: Credential) -> Self {
        Self {
            config: UpstreamConfig {
                endpoint: endpoint.to_string(),
                deployment: deployment.to_string(),
                api_version: DEFAULT_API_VERSION.to_string(),
                credential,
            },
        }
    }

    pub fn with_api_version(mut self, api_version: &str) -> Self {
        self.config.api_version = api_version.to_string();
        self
    }

    pub fn build(self) -> UpstreamConfig {
        self.config
    }
}

impl UpstreamConfig {
    pub fn builder(endpoint: &str, deployment: &str, credential: Credential) -> UpstreamConfigBuilder {
        UpstreamConfigBuilder::new(endpoint, deployment, credential)
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The realtime URL on the endpoint's host, whatever path the endpoint carried.
    pub fn url(&self) -> Result<String, RelayError> {
        let origin = websocket_origin(&self.endpoint)?;
        Ok(format!(
            "{}{}?api-version={}&deployment={}",
            origin, REALTIME_PATH, self.api_version, self.deployment
        ))
    }
}

fn websocket_origin(endpoint: &str) -> Result<String, RelayError> {
    let invalid = || RelayError::InvalidEndpoint(endpoint.to_string());
    let (scheme, rest) = endpoint.trim().split_once("://").ok_or_else(invalid)?;
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(invalid()),
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid());
    }
    Ok(format!("{}://{}", scheme, host))
}

pub(crate) fn build_request(
    url: &str,
    authorization: (&'static str, String),
    request_id: Option<&str>,
) -> tungstenite::Result<Request> {
    let mut request = url.into_client_request()?;
    let (header, value) = authorization;
    request.headers_mut().insert(header, value.as_str().parse()?);
    if let Some(request_id) = request_id {
        request
            .headers_mut()
            .insert(CLIENT_REQUEST_ID_HEADER, request_id.parse()?);
    }
    Ok(request)
}

/// Opens the upstream socket. Authentication problems surface here, before any relaying.
pub(crate) async fn connect(
    config: &UpstreamConfig,
    request_id: Option<&str>,
) -> Result<UpstreamSocket, RelayError> {
    let url = config.url()?;
    let authorization = config
        .credential()
        .header()
        .await
        .map_err(RelayError::Credential)?;
    let request = build_request(&url, authorization, request_id)?;

    tracing::info!(
        "connecting to upstream deployment '{}' (api-version {})",
        config.deployment(),
        config.api_version()
    );
    match tokio_tungstenite::connect_async(request).await {
        Ok((socket, response)) => {
            tracing::debug!("upstream handshake completed: {}", response.status());
            Ok(socket)
        }
        Err(tungstenite::Error::Http(response))
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            Err(RelayError::Unauthorized(response.status().as_u16()))
        }
        Err(e) => Err(RelayError::Handshake(e)),
    }
}
