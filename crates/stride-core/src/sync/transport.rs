//! Sync transport seam and its HTTP implementation.

use std::future::Future;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use super::protocol::{SyncRequest, SyncResponse};
use crate::config::{normalize_endpoint, SyncSettings};

const SYNC_PATH: &str = "/v1/sync";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Sync server is not configured")]
    NotConfigured,
    #[error("Invalid sync transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sync API error: {0}")]
    Api(String),
    #[error("Invalid sync response payload: {0}")]
    InvalidPayload(String),
}

/// Exchanges one sync request for one response.
///
/// Any error leaves the local queue untouched; the engine retries on the
/// next trigger.
pub trait SyncTransport: Send + Sync + 'static {
    fn exchange(
        &self,
        request: &SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, TransportError>> + Send;

    /// Whether a round can be attempted at all
    fn is_available(&self) -> bool {
        true
    }
}

impl<T: SyncTransport> SyncTransport for Arc<T> {
    fn exchange(
        &self,
        request: &SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, TransportError>> + Send {
        (**self).exchange(request)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// `None` is a local-only client
impl<T: SyncTransport> SyncTransport for Option<T> {
    async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        match self {
            Some(transport) => transport.exchange(request).await,
            None => Err(TransportError::NotConfigured),
        }
    }

    fn is_available(&self) -> bool {
        self.as_ref().is_some_and(SyncTransport::is_available)
    }
}

/// JSON over HTTPS against `POST {endpoint}/v1/sync`
#[derive(Clone)]
pub struct HttpSyncTransport {
    url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncTransport")
            .field("url", &self.url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpSyncTransport {
    pub fn new(settings: &SyncSettings) -> Result<Self, TransportError> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .ok_or(TransportError::NotConfigured)?;
        let endpoint = normalize_endpoint(endpoint)
            .map_err(|error| TransportError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            url: format!("{endpoint}{SYNC_PATH}"),
            api_token: settings.api_token.clone(),
            client: reqwest::Client::builder()
                .timeout(settings.request_timeout)
                .build()?,
        })
    }

    /// Transport for configured settings, `None` when running local-only
    pub fn from_settings(settings: &SyncSettings) -> Result<Option<Self>, TransportError> {
        if settings.is_configured() {
            Self::new(settings).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SyncTransport for HttpSyncTransport {
    async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|error| TransportError::InvalidPayload(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    let message = describe_api_error(status, body);
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        format!("{message}; lower STRIDE_SYNC_BATCH_SIZE to send smaller batches")
    } else {
        message
    }
}

fn describe_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
