//! Adapter for functions produced by an OpenAPI client generator.
//!
//! Generated clients take their base URL and default headers from a
//! configuration value. Instead of sharing one mutable configuration between
//! calls, every invocation gets its own [`ClientConfig`] built for the target
//! service, so concurrent calls against different services cannot see each
//! other's settings.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

use crate::dispatcher::{decode_body, AttemptFailure, Dispatcher};
use crate::error::DispatchError;
use crate::request::{ApiResponse, JSON_CONTENT_TYPE};
use crate::service::LogicalService;

/// Per-call configuration handed to a generated client function
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl ClientConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request builder with this call's base URL, headers and timeout applied.
    ///
    /// No Content-Type is set: the body method (`json`, `multipart`, ...)
    /// supplies it. Use [`ClientConfig::json_request`] for hand-built JSON bodies.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .headers(self.headers.clone())
            .timeout(self.timeout)
    }

    /// Like `request`, with `Content-Type: application/json` preset
    pub fn json_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.request(method, path)
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
    }
}

/// Error surface of a generated client function
#[derive(Debug)]
pub enum GeneratedError {
    /// The server answered with a non-success status
    Response { status: u16, body: Value },
    Transport(reqwest::Error),
    Other(String),
}

impl GeneratedError {
    pub fn response(status: u16, body: Value) -> Self {
        GeneratedError::Response { status, body }
    }

    /// Read a non-success response into a `Response` error
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(bytes) => GeneratedError::Response {
                status,
                body: decode_body(&bytes),
            },
            Err(e) => GeneratedError::Transport(e),
        }
    }
}

impl fmt::Display for GeneratedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratedError::Response { status, .. } => write!(f, "HTTP {}", status),
            GeneratedError::Transport(e) => write!(f, "{}", e),
            GeneratedError::Other(message) => write!(f, "{}", message),
        }
    }
}

impl From<reqwest::Error> for GeneratedError {
    fn from(err: reqwest::Error) -> Self {
        GeneratedError::Transport(err)
    }
}

impl From<GeneratedError> for AttemptFailure {
    fn from(err: GeneratedError) -> Self {
        match err {
            GeneratedError::Response { status, body } => AttemptFailure::Status { status, body },
            GeneratedError::Transport(e) => AttemptFailure::from(e),
            GeneratedError::Other(message) => AttemptFailure::Transport {
                message,
                timeout: false,
            },
        }
    }
}

/// Drives generated client functions through the dispatcher's credentials
/// and error normalization.
#[derive(Debug, Clone)]
pub struct LegacyExecutor {
    dispatcher: Dispatcher,
}

impl LegacyExecutor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Configuration a generated call against `service` should run with
    pub async fn client_config(
        &self,
        service: &LogicalService,
        skip_auth: bool,
    ) -> Result<ClientConfig, DispatchError> {
        let headers = self.dispatcher.base_headers(service, skip_auth).await?;

        Ok(ClientConfig {
            base_url: self.dispatcher.resolve_base_url(service).to_string(),
            headers,
            timeout: self.dispatcher.timeout(),
            client: self.dispatcher.http_client().clone(),
        })
    }

    /// Invoke a generated function once.
    ///
    /// `endpoint` is the path the generated function requests, relative to
    /// the service base URL. It is joined onto that URL for the passthrough
    /// check on profile-image uploads, so a bare operation name there would
    /// never match.
    pub async fn invoke<T, F, Fut>(
        &self,
        service: impl Into<LogicalService>,
        endpoint: &str,
        call: F,
    ) -> Result<ApiResponse<T>, DispatchError>
    where
        F: FnOnce(ClientConfig) -> Fut,
        Fut: Future<Output = Result<T, GeneratedError>>,
    {
        let service = service.into();
        let span = tracing::debug_span!("legacy_call", service = %service, endpoint = endpoint);

        async move {
            let config = self.client_config(&service, false).await?;
            let target = config.url(endpoint);
            match call(config).await {
                Ok(data) => Ok(ApiResponse { data }),
                Err(err) => {
                    tracing::warn!("Generated call to {} failed: {}", target, err);
                    Err(self.dispatcher.finish_failure(&target, err.into()))
                }
            }
        }
        .instrument(span)
        .await
    }
}
