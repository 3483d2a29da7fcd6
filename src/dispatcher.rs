use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::auth::resolve_auth_header;
use crate::config::AppConfig;
use crate::error::{DispatchError, ErrorStatus, NormalizedError, RawFailure};
use crate::request::{ApiResponse, FormContent, FormPart, RequestBody, RequestDescriptor};
use crate::retry::{Classify, FailureClass, RetryError, RetryPolicy};
use crate::service::{LogicalService, ServiceRegistry};
use crate::store::{self, CredentialStore, StoreError};

pub type StatusHandler = Arc<dyn Fn(&NormalizedError) + Send + Sync>;

/// App-wide reactions keyed by HTTP status (e.g. 401 → force logout).
/// Runs in addition to the caller's own error handling.
#[derive(Clone, Default)]
pub struct StatusHandlers {
    handlers: HashMap<u16, Vec<StatusHandler>>,
}

impl StatusHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, status: u16, handler: F)
    where
        F: Fn(&NormalizedError) + Send + Sync + 'static,
    {
        self.handlers.entry(status).or_default().push(Arc::new(handler));
    }

    pub fn notify(&self, error: &NormalizedError) {
        let Some(code) = error.status_code() else {
            return;
        };
        if let Some(handlers) = self.handlers.get(&code) {
            tracing::debug!("Invoking {} handler(s) for status {}", handlers.len(), code);
            for handler in handlers {
                handler(error);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for StatusHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.handlers.keys().collect();
        codes.sort();
        f.debug_struct("StatusHandlers").field("codes", &codes).finish()
    }
}

/// Why a single attempt failed
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    Transport { message: String, timeout: bool },
    Status { status: u16, body: Value },
    Invalid(String),
}

impl Classify for AttemptFailure {
    fn failure_class(&self) -> FailureClass {
        match self {
            AttemptFailure::Transport { .. } => FailureClass::Retryable,
            AttemptFailure::Status { status, .. } => FailureClass::for_status(*status),
            AttemptFailure::Invalid(_) => FailureClass::Permanent,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport { message, timeout: true } => write!(f, "timed out: {}", message),
            AttemptFailure::Transport { message, .. } => write!(f, "transport error: {}", message),
            AttemptFailure::Status { status, .. } => write!(f, "HTTP {}", status),
            AttemptFailure::Invalid(message) => write!(f, "invalid request: {}", message),
        }
    }
}

impl From<reqwest::Error> for AttemptFailure {
    fn from(err: reqwest::Error) -> Self {
        AttemptFailure::Transport {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl AttemptFailure {
    /// The failure as the transport saw it, before any message extraction
    fn into_raw(self) -> RawFailure {
        match self {
            AttemptFailure::Status { status, body } => RawFailure {
                status: ErrorStatus::Code(status),
                data: body,
            },
            AttemptFailure::Transport { message, timeout } => {
                let label = if timeout { "TIMEOUT_ERROR" } else { "FETCH_ERROR" };
                RawFailure {
                    status: ErrorStatus::Label(label.to_string()),
                    data: Value::String(message),
                }
            }
            AttemptFailure::Invalid(message) => RawFailure {
                status: ErrorStatus::Label("CLIENT_ERROR".to_string()),
                data: Value::String(message),
            },
        }
    }

    fn normalize(self) -> NormalizedError {
        match self {
            AttemptFailure::Status { status, body } => {
                NormalizedError::from_response(ErrorStatus::Code(status), &body)
            }
            other => NormalizedError::internal(other),
        }
    }
}

/// Authenticated multi-service request dispatcher.
///
/// Owns its HTTP client, the service map and the credential store handle;
/// nothing here is mutated after construction, so one instance can serve
/// any number of concurrent calls.
#[derive(Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    services: ServiceRegistry,
    store: Option<Arc<dyn CredentialStore>>,
    retry: RetryPolicy,
    timeout: Duration,
    trusted_origin: String,
    passthrough_segment: String,
    status_handlers: StatusHandlers,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("services", &self.services)
            .field("has_store", &self.store.is_some())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("status_handlers", &self.status_handlers)
            .finish()
    }
}

pub struct DispatcherBuilder {
    config: AppConfig,
    store: Option<Arc<dyn CredentialStore>>,
    retry: Option<RetryPolicy>,
    status_handlers: StatusHandlers,
    client: Option<reqwest::Client>,
}

impl DispatcherBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: None,
            retry: None,
            status_handlers: StatusHandlers::new(),
            client: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn on_status<F>(mut self, status: u16, handler: F) -> Self
    where
        F: Fn(&NormalizedError) + Send + Sync + 'static,
    {
        self.status_handlers.on(status, handler);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Without an explicit store the process-wide one is used, if installed.
    /// Having neither is only an error once an authenticated call is made.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let http = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(self.config.http.user_agent.clone())
                .build()
                .map_err(DispatchError::ClientBuild)?,
        };

        let store = self.store.or_else(|| store::installed().ok());
        if store.is_none() {
            tracing::warn!("Dispatcher built without a credential store; only skip_auth requests will succeed");
        }

        Ok(Dispatcher {
            http,
            services: ServiceRegistry::new(&self.config.services),
            store,
            retry: self
                .retry
                .unwrap_or_else(|| RetryPolicy::from_config(&self.config.http)),
            timeout: self.config.http.timeout(),
            trusted_origin: self.config.security.trusted_origin.clone(),
            passthrough_segment: self.config.security.passthrough_segment.clone(),
            status_handlers: self.status_handlers,
        })
    }
}

impl Dispatcher {
    pub fn builder(config: AppConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn resolve_base_url(&self, service: &LogicalService) -> &str {
        self.services.resolve_base_url(service)
    }

    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<ApiResponse<T>, DispatchError> {
        self.execute_with_cancel(descriptor, &CancellationToken::new()).await
    }

    /// Like `execute`, but gives up as soon as `cancel` fires, including in
    /// the middle of an attempt or a backoff sleep.
    pub async fn execute_with_cancel<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse<T>, DispatchError> {
        let span = tracing::debug_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            service = %descriptor.service,
            method = %descriptor.method,
            path = %descriptor.path,
        );

        self.dispatch(descriptor, cancel).instrument(span).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse<T>, DispatchError> {
        let url = match self.build_url(&descriptor) {
            Ok(url) => url,
            Err(err) => return Err(self.fail(err)),
        };
        let headers = self.prepare_headers(&descriptor).await?;

        let outcome = self
            .retry
            .run(cancel, |attempt| self.send_once(&descriptor, &url, &headers, attempt))
            .await;

        match outcome {
            Ok((status, body)) => match serde_json::from_value::<T>(body) {
                Ok(data) => Ok(ApiResponse { data }),
                Err(e) => Err(self.fail(NormalizedError::with_code(
                    status,
                    format!("failed to decode response: {}", e),
                ))),
            },
            Err(RetryError::Cancelled) => {
                tracing::debug!("Request cancelled");
                Err(DispatchError::Cancelled)
            }
            Err(RetryError::Failed { error, attempts }) => {
                tracing::warn!("Request to {} failed after {} attempt(s): {}", url, attempts, error);
                Err(self.finish_failure(url.as_str(), error))
            }
        }
    }

    fn build_url(&self, descriptor: &RequestDescriptor) -> Result<Url, NormalizedError> {
        let raw = self.services.build_url(&descriptor.service, &descriptor.path);
        let mut url = Url::parse(&raw)
            .map_err(|e| NormalizedError::internal(format!("invalid URL '{}': {}", raw, e)))?;

        if !descriptor.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &descriptor.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Credentials, content type, origin pinning and caller headers
    pub(crate) async fn prepare_headers(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<HeaderMap, DispatchError> {
        let mut headers = self
            .base_headers(&descriptor.service, descriptor.skip_auth)
            .await?;

        if let Some(content_type) = descriptor.effective_content_type() {
            headers.insert(CONTENT_TYPE, header_value(content_type).map_err(|e| self.fail(e))?);
        }

        for (name, value) in &descriptor.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                self.fail(NormalizedError::internal(format!("invalid header name '{}': {}", name, e)))
            })?;
            if name == CONTENT_TYPE && descriptor.is_multipart() {
                tracing::debug!("Ignoring caller Content-Type on multipart body");
                continue;
            }
            headers.insert(name, header_value(value).map_err(|e| self.fail(e))?);
        }

        Ok(headers)
    }

    /// Headers every call to `service` carries, whatever the body
    pub(crate) async fn base_headers(
        &self,
        service: &LogicalService,
        skip_auth: bool,
    ) -> Result<HeaderMap, DispatchError> {
        let mut headers = HeaderMap::new();

        if !skip_auth {
            let auth = resolve_auth_header(self.store.as_deref(), service)
                .await
                .map_err(|e| match e {
                    StoreError::NotInitialized => DispatchError::StoreNotInitialized,
                    other => self.fail(NormalizedError::internal(format!(
                        "credential store read failed: {}",
                        other
                    ))),
                })?;
            if let Some(auth) = auth {
                let mut value = header_value(&auth.value()).map_err(|e| self.fail(e))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        if service.requires_origin_headers() && !self.trusted_origin.is_empty() {
            let origin = header_value(&self.trusted_origin).map_err(|e| self.fail(e))?;
            headers.insert(REFERER, origin.clone());
            headers.insert(ORIGIN, origin);
        }

        Ok(headers)
    }

    async fn send_once(
        &self,
        descriptor: &RequestDescriptor,
        url: &Url,
        headers: &HeaderMap,
        attempt: u32,
    ) -> Result<(u16, Value), AttemptFailure> {
        tracing::debug!("Attempt {} {} {}", attempt, descriptor.method, url);

        let mut request = self
            .http
            .request(descriptor.method.clone(), url.clone())
            .headers(headers.clone())
            .timeout(self.timeout);

        request = match &descriptor.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| AttemptFailure::Invalid(e.to_string()))?;
                request.body(bytes)
            }
            RequestBody::Text(text) => request.body(text.clone()),
            RequestBody::Bytes(bytes) => request.body(bytes.clone()),
            RequestBody::Form(parts) => request.multipart(build_form(parts)?),
        };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = decode_body(&bytes);

        if status.is_success() {
            Ok((status.as_u16(), body))
        } else {
            Err(AttemptFailure::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    pub(crate) fn is_passthrough(&self, target: &str) -> bool {
        !self.passthrough_segment.is_empty() && target.contains(&self.passthrough_segment)
    }

    /// Normalize (or pass through) a terminal failure and run status handlers
    pub(crate) fn finish_failure(&self, target: &str, failure: AttemptFailure) -> DispatchError {
        if self.is_passthrough(target) {
            let raw = failure.into_raw();
            self.status_handlers.notify(&NormalizedError::new(raw.status.clone(), raw.data.clone()));
            return DispatchError::Passthrough(raw);
        }

        self.fail(failure.normalize())
    }

    pub(crate) fn fail(&self, error: NormalizedError) -> DispatchError {
        tracing::warn!(status = %error.status, "Request failed: {}", error);
        self.status_handlers.notify(&error);
        DispatchError::Normalized(error)
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn header_value(value: &str) -> Result<HeaderValue, NormalizedError> {
    HeaderValue::from_str(value)
        .map_err(|e| NormalizedError::internal(format!("invalid header value: {}", e)))
}

fn build_form(parts: &[FormPart]) -> Result<multipart::Form, AttemptFailure> {
    let mut form = multipart::Form::new();
    for part in parts {
        form = match &part.content {
            FormContent::Text(value) => form.text(part.name.clone(), value.clone()),
            FormContent::File { file_name, mime, bytes } => {
                let mut file = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|e| AttemptFailure::Invalid(e.to_string()))?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// Empty → null, JSON → value, anything else → text
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
