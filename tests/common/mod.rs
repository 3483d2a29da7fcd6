#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;

use mentor_api_client::config::AppConfig;
use mentor_api_client::retry::{RetryMode, RetryPolicy};
use mentor_api_client::{CredentialStore, Dispatcher, MemoryStore};

/// One request as the mock backend saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Every value received per (lowercased) header name, in wire order
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First value of a header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).first().copied()
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct Route {
    queued: VecDeque<(u16, Value)>,
    fixed: Option<(u16, Value)>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    routes: Mutex<HashMap<String, Route>>,
}

/// Programmable HTTP backend on a free local port.
///
/// Services are mounted under `/lms`, `/dm` and `/axd` so recorded paths show
/// which logical service a request was routed to.
pub struct MockBackend {
    pub port: u16,
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind {}", base_url))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { port, base_url, state })
    }

    /// Answer every request to `path` with this response
    pub fn on(&self, path: &str, status: u16, body: Value) {
        let mut routes = self.state.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().fixed = Some((status, body));
    }

    /// One-shot response, served before any fixed response
    pub fn enqueue(&self, path: &str, status: u16, body: Value) {
        let mut routes = self.state.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().queued.push_back((status, body));
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        let mut routes = self.state.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().delay = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    pub fn last(&self) -> RecordedRequest {
        self.requests().last().cloned().expect("no request recorded")
    }

    /// Config with every service pointed at this backend
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.services.lms_url = format!("{}/lms", self.base_url);
        config.services.dm_url = format!("{}/dm", self.base_url);
        config.services.axd_url = format!("{}/axd", self.base_url);
        config.security.trusted_origin = "https://app.mentor.test".to_string();
        config.http.timeout_secs = 5;
        config
    }

    pub fn dispatcher(&self, store: Arc<dyn CredentialStore>, mode: RetryMode) -> Dispatcher {
        Dispatcher::builder(self.config())
            .store(store)
            .retry_policy(RetryPolicy::immediate(3, mode))
            .build()
            .expect("dispatcher")
    }
}

async fn handle(State(state): State<Arc<MockState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map(|b| b.to_vec())
        .unwrap_or_default();

    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in parts.headers.iter() {
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }

    let path = parts.uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        path: path.clone(),
        query: parts.uri.query().map(str::to_string),
        headers,
        body,
    });

    let (response, delay) = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(route) => {
                let response = route
                    .queued
                    .pop_front()
                    .or_else(|| route.fixed.clone())
                    .unwrap_or((200, Value::Null));
                (response, route.delay)
            }
            None => ((404, serde_json::json!({"detail": "no mock route"})), None),
        }
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let (status, body) = response;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match body {
        Value::Null => status.into_response(),
        Value::String(text) => (status, text).into_response(),
        other => (status, axum::Json(other)).into_response(),
    }
}

pub fn store_with(tokens: &[(&str, &str)]) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_tokens(tokens.iter().map(|(k, v)| (k.to_string(), v.to_string()))))
}

pub fn token_of(len: usize) -> String {
    "t".repeat(len)
}
