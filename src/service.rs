use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ServicesConfig;

/// Storage key used when a service has no key of its own
pub const LEGACY_TOKEN_KEY: &str = "token";

/// Named backend a request can target.
///
/// Identifiers that match none of the known backends are kept as `Other`
/// rather than rejected; they resolve to the default service's URL and to the
/// legacy token key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalService {
    /// Main learning system
    Lms,
    /// Data/management service
    DataManager,
    /// Auxiliary data service
    AuxData,
    Other(String),
}

impl LogicalService {
    pub const KNOWN: [LogicalService; 3] = [
        LogicalService::Lms,
        LogicalService::DataManager,
        LogicalService::AuxData,
    ];

    pub fn name(&self) -> &str {
        match self {
            LogicalService::Lms => "lms",
            LogicalService::DataManager => "dm",
            LogicalService::AuxData => "axd",
            LogicalService::Other(name) => name,
        }
    }

    pub fn token_key(&self) -> &'static str {
        match self {
            LogicalService::Lms => "edx_jwt_token",
            LogicalService::DataManager => "dm_token",
            LogicalService::AuxData => "axd_token",
            LogicalService::Other(_) => LEGACY_TOKEN_KEY,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, LogicalService::Other(_))
    }

    /// The learning system authenticates with session cookies and wants
    /// Referer/Origin pinned to the trusted frontend.
    pub fn requires_origin_headers(&self) -> bool {
        matches!(self, LogicalService::Lms)
    }
}

impl From<&str> for LogicalService {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lms" | "learning" => LogicalService::Lms,
            "dm" | "data_manager" | "data-manager" => LogicalService::DataManager,
            "axd" | "aux_data" | "aux-data" => LogicalService::AuxData,
            _ => LogicalService::Other(value.to_string()),
        }
    }
}

impl From<String> for LogicalService {
    fn from(value: String) -> Self {
        LogicalService::from(value.as_str())
    }
}

impl From<LogicalService> for String {
    fn from(service: LogicalService) -> Self {
        service.name().to_string()
    }
}

impl fmt::Display for LogicalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Static map from logical service to base URL, built once from configuration.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    lms_url: String,
    dm_url: String,
    axd_url: String,
    default_service: LogicalService,
}

impl ServiceRegistry {
    pub fn new(config: &ServicesConfig) -> Self {
        let default_service = if config.default_service.is_known() {
            config.default_service.clone()
        } else {
            LogicalService::Lms
        };

        Self {
            lms_url: trim_base(&config.lms_url),
            dm_url: trim_base(&config.dm_url),
            axd_url: trim_base(&config.axd_url),
            default_service,
        }
    }

    pub fn default_service(&self) -> &LogicalService {
        &self.default_service
    }

    pub fn resolve_base_url(&self, service: &LogicalService) -> &str {
        match service {
            LogicalService::Lms => &self.lms_url,
            LogicalService::DataManager => &self.dm_url,
            LogicalService::AuxData => &self.axd_url,
            LogicalService::Other(name) => {
                tracing::debug!("Unknown service '{}', using {}", name, self.default_service);
                self.resolve_base_url(&self.default_service)
            }
        }
    }

    /// Join a request path onto the service's base URL.
    pub fn build_url(&self, service: &LogicalService, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let base = self.resolve_base_url(service);
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
