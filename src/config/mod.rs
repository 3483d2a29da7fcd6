use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::service::LogicalService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub services: ServicesConfig,
    pub http: HttpConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub lms_url: String,
    pub dm_url: String,
    pub axd_url: String,
    /// Service whose base URL answers for identifiers nobody recognizes
    pub default_service: LogicalService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-attempt timeout
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_mode: RetryModeSetting,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryModeSetting {
    Classified,
    Uniform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Sent as Referer and Origin on every call to the learning system
    pub trusted_origin: String,
    /// Errors from URLs containing this segment are handed back untouched
    pub passthrough_segment: String,
}

impl HttpConfig {
    /// Never zero: a zero timeout would fail every attempt before it starts
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Service overrides
        if let Ok(v) = env::var("MENTOR_LMS_URL") {
            self.services.lms_url = v;
        }
        if let Ok(v) = env::var("MENTOR_DM_URL") {
            self.services.dm_url = v;
        }
        if let Ok(v) = env::var("MENTOR_AXD_URL") {
            self.services.axd_url = v;
        }
        if let Ok(v) = env::var("MENTOR_DEFAULT_SERVICE") {
            let service = LogicalService::from(v.as_str());
            if service.is_known() {
                self.services.default_service = service;
            }
        }

        // HTTP overrides
        if let Ok(v) = env::var("HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = v.parse().unwrap_or(self.http.timeout_secs).max(1);
        }
        if let Ok(v) = env::var("HTTP_MAX_ATTEMPTS") {
            self.http.max_attempts = v.parse().unwrap_or(self.http.max_attempts);
        }
        if let Ok(v) = env::var("HTTP_RETRY_INITIAL_DELAY_MS") {
            self.http.retry_initial_delay_ms = v.parse().unwrap_or(self.http.retry_initial_delay_ms);
        }
        if let Ok(v) = env::var("HTTP_RETRY_MAX_DELAY_MS") {
            self.http.retry_max_delay_ms = v.parse().unwrap_or(self.http.retry_max_delay_ms);
        }
        if let Ok(v) = env::var("HTTP_RETRY_MODE") {
            match v.as_str() {
                "uniform" => self.http.retry_mode = RetryModeSetting::Uniform,
                "classified" => self.http.retry_mode = RetryModeSetting::Classified,
                _ => {}
            }
        }
        if let Ok(v) = env::var("HTTP_USER_AGENT") {
            self.http.user_agent = v;
        }

        // Security overrides
        if let Ok(v) = env::var("MENTOR_TRUSTED_ORIGIN") {
            self.security.trusted_origin = v;
        }
        if let Ok(v) = env::var("MENTOR_PASSTHROUGH_SEGMENT") {
            self.security.passthrough_segment = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            services: ServicesConfig {
                lms_url: "http://localhost:18000".to_string(),
                dm_url: "http://localhost:8000".to_string(),
                axd_url: "http://localhost:8001".to_string(),
                default_service: LogicalService::Lms,
            },
            http: HttpConfig {
                timeout_secs: 30,
                max_attempts: 3,
                retry_initial_delay_ms: 100,
                retry_max_delay_ms: 2_000,
                retry_mode: RetryModeSetting::Classified,
                user_agent: default_user_agent(),
            },
            security: SecurityConfig {
                trusted_origin: "http://localhost:3000".to_string(),
                passthrough_segment: "upload_profile_image".to_string(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            services: ServicesConfig {
                lms_url: "https://learn.staging.example.com".to_string(),
                dm_url: "https://dm.staging.example.com".to_string(),
                axd_url: "https://axd.staging.example.com".to_string(),
                default_service: LogicalService::Lms,
            },
            http: HttpConfig {
                timeout_secs: 30,
                max_attempts: 3,
                retry_initial_delay_ms: 250,
                retry_max_delay_ms: 5_000,
                retry_mode: RetryModeSetting::Classified,
                user_agent: default_user_agent(),
            },
            security: SecurityConfig {
                trusted_origin: "https://staging.example.com".to_string(),
                passthrough_segment: "upload_profile_image".to_string(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            services: ServicesConfig {
                lms_url: "https://learn.example.com".to_string(),
                dm_url: "https://dm.example.com".to_string(),
                axd_url: "https://axd.example.com".to_string(),
                default_service: LogicalService::Lms,
            },
            http: HttpConfig {
                timeout_secs: 30,
                max_attempts: 3,
                retry_initial_delay_ms: 500,
                retry_max_delay_ms: 10_000,
                retry_mode: RetryModeSetting::Classified,
                user_agent: default_user_agent(),
            },
            security: SecurityConfig {
                trusted_origin: "https://app.example.com".to_string(),
                passthrough_segment: "upload_profile_image".to_string(),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn default_user_agent() -> String {
    format!("mentor-api-client/{}", env!("CARGO_PKG_VERSION"))
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
