use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::service::LogicalService;
use crate::store::{CredentialStore, CredentialStoreExt, StoreError, StoredCredential};

/// Learning-system tokens longer than this are treated as JWTs
pub const JWT_LENGTH_THRESHOLD: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthScheme {
    #[serde(rename = "JWT")]
    Jwt,
    Bearer,
    Token,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Jwt => "JWT",
            AuthScheme::Bearer => "Bearer",
            AuthScheme::Token => "Token",
        }
    }

    /// Scheme for a bare token with no recorded scheme
    pub fn infer(service: &LogicalService, token: &str) -> Self {
        match service {
            LogicalService::Lms if token.chars().count() > JWT_LENGTH_THRESHOLD => AuthScheme::Jwt,
            LogicalService::Lms => AuthScheme::Bearer,
            _ => AuthScheme::Token,
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jwt" => Ok(AuthScheme::Jwt),
            "bearer" => Ok(AuthScheme::Bearer),
            "token" => Ok(AuthScheme::Token),
            other => Err(format!("unknown auth scheme '{}'", other)),
        }
    }
}

/// A resolved `Authorization` header
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub scheme: AuthScheme,
    token: String,
}

impl AuthHeader {
    pub fn new(scheme: AuthScheme, token: impl Into<String>) -> Self {
        Self {
            scheme,
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn value(&self) -> String {
        format!("{} {}", self.scheme, self.token)
    }
}

// Tokens stay out of logs
impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader")
            .field("scheme", &self.scheme)
            .field("token_len", &self.token.len())
            .finish()
    }
}

/// Build the `Authorization` header for a service from the stored credential.
///
/// `None` for the store is a wiring bug and fails with `NotInitialized`.
/// An absent or blank token yields `Ok(None)` and the request goes out
/// anonymously. The store is read on every call.
pub async fn resolve_auth_header(
    store: Option<&dyn CredentialStore>,
    service: &LogicalService,
) -> Result<Option<AuthHeader>, StoreError> {
    let store = store.ok_or(StoreError::NotInitialized)?;
    let key = service.token_key();

    let credential: Option<StoredCredential> = store.get(key).await?;
    let credential = match credential {
        Some(c) if !c.is_blank() => c,
        _ => {
            tracing::debug!("No token under '{}' for {}, sending anonymously", key, service);
            return Ok(None);
        }
    };

    let token = credential.token().trim();
    let scheme = credential
        .scheme()
        .unwrap_or_else(|| AuthScheme::infer(service, token));

    tracing::debug!(
        service = %service,
        scheme = %scheme,
        token_len = token.len(),
        "Resolved auth header"
    );

    Ok(Some(AuthHeader::new(scheme, token)))
}
