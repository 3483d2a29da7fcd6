pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod legacy;
pub mod request;
pub mod retry;
pub mod service;
pub mod store;

pub use auth::{resolve_auth_header, AuthHeader, AuthScheme};
pub use dispatcher::{Dispatcher, DispatcherBuilder, StatusHandlers};
pub use error::{DispatchError, ErrorStatus, NormalizedError, RawFailure};
pub use legacy::{ClientConfig, GeneratedError, LegacyExecutor};
pub use request::{ApiResponse, FormPart, RequestBody, RequestDescriptor};
pub use retry::{RetryMode, RetryPolicy};
pub use service::{LogicalService, ServiceRegistry};
pub use store::{CredentialStore, CredentialStoreExt, FileStore, MemoryStore, StoredCredential};
