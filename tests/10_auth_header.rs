mod common;

use anyhow::Result;
use serde_json::Value;

use common::{store_with, token_of, MockBackend};
use mentor_api_client::retry::RetryMode;
use mentor_api_client::{
    AuthScheme, CredentialStoreExt, LogicalService, MemoryStore, RequestDescriptor, StoredCredential,
};

#[tokio::test]
async fn dm_short_token_uses_token_scheme() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/dm/ping", 200, serde_json::json!({"ok": true}));

    let tok = token_of(10);
    let dispatcher = backend.dispatcher(store_with(&[("dm_token", tok.as_str())]), RetryMode::Classified);

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::DataManager, "/ping"))
        .await?;

    let request = backend.last();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/dm/ping");
    assert_eq!(request.header("authorization"), Some(format!("Token {}", tok).as_str()));
    Ok(())
}

#[tokio::test]
async fn lms_long_token_uses_jwt_scheme() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/lms/ping", 200, serde_json::json!({}));

    let tok = token_of(40);
    let dispatcher = backend.dispatcher(store_with(&[("edx_jwt_token", tok.as_str())]), RetryMode::Classified);

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::Lms, "/ping"))
        .await?;

    let request = backend.last();
    assert_eq!(request.header("authorization"), Some(format!("JWT {}", tok).as_str()));
    Ok(())
}

#[tokio::test]
async fn lms_short_token_uses_bearer_scheme() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/lms/ping", 200, serde_json::json!({}));

    let tok = token_of(30);
    let dispatcher = backend.dispatcher(store_with(&[("edx_jwt_token", tok.as_str())]), RetryMode::Classified);

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::Lms, "/ping"))
        .await?;

    assert_eq!(
        backend.last().header("authorization"),
        Some(format!("Bearer {}", tok).as_str())
    );
    Ok(())
}

#[tokio::test]
async fn axd_long_token_still_uses_token_scheme() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/axd/ping", 200, serde_json::json!({}));

    let tok = token_of(120);
    let dispatcher = backend.dispatcher(store_with(&[("axd_token", tok.as_str())]), RetryMode::Classified);

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::AuxData, "/ping"))
        .await?;

    assert_eq!(
        backend.last().header("authorization"),
        Some(format!("Token {}", tok).as_str())
    );
    Ok(())
}

#[tokio::test]
async fn empty_store_sends_anonymous_requests() -> Result<()> {
    let backend = MockBackend::start().await?;
    for service in ["lms", "dm", "axd"] {
        backend.on(&format!("/{}/ping", service), 200, serde_json::json!({"pong": service}));
    }

    let dispatcher = backend.dispatcher(store_with(&[]), RetryMode::Classified);

    for service in LogicalService::KNOWN.iter() {
        let response = dispatcher
            .execute::<Value>(RequestDescriptor::get(service.clone(), "/ping"))
            .await?;
        assert_eq!(response.data["pong"], service.name());

        let request = backend.last();
        assert_eq!(request.header("authorization"), None, "{} sent credentials", service);
    }
    Ok(())
}

#[tokio::test]
async fn blank_token_is_treated_as_absent() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/dm/ping", 200, serde_json::json!({}));

    let dispatcher = backend.dispatcher(store_with(&[("dm_token", "   ")]), RetryMode::Classified);
    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::DataManager, "/ping"))
        .await?;

    assert_eq!(backend.last().header("authorization"), None);
    Ok(())
}

#[tokio::test]
async fn explicit_scheme_overrides_length_rule() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/lms/ping", 200, serde_json::json!({}));

    let store = std::sync::Arc::new(MemoryStore::new());
    let tok = token_of(60);
    store
        .set("edx_jwt_token", &StoredCredential::explicit(AuthScheme::Bearer, tok.clone()))
        .await?;

    let dispatcher = backend.dispatcher(store, RetryMode::Classified);
    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::Lms, "/ping"))
        .await?;

    assert_eq!(
        backend.last().header("authorization"),
        Some(format!("Bearer {}", tok).as_str())
    );
    Ok(())
}

#[tokio::test]
async fn lms_requests_carry_trusted_origin() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/lms/ping", 200, serde_json::json!({}));
    backend.on("/dm/ping", 200, serde_json::json!({}));

    let dispatcher = backend.dispatcher(store_with(&[]), RetryMode::Classified);

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::Lms, "/ping"))
        .await?;
    let lms = backend.last();
    assert_eq!(lms.header("origin"), Some("https://app.mentor.test"));
    assert_eq!(lms.header("referer"), Some("https://app.mentor.test"));

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::DataManager, "/ping"))
        .await?;
    let dm = backend.last();
    assert_eq!(dm.header("origin"), None);
    assert_eq!(dm.header("referer"), None);
    Ok(())
}

#[tokio::test]
async fn token_changes_are_picked_up_between_calls() -> Result<()> {
    let backend = MockBackend::start().await?;
    backend.on("/dm/ping", 200, serde_json::json!({}));

    let store = store_with(&[("dm_token", "first")]);
    let dispatcher = backend.dispatcher(store.clone(), RetryMode::Classified);

    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::DataManager, "/ping"))
        .await?;
    assert_eq!(backend.last().header("authorization"), Some("Token first"));

    store.set("dm_token", &StoredCredential::raw("second")).await?;
    dispatcher
        .execute::<Value>(RequestDescriptor::get(LogicalService::DataManager, "/ping"))
        .await?;
    assert_eq!(backend.last().header("authorization"), Some("Token second"));
    Ok(())
}
