// ABOUTME: Integration tests for redirect-URI whitelist validation
// ABOUTME: Exercises pre-checks and pattern matching against stored whitelist entries

use mcpd::callback::CallbackValidator;
use mcpd::database::{CallbackWhitelistRepository, Database, McpServerRepository};
use mcpd::models::{CallbackWhitelistEntry, McpServer};
use std::sync::Arc;
use uuid::Uuid;

async fn setup(patterns: &[&str]) -> (CallbackValidator, Uuid) {
    let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    database.migrate().await.unwrap();

    let servers: Arc<dyn McpServerRepository> = database.clone();
    let server = McpServer::new(
        "weather".to_owned(),
        "Weather data".to_owned(),
        "https://weather.internal".to_owned(),
    );
    servers.add(&server).await.unwrap();

    let whitelist: Arc<dyn CallbackWhitelistRepository> = database.clone();
    for pattern in patterns {
        whitelist
            .add(&CallbackWhitelistEntry::new(server.id, (*pattern).to_owned()))
            .await
            .unwrap();
    }

    (CallbackValidator::new(whitelist), server.id)
}

#[tokio::test]
async fn matching_uri_passes() {
    let (validator, server_id) = setup(&["https://app.contoso.com/cb"]).await;

    let result = validator
        .validate(server_id, &["https://app.contoso.com/cb".to_owned()])
        .await
        .unwrap();

    assert!(result.is_valid);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn relative_uri_is_rejected_before_matching() {
    let (validator, server_id) = setup(&["https://app.contoso.com/cb"]).await;

    let result = validator
        .validate(server_id, &["/relative/path".to_owned()])
        .await
        .unwrap();

    assert!(!result.is_valid);
    assert!(result.errors[0].contains("not a valid absolute URI"));
}

#[tokio::test]
async fn fragment_is_rejected() {
    let (validator, server_id) = setup(&["https://app.contoso.com/cb"]).await;

    let result = validator
        .validate(server_id, &["https://app.contoso.com/cb#section".to_owned()])
        .await
        .unwrap();

    assert!(!result.is_valid);
    assert!(result.errors[0].contains("fragment"));
}

#[tokio::test]
async fn user_info_is_rejected() {
    let (validator, server_id) = setup(&["https://app.contoso.com/cb"]).await;

    let result = validator
        .validate(server_id, &["https://alice@app.contoso.com/cb".to_owned()])
        .await
        .unwrap();

    assert!(!result.is_valid);
    assert!(result.errors[0].contains("user information"));
}

#[tokio::test]
async fn non_matching_uri_reports_whitelist_miss() {
    let (validator, server_id) = setup(&["https://app.contoso.com/cb"]).await;

    let result = validator
        .validate(server_id, &["https://evil.example.com/cb".to_owned()])
        .await
        .unwrap();

    assert!(!result.is_valid);
    assert!(result.errors[0].contains("does not match any whitelisted pattern"));
}

#[tokio::test]
async fn errors_are_collected_per_uri() {
    let (validator, server_id) = setup(&["https://app.contoso.com/cb"]).await;

    let result = validator
        .validate(
            server_id,
            &[
                "https://app.contoso.com/cb".to_owned(),
                "https://app.contoso.com/cb#x".to_owned(),
                "https://other.example.com/cb".to_owned(),
            ],
        )
        .await
        .unwrap();

    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 2);
}

#[tokio::test]
async fn any_matching_pattern_suffices() {
    let (validator, server_id) = setup(&[
        "https://app.contoso.com/cb",
        "http://localhost:*/cb",
        "https://*.contoso.com/hook",
    ])
    .await;

    let result = validator
        .validate(
            server_id,
            &[
                "http://localhost:9999/cb".to_owned(),
                "https://tenant.contoso.com/hook".to_owned(),
            ],
        )
        .await
        .unwrap();

    assert!(result.is_valid);
}

#[tokio::test]
async fn inactive_entries_do_not_match() {
    let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    database.migrate().await.unwrap();

    let servers: Arc<dyn McpServerRepository> = database.clone();
    let server = McpServer::new(
        "weather".to_owned(),
        String::new(),
        "https://weather.internal".to_owned(),
    );
    servers.add(&server).await.unwrap();

    let whitelist: Arc<dyn CallbackWhitelistRepository> = database.clone();
    let mut entry = CallbackWhitelistEntry::new(server.id, "https://app.contoso.com/cb".to_owned());
    entry.is_active = false;
    whitelist.add(&entry).await.unwrap();

    let validator = CallbackValidator::new(whitelist);
    let result = validator
        .validate(server.id, &["https://app.contoso.com/cb".to_owned()])
        .await
        .unwrap();

    assert!(!result.is_valid);
}
