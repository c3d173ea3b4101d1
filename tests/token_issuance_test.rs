// ABOUTME: Integration tests for the token issuance engine
// ABOUTME: Covers both grant protocols, the ordered failure modes, and JWKS round-trips

use async_trait::async_trait;
use mcpd::config::{AuthServerConfig, ServerClaimMapping};
use mcpd::crypto::{SecretHasher, SigningKeyManager};
use mcpd::database::{
    ClientRegistrationRepository, ClientServerGrantRepository, Database, McpServerRepository,
};
use mcpd::errors::{AppError, AppResult, OAuthErrorCode};
use mcpd::idp::{IdpTokenValidator, UserTokenValidation};
use mcpd::models::{ClientRegistration, ClientServerGrant, McpServer};
use mcpd::token_generator::{AccessTokenClaims, TokenGenerator};
use mcpd::token_issuance::{TokenIssuanceEngine, TokenIssuanceRequest};
use mcpd::user_access::UserServerAuthorization;
use std::sync::Arc;

const ISSUER: &str = "https://mcpd.example.com";

/// IdP stand-in returning a fixed outcome
struct StaticIdpValidator(AppResult<UserTokenValidation>);

#[async_trait]
impl IdpTokenValidator for StaticIdpValidator {
    async fn validate(&self, _assertion: &str) -> AppResult<UserTokenValidation> {
        match &self.0 {
            Ok(identity) => Ok(identity.clone()),
            Err(AppError::OAuth { code, description }) => Err(AppError::OAuth {
                code: *code,
                description: description.clone(),
            }),
            Err(_) => Err(AppError::upstream("metadata fetch failed")),
        }
    }
}

struct Harness {
    engine: TokenIssuanceEngine,
    database: Arc<Database>,
    hasher: Arc<SecretHasher>,
    keys: Arc<SigningKeyManager>,
    server: McpServer,
}

async fn setup_with_idp(idp: Arc<dyn IdpTokenValidator>) -> Harness {
    let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    database.migrate().await.unwrap();

    let servers: Arc<dyn McpServerRepository> = database.clone();
    let server = McpServer::new(
        "weather".to_owned(),
        "Weather data".to_owned(),
        "https://weather.internal".to_owned(),
    );
    servers.add(&server).await.unwrap();

    let keys = Arc::new(SigningKeyManager::generate().unwrap());
    let hasher = Arc::new(SecretHasher::new(4));

    let mut auth_config = AuthServerConfig::default();
    auth_config.server_mappings.insert(
        "weather".to_owned(),
        ServerClaimMapping {
            required_roles: vec!["weather.user".to_owned()],
            default_scopes: vec!["read".to_owned(), "forecast".to_owned()],
        },
    );

    let engine = TokenIssuanceEngine::new(
        database.clone(),
        database.clone(),
        database.clone(),
        database.clone(),
        hasher.clone(),
        Arc::new(TokenGenerator::new(ISSUER, keys.clone())),
        idp,
        Arc::new(UserServerAuthorization::new(&auth_config)),
        60,
    );

    Harness {
        engine,
        database,
        hasher,
        keys,
        server,
    }
}

async fn setup() -> Harness {
    setup_with_idp(Arc::new(StaticIdpValidator(Ok(UserTokenValidation {
        subject: "user-123".to_owned(),
        preferred_username: Some("alice".to_owned()),
        claims: vec!["weather.user".to_owned()],
    }))))
    .await
}

/// Insert a registered client with an active grant and return its secret
async fn register_client(harness: &Harness, scopes: &[&str]) -> (ClientRegistration, String) {
    let secret = "test-client-secret".to_owned();
    let secret_hash = harness.hasher.hash(&secret).await.unwrap();

    let registration = ClientRegistration::new(
        format!("client-{}", uuid::Uuid::new_v4().simple()),
        secret_hash,
        "Test Client".to_owned(),
        "client_secret_post".to_owned(),
        vec!["client_credentials".to_owned()],
        vec!["https://app.contoso.com/cb".to_owned()],
        "unused-rat-hash".to_owned(),
    );

    let clients: Arc<dyn ClientRegistrationRepository> = harness.database.clone();
    clients.add(&registration).await.unwrap();

    let grants: Arc<dyn ClientServerGrantRepository> = harness.database.clone();
    grants
        .add(&ClientServerGrant::new(
            registration.id,
            harness.server.id,
            scopes.iter().map(|s| (*s).to_owned()).collect(),
        ))
        .await
        .unwrap();

    (registration, secret)
}

fn client_credentials_request(
    registration: &ClientRegistration,
    secret: &str,
    server_id: uuid::Uuid,
    scopes: Option<Vec<String>>,
) -> TokenIssuanceRequest {
    TokenIssuanceRequest {
        grant_type: Some("client_credentials".to_owned()),
        client_id: Some(registration.client_id.clone()),
        client_secret: Some(secret.to_owned()),
        server_id: Some(server_id.to_string()),
        scopes,
        assertion: None,
        auth_method: "client_secret_post".to_owned(),
    }
}

#[tokio::test]
async fn client_credentials_issues_token_verifiable_via_jwks() {
    let harness = setup().await;
    let (registration, secret) = register_client(&harness, &["read", "write"]).await;

    let result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            &secret,
            harness.server.id,
            None,
        ))
        .await
        .unwrap();

    assert!(result.is_authorized, "{:?}", result.error_description);
    assert_eq!(result.expires_in, Some(3600));
    assert_eq!(
        result.granted_scopes,
        Some(vec!["read".to_owned(), "write".to_owned()])
    );

    // Round trip: verify against the key as published in the JWKS document
    use base64::Engine as _;
    use rsa::pkcs8::EncodePublicKey;
    let jwk = &harness.keys.jwks().keys[0];
    let n = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(&jwk.n)
        .unwrap();
    let e = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(&jwk.e)
        .unwrap();
    let public_key = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .unwrap();
    let pem = public_key
        .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
        .unwrap();
    let decoding_key = jsonwebtoken::DecodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.set_audience(&["weather"]);
    validation.set_issuer(&[ISSUER]);

    let decoded = jsonwebtoken::decode::<AccessTokenClaims>(
        &result.access_token.unwrap(),
        &decoding_key,
        &validation,
    )
    .unwrap();
    assert_eq!(decoded.claims.sub, registration.client_id);
    assert_eq!(decoded.claims.scope, "read write");
}

#[tokio::test]
async fn requested_scope_subset_is_echoed_exactly() {
    let harness = setup().await;
    let (registration, secret) = register_client(&harness, &["read", "write"]).await;

    let result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            &secret,
            harness.server.id,
            Some(vec!["read".to_owned()]),
        ))
        .await
        .unwrap();

    assert!(result.is_authorized);
    assert_eq!(result.granted_scopes, Some(vec!["read".to_owned()]));
}

#[tokio::test]
async fn scope_outside_grant_yields_invalid_scope() {
    let harness = setup().await;
    let (registration, secret) = register_client(&harness, &["read", "write"]).await;

    let result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            &secret,
            harness.server.id,
            Some(vec!["admin".to_owned()]),
        ))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidScope));
}

#[tokio::test]
async fn unknown_client_yields_invalid_client() {
    let harness = setup().await;

    let result = harness
        .engine
        .issue(TokenIssuanceRequest {
            grant_type: Some("client_credentials".to_owned()),
            client_id: Some("no-such-client".to_owned()),
            client_secret: Some("whatever".to_owned()),
            server_id: Some(harness.server.id.to_string()),
            scopes: None,
            assertion: None,
            auth_method: "client_secret_post".to_owned(),
        })
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidClient));
}

#[tokio::test]
async fn wrong_secret_yields_invalid_client() {
    let harness = setup().await;
    let (registration, _secret) = register_client(&harness, &["read"]).await;

    let result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            "wrong-secret",
            harness.server.id,
            None,
        ))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidClient));
}

#[tokio::test]
async fn auth_method_mismatch_yields_invalid_client() {
    let harness = setup().await;
    let (registration, secret) = register_client(&harness, &["read"]).await;

    let mut request =
        client_credentials_request(&registration, &secret, harness.server.id, None);
    request.auth_method = "client_secret_basic".to_owned();

    let result = harness.engine.issue(request).await.unwrap();
    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidClient));
}

#[tokio::test]
async fn missing_grant_yields_unauthorized_client() {
    let harness = setup().await;
    let (registration, secret) = register_client(&harness, &["read"]).await;

    // A second server the client holds no grant for
    let servers: Arc<dyn McpServerRepository> = harness.database.clone();
    let other = McpServer::new(
        "calendar".to_owned(),
        String::new(),
        "https://calendar.internal".to_owned(),
    );
    servers.add(&other).await.unwrap();

    let result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            &secret,
            other.id,
            None,
        ))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::UnauthorizedClient));
}

#[tokio::test]
async fn revoked_client_yields_invalid_client() {
    let harness = setup().await;
    let (mut registration, secret) = register_client(&harness, &["read"]).await;

    registration.revoke();
    let clients: Arc<dyn ClientRegistrationRepository> = harness.database.clone();
    clients.update(&registration).await.unwrap();

    let result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            &secret,
            harness.server.id,
            None,
        ))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidClient));
}

#[tokio::test]
async fn rotation_invalidates_old_secret_and_activates_new() {
    let harness = setup().await;
    let (mut registration, old_secret) = register_client(&harness, &["read"]).await;

    let new_secret = "rotated-secret";
    let new_hash = harness.hasher.hash(new_secret).await.unwrap();
    registration.rotate_secret(new_hash, None);
    let clients: Arc<dyn ClientRegistrationRepository> = harness.database.clone();
    clients.update(&registration).await.unwrap();

    let old_result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            &old_secret,
            harness.server.id,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(old_result.error, Some(OAuthErrorCode::InvalidClient));

    let new_result = harness
        .engine
        .issue(client_credentials_request(
            &registration,
            new_secret,
            harness.server.id,
            None,
        ))
        .await
        .unwrap();
    assert!(new_result.is_authorized);
}

#[tokio::test]
async fn grant_type_dispatch_rejects_malformed_requests() {
    let harness = setup().await;

    let missing = harness
        .engine
        .issue(TokenIssuanceRequest::default())
        .await
        .unwrap();
    assert_eq!(missing.error, Some(OAuthErrorCode::InvalidRequest));

    let unsupported = harness
        .engine
        .issue(TokenIssuanceRequest {
            grant_type: Some("authorization_code".to_owned()),
            ..TokenIssuanceRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(unsupported.error, Some(OAuthErrorCode::UnsupportedGrantType));

    let no_assertion = harness
        .engine
        .issue(TokenIssuanceRequest {
            grant_type: Some("urn:ietf:params:oauth:grant-type:jwt-bearer".to_owned()),
            server_id: Some(harness.server.id.to_string()),
            ..TokenIssuanceRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(no_assertion.error, Some(OAuthErrorCode::InvalidRequest));
}

fn jwt_bearer_request(server_id: uuid::Uuid, scopes: Option<Vec<String>>) -> TokenIssuanceRequest {
    TokenIssuanceRequest {
        grant_type: Some("urn:ietf:params:oauth:grant-type:jwt-bearer".to_owned()),
        server_id: Some(server_id.to_string()),
        scopes,
        assertion: Some("idp-assertion".to_owned()),
        auth_method: "client_secret_post".to_owned(),
        ..TokenIssuanceRequest::default()
    }
}

#[tokio::test]
async fn jwt_bearer_exchange_issues_user_token() {
    let harness = setup().await;

    let result = harness
        .engine
        .issue(jwt_bearer_request(harness.server.id, None))
        .await
        .unwrap();

    assert!(result.is_authorized, "{:?}", result.error_description);
    assert_eq!(
        result.granted_scopes,
        Some(vec!["read".to_owned(), "forecast".to_owned()])
    );

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.set_audience(&["weather"]);
    validation.set_issuer(&[ISSUER]);
    let decoded = jsonwebtoken::decode::<AccessTokenClaims>(
        &result.access_token.unwrap(),
        harness.keys.decoding_key(),
        &validation,
    )
    .unwrap();

    assert_eq!(decoded.claims.sub, "user-123");
    assert_eq!(decoded.claims.token_type.as_deref(), Some("user"));
    assert_eq!(decoded.claims.preferred_username.as_deref(), Some("alice"));
    assert_eq!(
        decoded.claims.server_id.as_deref(),
        Some(harness.server.id.to_string().as_str())
    );
}

#[tokio::test]
async fn jwt_bearer_rejects_invalid_assertion() {
    let harness = setup_with_idp(Arc::new(StaticIdpValidator(Err(AppError::invalid_grant(
        "User token validation failed.",
    )))))
    .await;

    let result = harness
        .engine
        .issue(jwt_bearer_request(harness.server.id, None))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidGrant));
}

#[tokio::test]
async fn jwt_bearer_surfaces_idp_outage_as_infrastructure_error() {
    let harness = setup_with_idp(Arc::new(StaticIdpValidator(Err(AppError::upstream(
        "metadata fetch failed",
    )))))
    .await;

    let err = harness
        .engine
        .issue(jwt_bearer_request(harness.server.id, None))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upstream(_)));
}

#[tokio::test]
async fn jwt_bearer_rejects_inactive_target() {
    let harness = setup().await;

    let servers: Arc<dyn McpServerRepository> = harness.database.clone();
    let mut server = harness.server.clone();
    server.deactivate();
    servers.update(&server).await.unwrap();

    let result = harness
        .engine
        .issue(jwt_bearer_request(server.id, None))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::InvalidTarget));
}

#[tokio::test]
async fn jwt_bearer_rejects_excess_requested_scopes() {
    let harness = setup().await;

    let result = harness
        .engine
        .issue(jwt_bearer_request(
            harness.server.id,
            Some(vec!["read".to_owned(), "admin".to_owned()]),
        ))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::UnauthorizedClient));
}

#[tokio::test]
async fn jwt_bearer_rejects_user_without_required_role() {
    let harness = setup_with_idp(Arc::new(StaticIdpValidator(Ok(UserTokenValidation {
        subject: "user-456".to_owned(),
        preferred_username: None,
        claims: vec!["unrelated.role".to_owned()],
    }))))
    .await;

    let result = harness
        .engine
        .issue(jwt_bearer_request(harness.server.id, None))
        .await
        .unwrap();

    assert!(!result.is_authorized);
    assert_eq!(result.error, Some(OAuthErrorCode::UnauthorizedClient));
}
