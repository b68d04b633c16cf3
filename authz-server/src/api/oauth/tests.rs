use crate::api::oauth::models::{IntrospectionResponse, TokenResponse};
use crate::test_utils::{TestFixture, CLIENT_ID, CLIENT_SECRET, REDIRECT_URI};
use http::StatusCode;
use crate::config::AppConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use url::form_urlencoded;

// RFC 7636 appendix B
const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CODE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

fn subject_header(fixture: &TestFixture) -> &str {
    &fixture.config.authorize.subject_header
}

fn authorize_uri(params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("/oauth2/authorize?{query}")
}

async fn introspect(fixture: &TestFixture, token: &str) -> IntrospectionResponse {
    let response = fixture
        .post_form("/oauth2/introspect", &[("token", token)])
        .await;
    response.assert_ok();
    response.json_as::<IntrospectionResponse>()
}

/// Runs the authorization endpoint as `user1` and returns the issued code
async fn authorization_code(fixture: &TestFixture, extra: &[(&str, &str)]) -> String {
    let mut params = vec![
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("scope", "openid message.read"),
        ("state", "xyz"),
    ];
    params.extend_from_slice(extra);

    let response = fixture
        .get_with_headers(authorize_uri(&params), &[(subject_header(fixture), "user1")])
        .await;
    response.assert_status(StatusCode::FOUND);
    let location = response.location_params();
    assert_eq!(location["state"], "xyz");
    location["code"].clone()
}

#[tokio::test]
async fn test_back_to_back_tokens_are_unique_and_active() {
    let fixture = TestFixture::new().await;

    let mut tokens = HashSet::new();
    for _ in 0..10 {
        tokens.insert(fixture.issue_token("message.read").await);
    }
    assert_eq!(tokens.len(), 10);

    for token in &tokens {
        let introspection = introspect(&fixture, token).await;
        assert!(introspection.active);
        assert_eq!(introspection.client_id.as_deref(), Some(CLIENT_ID));
        assert_eq!(introspection.scope.as_deref(), Some("message.read"));
        assert_eq!(introspection.token_type.as_deref(), Some("Bearer"));
        assert_eq!(introspection.iss.as_deref(), Some("http://localhost:9000"));
    }
}

/// Paces requests one second apart on tokio's paused clock. Only the request
/// cadence is virtual: `issued_at` still reads the wall clock, so the records
/// carry near-identical timestamps.
#[tokio::test(start_paused = true)]
async fn test_paced_tokens_are_unique_and_active() {
    let fixture = TestFixture::new().await;

    let mut tokens = HashSet::new();
    for _ in 0..10 {
        tokens.insert(fixture.issue_token("message.read").await);
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    assert_eq!(tokens.len(), 10);

    for token in &tokens {
        assert!(introspect(&fixture, token).await.active);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_token_requests_are_unique_and_active() {
    let fixture = TestFixture::new().await;

    let barrier = Arc::new(Barrier::new(10));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let fixture = fixture.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            fixture.issue_token("message.read").await
        }));
    }

    let mut tokens = HashSet::new();
    for handle in handles {
        tokens.insert(handle.await.expect("token request panicked"));
    }
    assert_eq!(tokens.len(), 10);

    for token in &tokens {
        assert!(introspect(&fixture, token).await.active);
    }
}

#[tokio::test]
async fn test_basic_with_repeated_form_credentials() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("scope", "message.read"),
                ("state", "some-state"),
            ],
        )
        .await;
    response.assert_ok();
    let token = response.json_as::<TokenResponse>();
    assert!(introspect(&fixture, &token.access_token).await.active);

    // a form secret that disagrees with the header is not ignored
    fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", CLIENT_ID),
                ("client_secret", "not-the-secret"),
            ],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_request");
}

#[tokio::test]
async fn test_subject_header_is_configurable() {
    let mut config = AppConfig::for_test();
    config.authorize.subject_header = "x-remote-user".to_string();
    let fixture = TestFixture::with_config(config).await;
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
    ]);

    fixture
        .get_with_headers(&uri, &[("x-authenticated-user", "user1")])
        .await
        .assert_error(StatusCode::UNAUTHORIZED, "access_denied");

    let response = fixture
        .get_with_headers(&uri, &[("x-remote-user", "user1")])
        .await;
    response.assert_status(StatusCode::FOUND);
    assert!(response.location_params().contains_key("code"));
}

#[tokio::test]
async fn test_token_response_shape() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_form(
            "/oauth2/token",
            &[("grant_type", "client_credentials"), ("scope", "message.read")],
        )
        .await;
    response.assert_ok();
    assert_eq!(response.header("cache-control"), Some("no-store"));

    let token = response.json_as::<TokenResponse>();
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in, 300);
    assert_eq!(token.scope.as_deref(), Some("message.read"));
    assert!(token.refresh_token.is_none());
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let fixture = TestFixture::new().await;
    let authorization = TestFixture::basic_auth(CLIENT_ID, "wrong");

    let response = fixture
        .post_form_with_headers(
            "/oauth2/token",
            &[("grant_type", "client_credentials")],
            &[("Authorization", authorization.as_str())],
        )
        .await;
    response.assert_error(StatusCode::UNAUTHORIZED, "invalid_client");
    assert_eq!(
        response.header("www-authenticate"),
        Some("Basic realm=\"oauth2\"")
    );
}

#[tokio::test]
async fn test_missing_client_authentication() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_form_with_headers("/oauth2/token", &[("grant_type", "client_credentials")], &[])
        .await;
    response.assert_error(StatusCode::UNAUTHORIZED, "invalid_client");
}

#[tokio::test]
async fn test_unregistered_authentication_method() {
    let fixture = TestFixture::new().await;

    // the development client only registers client_secret_basic
    let response = fixture
        .post_form_with_headers(
            "/oauth2/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
            ],
            &[],
        )
        .await;
    response.assert_error(StatusCode::UNAUTHORIZED, "invalid_client");
}

#[tokio::test]
async fn test_malformed_token_requests() {
    let fixture = TestFixture::new().await;

    fixture
        .post_form("/oauth2/token", &[("scope", "message.read")])
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_request");

    fixture
        .post_form("/oauth2/token", &[("grant_type", "password")])
        .await
        .assert_error(StatusCode::BAD_REQUEST, "unsupported_grant_type");

    fixture
        .post_form(
            "/oauth2/token",
            &[("grant_type", "client_credentials"), ("scope", "admin")],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_scope");

    fixture
        .post_form("/oauth2/token", &[("grant_type", "authorization_code")])
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_request");
}

#[tokio::test]
async fn test_authorization_code_flow() {
    let fixture = TestFixture::new().await;
    let code = authorization_code(&fixture, &[]).await;

    let exchange = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
    ];
    let response = fixture.post_form("/oauth2/token", &exchange).await;
    response.assert_ok();
    let token = response.json_as::<TokenResponse>();
    assert_eq!(token.scope.as_deref(), Some("message.read openid"));
    let refresh_token = token.refresh_token.expect("refresh token should be issued");

    let introspection = introspect(&fixture, &token.access_token).await;
    assert!(introspection.active);
    assert_eq!(introspection.sub.as_deref(), Some("user1"));

    // a consumed code is never exchanged twice
    fixture
        .post_form("/oauth2/token", &exchange)
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_grant");

    let response = fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ],
        )
        .await;
    response.assert_ok();
    let refreshed = response.json_as::<TokenResponse>();
    assert_ne!(refreshed.access_token, token.access_token);
    assert_ne!(refreshed.refresh_token.as_deref(), Some(refresh_token.as_str()));

    // the rotated refresh token is retired
    assert!(!introspect(&fixture, &refresh_token).await.active);
    fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_grant");
}

#[tokio::test]
async fn test_authorization_code_with_pkce() {
    let fixture = TestFixture::new().await;
    let code = authorization_code(
        &fixture,
        &[
            ("code_challenge", CODE_CHALLENGE),
            ("code_challenge_method", "S256"),
        ],
    )
    .await;

    fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
            ],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_grant");

    fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", CODE_VERIFIER),
            ],
        )
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_code_exchange_requires_matching_redirect() {
    let fixture = TestFixture::new().await;
    let code = authorization_code(&fixture, &[]).await;

    fixture
        .post_form(
            "/oauth2/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                (
                    "redirect_uri",
                    "http://127.0.0.1:8080/login/oauth2/code/messaging-client-oidc",
                ),
            ],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_grant");
}

#[tokio::test]
async fn test_authorize_requires_end_user() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get(authorize_uri(&[
            ("response_type", "code"),
            ("client_id", CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
        ]))
        .await;
    response.assert_error(StatusCode::UNAUTHORIZED, "access_denied");
}

#[tokio::test]
async fn test_authorize_errors() {
    let fixture = TestFixture::new().await;

    // unknown clients are never redirected
    fixture
        .get_with_headers(
            authorize_uri(&[
                ("response_type", "code"),
                ("client_id", "nobody"),
                ("redirect_uri", REDIRECT_URI),
            ]),
            &[(subject_header(&fixture), "user1")],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_request");

    // the development client registers two redirect URIs, so one is required
    fixture
        .get_with_headers(
            authorize_uri(&[("response_type", "code"), ("client_id", CLIENT_ID)]),
            &[(subject_header(&fixture), "user1")],
        )
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_request");

    let response = fixture
        .get_with_headers(
            authorize_uri(&[
                ("response_type", "token"),
                ("client_id", CLIENT_ID),
                ("redirect_uri", REDIRECT_URI),
                ("state", "abc"),
            ]),
            &[(subject_header(&fixture), "user1")],
        )
        .await;
    response.assert_status(StatusCode::FOUND);
    let location = response.location_params();
    assert_eq!(location["error"], "unsupported_response_type");
    assert_eq!(location["state"], "abc");
}

#[tokio::test]
async fn test_revoked_token_is_inactive() {
    let fixture = TestFixture::new().await;
    let token = fixture.issue_token("message.read").await;

    let response = fixture
        .post_form(
            "/oauth2/revoke",
            &[("token", token.as_str()), ("token_type_hint", "access_token")],
        )
        .await;
    response.assert_ok();

    let introspection = introspect(&fixture, &token).await;
    assert!(!introspection.active);
    assert!(introspection.client_id.is_none());

    // unknown tokens are accepted silently
    fixture
        .post_form("/oauth2/revoke", &[("token", "never-issued")])
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_introspection_inputs() {
    let fixture = TestFixture::new().await;

    let unknown = introspect(&fixture, "never-issued").await;
    assert!(!unknown.active);

    fixture
        .post_form("/oauth2/introspect", &[])
        .await
        .assert_error(StatusCode::BAD_REQUEST, "invalid_request");

    let authorization = TestFixture::basic_auth(CLIENT_ID, "wrong");
    fixture
        .post_form_with_headers(
            "/oauth2/introspect",
            &[("token", "never-issued")],
            &[("Authorization", authorization.as_str())],
        )
        .await
        .assert_error(StatusCode::UNAUTHORIZED, "invalid_client");
}

#[tokio::test]
async fn test_introspection_accepts_json() {
    let fixture = TestFixture::new().await;
    let token = fixture.issue_token("message.write").await;

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri("/oauth2/introspect")
        .header("Content-Type", "application/json")
        .header(
            "Authorization",
            TestFixture::basic_auth(CLIENT_ID, CLIENT_SECRET),
        )
        .body(axum::body::Body::from(
            serde_json::json!({ "token": token }).to_string(),
        ))
        .expect("Failed to build request");

    let response = fixture.send(request).await;
    response.assert_ok();
    let introspection = response.json_as::<IntrospectionResponse>();
    assert!(introspection.active);
    assert_eq!(introspection.scope.as_deref(), Some("message.write"));
}

#[tokio::test]
async fn test_openapi_document_lists_endpoints() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/openapi.json").await;
    response.assert_ok();
    for path in [
        "/oauth2/token",
        "/oauth2/introspect",
        "/oauth2/revoke",
        "/oauth2/authorize",
        "/health",
    ] {
        assert!(
            response.json["paths"].get(path).is_some(),
            "missing {path} in the OpenAPI document"
        );
    }
}
