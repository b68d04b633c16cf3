use crate::bootstrap::register_client;
use crate::config::AppConfig;
use crate::create_app;
use crate::state::AppState;
use authz_engine::Store;
use axum::body::Body;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tower::ServiceExt;
use url::form_urlencoded;

pub const CLIENT_ID: &str = "messaging-client";
pub const CLIENT_SECRET: &str = "secret";
pub const REDIRECT_URI: &str = "http://127.0.0.1:8080/authorized";

/// Test fixture running the full router over an in-memory store with the
/// development client registered.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .post_form("/oauth2/token", &[("grant_type", "client_credentials")])
///         .await;
///
///     response.assert_ok();
///     let token = response.json_as::<TokenResponse>();
///     assert_eq!(token.token_type, "Bearer");
/// }
/// ```
#[derive(Clone)]
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration the router was built from
    pub config: AppConfig,
}

impl TestFixture {
    /// Creates a new test fixture with the default test configuration
    pub async fn new() -> Self {
        Self::with_config(AppConfig::for_test()).await
    }

    /// Creates a new test fixture from the given configuration, e.g. to
    /// exercise a non-default setting
    pub async fn with_config(config: AppConfig) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let state = AppState::new(&config, Store::in_memory());
        register_client(&config.bootstrap, &state.service)
            .await
            .expect("Failed to register bootstrap client");
        let app = create_app(state.clone());

        Self { app, config }
    }

    /// Initializes the test logger with the given level.
    ///
    /// Called by [`TestFixture::new`] at `Debug`; later calls are no-ops.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// `Authorization` header value for HTTP Basic client authentication
    pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{client_id}:{client_secret}"))
        )
    }

    /// Sends a GET request to the specified URI
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    /// Sends a GET request with custom headers
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri.as_ref());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a form-encoded POST authenticated as the development client
    /// with HTTP Basic
    pub async fn post_form(&self, uri: impl AsRef<str>, form: &[(&str, &str)]) -> TestResponse {
        let authorization = Self::basic_auth(CLIENT_ID, CLIENT_SECRET);
        self.post_form_with_headers(uri, form, &[("Authorization", authorization.as_str())])
            .await
    }

    /// Sends a form-encoded POST with custom headers and no implicit client
    /// authentication
    pub async fn post_form_with_headers(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }

    /// Issues a client_credentials token for the development client
    pub async fn issue_token(&self, scope: &str) -> String {
        let response = self
            .post_form(
                "/oauth2/token",
                &[("grant_type", "client_credentials"), ("scope", scope)],
            )
            .await;
        response.assert_ok();
        response.json["access_token"]
            .as_str()
            .expect("Token response should carry an access_token")
            .to_string()
    }
}

/// Response from a test request that provides convenient access to status,
/// headers and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Asserts an RFC 6749 error body with the given status and error code
    pub fn assert_error(&self, expected: StatusCode, error: &str) -> &Self {
        self.assert_status(expected);
        assert_eq!(self.json["error"], error, "Unexpected error body: {}", self.json);
        self
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }

    /// Query parameters of the `Location` header of a redirect
    pub fn location_params(&self) -> HashMap<String, String> {
        let location = self
            .headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("Response should carry a Location header");
        let url = url::Url::parse(location).expect("Location should be an absolute URL");
        url.query_pairs().into_owned().collect()
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
