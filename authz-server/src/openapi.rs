use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0 API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "Token, introspection, revocation and authorization endpoints"),
    ),
    info(
        title = "Authorization Server API",
        description = "OAuth 2.0 authorization server issuing opaque tokens",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
