use authz_engine::{ClientAuthenticationMethod, ClientRegistration, GrantType};
use confique::Config;

/// Demo client registered at start-up
#[derive(Debug, Config, Clone)]
pub struct BootstrapConfig {
    /// Register the client on start-up (default: true)
    #[config(env = "AUTHZ_BOOTSTRAP_ENABLED", default = true)]
    pub enabled: bool,

    /// Client identifier (default: messaging-client)
    #[config(env = "AUTHZ_BOOTSTRAP_CLIENT_ID", default = "messaging-client")]
    pub client_id: String,

    /// Client secret, raw or `{id}`-prefixed encoded (default: {noop}secret)
    #[config(env = "AUTHZ_BOOTSTRAP_CLIENT_SECRET", default = "{noop}secret")]
    pub client_secret: String,

    /// Comma-separated client authentication methods (default: client_secret_basic)
    #[config(
        env = "AUTHZ_BOOTSTRAP_AUTHENTICATION_METHODS",
        default = "client_secret_basic"
    )]
    pub authentication_methods: String,

    /// Comma-separated grant types
    /// (default: authorization_code,refresh_token,client_credentials)
    #[config(
        env = "AUTHZ_BOOTSTRAP_GRANT_TYPES",
        default = "authorization_code,refresh_token,client_credentials"
    )]
    pub grant_types: String,

    /// Comma-separated redirect URIs
    #[config(
        env = "AUTHZ_BOOTSTRAP_REDIRECT_URIS",
        default = "http://127.0.0.1:8080/login/oauth2/code/messaging-client-oidc,http://127.0.0.1:8080/authorized"
    )]
    pub redirect_uris: String,

    /// Comma-separated scopes (default: openid,profile,message.read,message.write)
    #[config(
        env = "AUTHZ_BOOTSTRAP_SCOPES",
        default = "openid,profile,message.read,message.write"
    )]
    pub scopes: String,

    /// Whether the client requires end-user consent (default: true)
    #[config(env = "AUTHZ_BOOTSTRAP_REQUIRE_CONSENT", default = true)]
    pub require_consent: bool,
}

impl BootstrapConfig {
    /// Builds the registration described by this configuration
    pub fn registration(&self) -> Result<ClientRegistration, String> {
        let mut registration = ClientRegistration::new(&self.client_id, &self.client_secret)
            .require_consent(self.require_consent);

        for method in split_list(&self.authentication_methods) {
            registration = registration.authentication_method(
                method.parse::<ClientAuthenticationMethod>()?,
            );
        }
        for grant_type in split_list(&self.grant_types) {
            let grant_type = grant_type
                .parse::<GrantType>()
                .map_err(|e| format!("invalid bootstrap grant type: {e}"))?;
            registration = registration.grant_type(grant_type);
        }
        for redirect_uri in split_list(&self.redirect_uris) {
            registration = registration.redirect_uri(redirect_uri);
        }
        for scope in split_list(&self.scopes) {
            registration = registration.scope(scope);
        }
        Ok(registration)
    }
}

/// Splits a comma-separated list, dropping blank entries
fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}
