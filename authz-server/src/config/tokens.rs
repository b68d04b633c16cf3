use authz_engine::TokenSettings;
use confique::Config;

/// Lifetimes of issued credentials
#[derive(Debug, Config, Clone)]
pub struct TokensConfig {
    /// Access token lifetime in seconds (default: 300)
    #[config(env = "AUTHZ_TOKENS_ACCESS_TOKEN_TTL", default = 300)]
    pub access_token_ttl: u32,

    /// Refresh token lifetime in seconds (default: 3600)
    #[config(env = "AUTHZ_TOKENS_REFRESH_TOKEN_TTL", default = 3600)]
    pub refresh_token_ttl: u32,

    /// Authorization code lifetime in seconds (default: 300)
    #[config(env = "AUTHZ_TOKENS_AUTHORIZATION_CODE_TTL", default = 300)]
    pub authorization_code_ttl: u32,

    /// Issue a new refresh token on every refresh and retire the old one (default: true)
    #[config(env = "AUTHZ_TOKENS_ROTATE_REFRESH_TOKENS", default = true)]
    pub rotate_refresh_tokens: bool,
}

impl TokensConfig {
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_token_ttl: chrono::Duration::seconds(self.access_token_ttl.into()),
            refresh_token_ttl: chrono::Duration::seconds(self.refresh_token_ttl.into()),
            authorization_code_ttl: chrono::Duration::seconds(self.authorization_code_ttl.into()),
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.access_token_ttl == 0 || self.authorization_code_ttl == 0 {
            return Err("token lifetimes must be greater than zero".to_string());
        }
        if self.refresh_token_ttl == 0 {
            return Err("refresh token lifetime must be greater than zero".to_string());
        }
        Ok(())
    }
}
