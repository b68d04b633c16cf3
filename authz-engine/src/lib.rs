//! # authz-engine
//!
//! Core of an OAuth 2.0 authorization server issuing opaque tokens.
//!
//! ## Components
//!
//! - **Registry:** registered clients, secret verification and client authentication.
//! - **Store:** append-only authorization records with unique credential values,
//!   backed by process memory or Redis.
//! - **Grant validator:** `client_credentials`, `authorization_code` (single use,
//!   PKCE) and `refresh_token` (optional rotation).
//! - **Issuer:** mints credentials and persists them, retrying on collisions.
//! - **Introspection:** RFC 7662 introspection and RFC 7009 revocation.
//! - **Sweeper:** background removal of expired records.
//!
//! [`AuthorizationService`] wires the components together over one [`Store`].

pub mod error;
pub mod grant;
pub mod introspection;
pub mod issuer;
pub mod models;
pub mod pkce;
pub mod registry;
pub mod secret;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod token;

pub use error::{OAuthError, StoreError};
pub use grant::{GrantValidator, TokenRequest, ValidatedGrant};
pub use introspection::{Introspection, IntrospectionService};
pub use issuer::{IssuedTokens, MAX_GENERATION_ATTEMPTS, TokenIssuer, TokenSettings};
pub use models::{
    AuthorizationRecord, ClientAuthenticationMethod, ClientRegistration, GrantType,
    RegisteredClient, TokenKind,
};
pub use registry::{AuthenticatedClient, ClientCredentials, ClientRegistry};
pub use service::{AuthorizationRequest, AuthorizationService, AuthorizeError, ServiceSettings};
pub use store::{ClientStore, RecordStore, Store};
pub use sweeper::ExpirySweeper;
pub use token::{SecureTokenGenerator, TokenGenerator};
