//! Authentication module for the Spotify Web API
//!
//! Implements the OAuth2 authorization-code flow with PKCE: a loopback
//! listener captures the browser redirect, and the token manager keeps the
//! persisted record alive via refresh, falling back to a full handshake
//! when it cannot.

pub mod error;
pub mod listener;
pub mod oauth;
pub mod pkce;
pub mod tokens;

pub use oauth::{login, logout, status, TokenManager};
pub use tokens::FileTokenStore;

/// OAuth application settings, passed in at construction time rather than
/// read from ambient constants.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// OAuth2 client ID of the registered application (public client)
    pub client_id: String,
    /// Loopback redirect URI registered for the application
    pub redirect_uri: String,
    /// Scopes to request (space-joined on the wire)
    pub scopes: Vec<String>,
}
