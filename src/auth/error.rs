//! Error taxonomy for the OAuth flow

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Local callback port already in use, or otherwise not bindable.
    #[error("failed to bind callback listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The redirect URI could not be parsed into a bindable address.
    #[error("invalid redirect URI: {0}")]
    RedirectUri(String),

    /// No authorization redirect arrived within the configured wait.
    #[error("authorization timed out after {0}s waiting for the redirect")]
    AuthorizationTimedOut(u64),

    /// Callback `state` did not match the value generated for this session.
    /// Possible CSRF or response injection; the token exchange never runs.
    #[error("state parameter on the callback did not match this session")]
    StateMismatch,

    /// The provider rejected the authorization request (e.g. consent denied).
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Token endpoint returned a non-success status.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Token { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
