//! OAuth2 authorization-code flow with PKCE for the Spotify accounts service
//!
//! The token lifecycle: return the cached record while it is fresh, refresh
//! it through the accounts token endpoint when it is stale, and fall back to
//! a full browser handshake when no refresh token exists or the refresh
//! fails. A new record is persisted after every successful exchange, never
//! on a partial failure.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use super::error::AuthError;
use super::listener::{CallbackListener, CallbackParams};
use super::pkce;
use super::tokens::{TokenRecord, TokenStore};
use super::OAuthSettings;

pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// How long to wait for the browser redirect before giving up.
const DEFAULT_CALLBACK_WAIT: Duration = Duration::from_secs(300);

/// Token endpoint response. `expires_in` is relative; the absolute
/// `expires_at` is stamped locally when the record is built.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Which path produced the token. Logged so the refresh-failure fallback is
/// observable rather than silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPath {
    Cached,
    Refreshed,
    Authorized,
}

pub struct TokenManager {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    accounts_base: String,
    callback_wait: Duration,
    open_browser: bool,
    store: Box<dyn TokenStore>,
    http: reqwest::Client,
}

impl TokenManager {
    pub fn new(settings: OAuthSettings, store: Box<dyn TokenStore>) -> Self {
        Self {
            client_id: settings.client_id,
            redirect_uri: settings.redirect_uri,
            scopes: settings.scopes,
            accounts_base: DEFAULT_ACCOUNTS_BASE.to_string(),
            callback_wait: DEFAULT_CALLBACK_WAIT,
            open_browser: true,
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Point at a different accounts service (tests).
    pub fn with_accounts_base(mut self, base: impl Into<String>) -> Self {
        self.accounts_base = base.into();
        self
    }

    pub fn with_callback_wait(mut self, wait: Duration) -> Self {
        self.callback_wait = wait;
        self
    }

    /// Disable the best-effort browser launch; the URL is always printed.
    pub fn with_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    /// Resolve a usable bearer token, running whichever lifecycle path is
    /// needed.
    pub async fn get_valid_token(&self) -> Result<TokenRecord> {
        let (record, _) = self.resolve().await?;
        Ok(record)
    }

    /// Like [`Self::get_valid_token`], also reporting which path was taken.
    pub async fn resolve(&self) -> Result<(TokenRecord, TokenPath)> {
        let cached = self
            .store
            .load()
            .context("Failed to load cached token record")?;

        if let Some(record) = &cached {
            // The cache shortcut needs both a refresh token and a real
            // expiry; otherwise the record cannot be kept alive and a full
            // handshake is due anyway once it lapses.
            if record.refresh_token.is_some() && record.expires_at != 0 && record.is_fresh() {
                tracing::debug!("Cached access token still fresh, no network call");
                return Ok((record.clone(), TokenPath::Cached));
            }
        }

        if let Some(refresh_token) = cached.as_ref().and_then(|r| r.refresh_token.clone()) {
            tracing::info!("Access token stale, refreshing...");
            match self.refresh(&refresh_token).await {
                Ok(record) => return Ok((record, TokenPath::Refreshed)),
                // Deliberate policy: any refresh failure falls through to a
                // full re-authorization instead of surfacing the error.
                Err(e) => {
                    tracing::warn!("Refresh failed, falling back to full authorization: {:#}", e);
                }
            }
        } else {
            tracing::info!("No cached refresh token, full authorization required");
        }

        let record = self.authorize().await?;
        Ok((record, TokenPath::Authorized))
    }

    /// Mint a new access token from a refresh token and persist the result.
    /// The prior refresh token is carried forward unless the response
    /// supplies a replacement.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        let response = self
            .http
            .post(self.token_endpoint())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .context("Refresh request to the token endpoint failed")?;

        let token = parse_token_response(response).await?;
        let record = build_record(token, Some(refresh_token.to_string()));
        self.store
            .save(&record)
            .context("Failed to persist refreshed token record")?;

        tracing::info!("Access token refreshed");
        Ok(record)
    }

    /// Full PKCE handshake: send the user to the authorization URL, capture
    /// the redirect on a loopback listener, validate it, and exchange the
    /// code. The listener is released on every exit path by drop.
    async fn authorize(&self) -> Result<TokenRecord> {
        let verifier = pkce::generate_verifier();
        let challenge = pkce::challenge(&verifier);
        let state = pkce::generate_state();

        let listener = CallbackListener::bind(&self.redirect_uri).await?;
        let auth_url = self.authorization_url(&challenge, &state)?;

        println!();
        println!("Open this URL in your browser to authorize:");
        println!("  {auth_url}");
        println!();
        if self.open_browser {
            if let Err(e) = open_in_browser(auth_url.as_str()) {
                tracing::debug!("Could not launch browser ({}), use the printed URL", e);
            }
        }

        tracing::info!("Waiting for the authorization redirect...");
        let (params, conn) = listener.recv(self.callback_wait).await?;

        let code = match validate_callback(params, &state) {
            Ok(code) => {
                conn.respond_ok("Authorization complete.").await?;
                code
            }
            Err(e) => {
                conn.respond_err("Authorization failed.").await?;
                return Err(e.into());
            }
        };

        let response = self
            .http
            .post(self.token_endpoint())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("code_verifier", verifier.as_str()),
            ])
            .send()
            .await
            .context("Code exchange request to the token endpoint failed")?;

        let token = parse_token_response(response).await?;
        let record = build_record(token, None);
        self.store
            .save(&record)
            .context("Failed to persist token record")?;

        tracing::info!("Authorization complete");
        Ok(record)
    }

    fn token_endpoint(&self) -> String {
        format!("{}/api/token", self.accounts_base)
    }

    /// Authorization URL with all query values percent-encoded.
    fn authorization_url(&self, challenge: &str, state: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/authorize", self.accounts_base))
            .context("Invalid accounts service base URL")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", challenge)
            .append_pair("state", state)
            .append_pair("scope", &self.scopes.join(" "));
        Ok(url)
    }
}

/// Check the callback before any token exchange: the state must match this
/// session, and a provider error aborts the flow with its message attached.
fn validate_callback(params: CallbackParams, expected_state: &str) -> Result<String, AuthError> {
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or_default();
        return Err(AuthError::Authorization(
            format!("{error} {detail}").trim().to_string(),
        ));
    }
    params
        .code
        .ok_or_else(|| AuthError::Authorization("callback carried no authorization code".into()))
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Token {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    response
        .json::<TokenResponse>()
        .await
        .context("Failed to parse token endpoint response")
}

fn build_record(token: TokenResponse, prior_refresh: Option<String>) -> TokenRecord {
    let refresh_token = token.refresh_token.or(prior_refresh);
    TokenRecord::issued_now(
        token.access_token,
        token.token_type,
        token.scope,
        token.expires_in,
        refresh_token,
    )
}

/// Interactive login. A fresh cached token is left alone unless `force`,
/// which discards the cache so the full handshake runs.
pub async fn login(config: &crate::config::Config, force: bool, timeout_secs: u64) -> Result<()> {
    let store = config.token_store()?;

    if force {
        store.clear().context("Failed to discard cached tokens")?;
    } else if let Some(record) = store.load()? {
        if record.refresh_token.is_some() && record.is_fresh() {
            println!("Already logged in (access token valid). Use --force to re-authenticate.");
            return Ok(());
        }
    }

    let manager = TokenManager::new(config.oauth_settings()?, Box::new(store))
        .with_callback_wait(Duration::from_secs(timeout_secs));
    let (_, path) = manager.resolve().await?;
    match path {
        TokenPath::Cached => println!("Already logged in."),
        TokenPath::Refreshed => println!("Token refreshed successfully."),
        TokenPath::Authorized => println!("Login successful."),
    }
    Ok(())
}

/// Clear stored credentials.
pub fn logout(config: &crate::config::Config) -> Result<()> {
    config.token_store()?.clear()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status.
pub fn status(config: &crate::config::Config) -> Result<()> {
    use chrono::TimeZone;

    let store = config.token_store()?;
    match store.load()? {
        Some(record) => {
            if record.is_fresh() {
                println!("Access token: valid");
            } else {
                println!("Access token: expired");
            }
            let expiry = chrono::Local
                .timestamp_opt(record.expires_at as i64, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| record.expires_at.to_string());
            println!("  expires_at: {}", expiry);

            match record.refresh_token {
                Some(_) => println!("Refresh tok:  present"),
                None => println!("Refresh tok:  none"),
            }
            println!("Scopes:       {}", record.scope);
        }
        None => {
            println!("Access token: none");
            println!();
            println!("Run 'spotify-cli login' to authenticate.");
        }
    }
    Ok(())
}

fn open_in_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut cmd = {
        let mut c = std::process::Command::new("open");
        c.arg(url);
        c
    };
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let mut cmd = {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(url);
        c
    };

    cmd.spawn().map(|_| ())
}
