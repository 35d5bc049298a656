//! Authenticated HTTP client for the Spotify Web API
//!
//! Wraps reqwest::Client with bearer-token injection. A fresh token is
//! resolved through the token manager on every call, so expiry and refresh
//! are handled transparently mid-session.

use anyhow::{bail, Context, Result};
use reqwest::Method;

use crate::auth::TokenManager;
use crate::config::Config;

const API_BASE: &str = "https://api.spotify.com/v1";

pub struct SpotifyClient {
    http: reqwest::Client,
    manager: TokenManager,
    api_base: String,
}

impl SpotifyClient {
    /// Build a client from config; the file-backed token store is wired in.
    pub fn new(config: &Config) -> Result<Self> {
        let manager = TokenManager::new(config.oauth_settings()?, Box::new(config.token_store()?));
        Ok(Self {
            http: reqwest::Client::new(),
            manager,
            api_base: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn for_test(manager: TokenManager, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            manager,
            api_base,
        }
    }

    /// Issue a bearer-authenticated request against the resource API.
    /// `path` is joined onto the versioned API base; query pairs are
    /// URL-encoded; a body, when given, is sent as JSON.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let record = self.manager.get_valid_token().await?;
        let url = format!("{}{}", self.api_base, path);
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&record.access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        check_response(resp, &url).await
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        self.request(Method::GET, path, &[], None).await
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Token may be invalid -- run 'spotify-cli login'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::{now_epoch, MemoryTokenStore, TokenRecord};
    use crate::auth::OAuthSettings;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fresh_record() -> TokenRecord {
        TokenRecord {
            access_token: "bearer-at".to_string(),
            token_type: "Bearer".to_string(),
            scope: String::new(),
            refresh_token: Some("rt".to_string()),
            expires_in: 3600,
            expires_at: now_epoch() + 3600,
        }
    }

    fn manager_with_fresh_token() -> TokenManager {
        let settings = OAuthSettings {
            client_id: "c".to_string(),
            redirect_uri: "http://127.0.0.1:1/callback".to_string(),
            scopes: vec![],
        };
        TokenManager::new(
            settings,
            Box::new(MemoryTokenStore::new(Some(fresh_record()))),
        )
        .with_accounts_base("http://127.0.0.1:1")
        .with_browser(false)
    }

    #[tokio::test]
    async fn request_sends_bearer_header_and_query() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // Headers only; these requests carry no body.
            while !String::from_utf8_lossy(&buf).contains("\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());

            let body = r#"{"ok":true}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        let client =
            SpotifyClient::for_test(manager_with_fresh_token(), format!("http://{}", addr));
        let resp = client
            .request(
                Method::GET,
                "/me/player",
                &[("market".to_string(), "US".to_string())],
                None,
            )
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let request = rx.await.unwrap();
        assert!(request.starts_with("GET /me/player?market=US"));
        assert!(request.contains("authorization: Bearer bearer-at")
            || request.contains("Authorization: Bearer bearer-at"));
    }

    #[tokio::test]
    async fn non_success_status_is_surfaced_with_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let body = r#"{"error":{"status":404,"message":"Not found."}}"#;
            let response = format!(
                "HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        let client =
            SpotifyClient::for_test(manager_with_fresh_token(), format!("http://{}", addr));
        let err = client.get("/nope").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
    }
}
