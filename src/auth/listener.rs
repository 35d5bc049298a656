//! Loopback HTTP listener for the authorization redirect
//!
//! Captures the single redirect the accounts service issues after user
//! consent. Requests for any other path (browser favicon probes and the
//! like) get a 404 and the wait continues. The socket is released when the
//! listener is dropped, on every exit path.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use super::error::AuthError;

/// Query parameters extracted from the redirect.
#[derive(Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

/// The browser connection that delivered the redirect. Consumed by writing
/// exactly one response page back to it.
#[derive(Debug)]
pub struct CallbackConnection {
    stream: TcpStream,
}

impl CallbackListener {
    /// Bind on the redirect URI's host and port.
    pub async fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::RedirectUri(format!("{redirect_uri}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| AuthError::RedirectUri(format!("{redirect_uri}: missing host")))?;
        let port = url
            .port()
            .ok_or_else(|| AuthError::RedirectUri(format!("{redirect_uri}: missing port")))?;

        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AuthError::ListenerBind {
                addr: addr.clone(),
                source,
            })?;

        tracing::debug!("Callback listener bound on {}", addr);
        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    /// Actual bound address (resolves port 0 in tests).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for one request on the redirect path. The wait is bounded:
    /// expiry yields `AuthorizationTimedOut` and the caller's drop of the
    /// listener releases the port.
    pub async fn recv(
        &self,
        timeout: Duration,
    ) -> Result<(CallbackParams, CallbackConnection), AuthError> {
        tokio::time::timeout(timeout, self.accept_redirect())
            .await
            .map_err(|_| AuthError::AuthorizationTimedOut(timeout.as_secs()))?
    }

    async fn accept_redirect(&self) -> Result<(CallbackParams, CallbackConnection), AuthError> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            let mut buf = vec![0u8; 16 * 1024];
            // Browsers open speculative connections and may reset them
            // without sending anything; that must not abort the wait.
            let n = match stream.read(&mut buf).await {
                Ok(n) => n,
                Err(err) => {
                    tracing::debug!("Connection from {} dropped before a request: {}", peer, err);
                    continue;
                }
            };
            if n == 0 {
                continue;
            }

            let request = String::from_utf8_lossy(&buf[..n]);
            let Some(target) = request_target(&request) else {
                tracing::debug!("Malformed request from {}, ignoring", peer);
                dismiss(&mut stream, peer, "400 Bad Request", "Malformed request.").await;
                continue;
            };

            let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
                dismiss(&mut stream, peer, "400 Bad Request", "Malformed request target.").await;
                continue;
            };

            if url.path() != self.path {
                tracing::debug!("Ignoring request for {} from {}", url.path(), peer);
                dismiss(&mut stream, peer, "404 Not Found", "Not found.").await;
                continue;
            }

            let mut params = CallbackParams::default();
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "code" => params.code = Some(value.into_owned()),
                    "state" => params.state = Some(value.into_owned()),
                    "error" => params.error = Some(value.into_owned()),
                    "error_description" => params.error_description = Some(value.into_owned()),
                    _ => {}
                }
            }

            return Ok((params, CallbackConnection { stream }));
        }
    }
}

impl CallbackConnection {
    /// Tell the browser the handshake succeeded and close the connection.
    pub async fn respond_ok(mut self, message: &str) -> Result<(), AuthError> {
        respond(&mut self.stream, "200 OK", message).await
    }

    /// Tell the browser the handshake failed and close the connection.
    pub async fn respond_err(mut self, message: &str) -> Result<(), AuthError> {
        respond(&mut self.stream, "400 Bad Request", message).await
    }
}

/// Request target from the first line of a raw HTTP/1.1 request.
fn request_target(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let _method = parts.next()?;
    parts.next()
}

/// Answer a stray connection. A write failure here only means the peer went
/// away early, so it is logged rather than surfaced.
async fn dismiss(stream: &mut TcpStream, peer: SocketAddr, status: &str, message: &str) {
    if let Err(err) = respond(stream, status, message).await {
        tracing::debug!("Failed to answer stray connection from {}: {}", peer, err);
    }
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) -> Result<(), AuthError> {
    let body = format!(
        "<!DOCTYPE html><html><head><title>spotify-cli</title></head>\
         <body><p>{message}</p><p>You may close this tab and return to the terminal.</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send_request(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn delivers_redirect_params_and_success_page() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(send_request(addr, "/callback?code=abc123&state=xyz"));

        let (params, conn) = listener.recv(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());

        conn.respond_ok("Authorization complete.").await.unwrap();
        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Authorization complete."));
    }

    #[tokio::test]
    async fn captures_provider_error_params() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(send_request(
            addr,
            "/callback?error=access_denied&error_description=User%20denied&state=s1",
        ));

        let (params, conn) = listener.recv(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User denied"));

        conn.respond_err("Authorization failed.").await.unwrap();
        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[tokio::test]
    async fn unrelated_paths_get_404_and_the_wait_continues() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stray = send_request(addr, "/favicon.ico").await;
            assert!(stray.starts_with("HTTP/1.1 404 Not Found"));
            send_request(addr, "/callback?code=c&state=s").await
        });

        let (params, conn) = listener.recv(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("c"));
        conn.respond_ok("done").await.unwrap();
        client.await.unwrap();
    }

    #[tokio::test]
    async fn reset_connections_do_not_abort_the_wait() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            // A speculative browser connection that resets without ever
            // sending a request.
            let early = TcpStream::connect(addr).await.unwrap();
            early.set_linger(Some(Duration::from_secs(0))).unwrap();
            drop(early);
            send_request(addr, "/callback?code=c&state=s").await
        });

        let (params, conn) = listener.recv(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("c"));
        conn.respond_ok("done").await.unwrap();
        client.await.unwrap();
    }

    #[tokio::test]
    async fn times_out_when_no_redirect_arrives() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let err = listener.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationTimedOut(_)));
    }

    #[tokio::test]
    async fn bind_fails_when_port_is_taken() {
        let first = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let err = CallbackListener::bind(&format!("http://127.0.0.1:{port}/callback"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ListenerBind { .. }));
    }

    #[tokio::test]
    async fn drop_releases_the_port() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        CallbackListener::bind(&format!("http://127.0.0.1:{port}/callback"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn redirect_uri_without_port_is_rejected() {
        let err = CallbackListener::bind("http://127.0.0.1/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RedirectUri(_)));
    }
}
