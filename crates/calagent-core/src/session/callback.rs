//! OAuth redirect handling.
//!
//! The backend finishes the provider dance and redirects to the client origin
//! with `?token=<jwt>`. The token must not linger in anything the user can see
//! afterwards, so every extraction also yields a scrubbed URL.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Query parameter carrying the bearer token on the redirect.
pub const TOKEN_PARAM: &str = "token";

/// Token pulled out of a redirect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
    pub token: String,
    /// The redirect URL with every `token` parameter removed.
    pub scrubbed_url: Url,
}

/// Extracts the token from a redirect URL.
///
/// Returns `None` when the URL has no non-empty `token` parameter. Other query
/// parameters are preserved in `scrubbed_url`.
pub fn take_token(url: &Url) -> Option<CallbackToken> {
    let token = url
        .query_pairs()
        .find(|(k, v)| k == TOKEN_PARAM && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())?;

    Some(CallbackToken {
        token,
        scrubbed_url: scrub_token(url),
    })
}

/// Returns `url` without any `token` query parameter.
pub fn scrub_token(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut scrubbed = url.clone();
    if kept.is_empty() {
        scrubbed.set_query(None);
    } else {
        scrubbed.query_pairs_mut().clear().extend_pairs(kept);
    }
    scrubbed
}

/// Parses pasted callback input into a token.
///
/// Accepts a full redirect URL, a bare query string (`token=...`), or the
/// token itself.
pub fn parse_callback_input(input: &str) -> Option<String> {
    let value = input.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(value) {
        return take_token(&url).map(|cb| cb.token);
    }

    let query = value.trim_start_matches('?');
    if query.contains("token=") {
        return url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, v)| k == TOKEN_PARAM && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string());
    }

    if value.chars().any(char::is_whitespace) {
        return None;
    }

    Some(value.to_string())
}

/// Localhost listener that receives the OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Binds `127.0.0.1:<port>`; port 0 picks a free port.
    ///
    /// # Errors
    /// Returns an error if the port cannot be bound.
    pub async fn bind(port: u16, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to bind callback listener on 127.0.0.1:{port}"))?;
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Self { listener, path })
    }

    /// Returns the bound port.
    ///
    /// # Errors
    /// Returns an error if the socket address cannot be read.
    pub fn port(&self) -> Result<u16> {
        Ok(self
            .listener
            .local_addr()
            .context("Failed to read callback listener address")?
            .port())
    }

    /// Returns the URL the backend should redirect to.
    pub fn redirect_uri(&self) -> Result<String> {
        Ok(format!("http://localhost:{}{}", self.port()?, self.path))
    }

    /// Waits for a redirect carrying a token.
    ///
    /// Requests for other paths (favicons, probes) are answered with 404 and
    /// ignored. Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    /// Returns an error if accepting connections fails.
    pub async fn wait_for_token(&self, timeout: Duration) -> Result<Option<CallbackToken>> {
        match tokio::time::timeout(timeout, self.accept_loop()).await {
            Ok(result) => result.map(Some),
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "login callback timed out");
                Ok(None)
            }
        }
    }

    async fn accept_loop(&self) -> Result<CallbackToken> {
        loop {
            let (mut stream, peer) = self
                .listener
                .accept()
                .await
                .context("Failed to accept callback connection")?;

            let mut buffer = [0u8; 4096];
            let read = match stream.read(&mut buffer).await {
                Ok(n) => n,
                Err(err) => {
                    tracing::debug!(%peer, error = %err, "failed to read callback request");
                    continue;
                }
            };
            let request = String::from_utf8_lossy(&buffer[..read]);

            let outcome = match request_target(&request) {
                Some(url) if url.path() == self.path => take_token(&url),
                _ => {
                    let _ = stream.write_all(not_found_response().as_bytes()).await;
                    continue;
                }
            };

            let response = if outcome.is_some() {
                success_response()
            } else {
                error_response()
            };
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;

            if let Some(callback) = outcome {
                return Ok(callback);
            }
        }
    }
}

fn request_target(request: &str) -> Option<Url> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    Url::parse(&format!("http://localhost{target}")).ok()
}

fn html_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn success_response() -> String {
    html_response(
        "200 OK",
        "<html><body><h3>Login complete</h3><p>You can close this window.</p></body></html>",
    )
}

fn error_response() -> String {
    html_response(
        "400 Bad Request",
        "<html><body><h3>Login failed</h3><p>No token was returned. Please try again.</p></body></html>",
    )
}

fn not_found_response() -> String {
    html_response("404 Not Found", "<html><body>Not found</body></html>")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: token is extracted and removed from the visible URL.
    #[test]
    fn test_take_token_scrubs_url() {
        let url = Url::parse("http://localhost:5173/login?token=abc.def.ghi").unwrap();
        let cb = take_token(&url).unwrap();

        assert_eq!(cb.token, "abc.def.ghi");
        assert_eq!(cb.scrubbed_url.as_str(), "http://localhost:5173/login");
        assert!(!cb.scrubbed_url.as_str().contains("token"));
    }

    /// Test: unrelated parameters survive scrubbing.
    #[test]
    fn test_take_token_keeps_other_params() {
        let url =
            Url::parse("http://localhost:5173/?utm_source=mail&token=t1&token=t2#top").unwrap();
        let cb = take_token(&url).unwrap();

        assert_eq!(cb.token, "t1");
        assert_eq!(cb.scrubbed_url.query(), Some("utm_source=mail"));
        assert_eq!(cb.scrubbed_url.fragment(), Some("top"));
    }

    /// Test: missing or empty token yields nothing.
    #[test]
    fn test_take_token_missing() {
        let url = Url::parse("http://localhost:5173/?error=access_denied").unwrap();
        assert!(take_token(&url).is_none());

        let url = Url::parse("http://localhost:5173/?token=").unwrap();
        assert!(take_token(&url).is_none());
    }

    /// Test: pasted input forms.
    #[test]
    fn test_parse_callback_input() {
        assert_eq!(
            parse_callback_input("http://localhost:5173/?token=a.b.c").as_deref(),
            Some("a.b.c")
        );
        assert_eq!(
            parse_callback_input("?token=a.b.c&x=1").as_deref(),
            Some("a.b.c")
        );
        assert_eq!(parse_callback_input("  a.b.c \n").as_deref(), Some("a.b.c"));
        assert_eq!(parse_callback_input("http://localhost:5173/"), None);
        assert_eq!(parse_callback_input("not a token"), None);
        assert_eq!(parse_callback_input("   "), None);
    }

    /// Test: request line parsing.
    #[test]
    fn test_request_target() {
        let url = request_target("GET /?token=x HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        assert_eq!(url.path(), "/");
        assert!(request_target("").is_none());
    }

    /// Test: the listener hands back the token from a real redirect request.
    #[tokio::test]
    async fn test_listener_receives_token() {
        let Ok(listener) = CallbackListener::bind(0, "/callback").await else {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        };
        let port = listener.port().unwrap();
        assert_eq!(
            listener.redirect_uri().unwrap(),
            format!("http://localhost:{port}/callback")
        );

        let client = tokio::spawn(async move {
            let http = reqwest::Client::new();
            let miss = http
                .get(format!("http://127.0.0.1:{port}/favicon.ico"))
                .send()
                .await
                .unwrap();
            assert_eq!(miss.status(), reqwest::StatusCode::NOT_FOUND);

            http.get(format!("http://127.0.0.1:{port}/callback?token=abc.def.ghi"))
                .send()
                .await
                .unwrap()
                .status()
        });

        let cb = listener
            .wait_for_token(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cb.token, "abc.def.ghi");
        assert_eq!(cb.scrubbed_url.path(), "/callback");
        assert!(cb.scrubbed_url.query().is_none());
        assert_eq!(client.await.unwrap(), reqwest::StatusCode::OK);
    }

    /// Test: waiting gives up after the timeout.
    #[tokio::test]
    async fn test_listener_times_out() {
        let Ok(listener) = CallbackListener::bind(0, "/").await else {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        };
        let result = listener
            .wait_for_token(Duration::from_millis(50))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
