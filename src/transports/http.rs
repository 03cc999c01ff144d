//! HTTP transport implementation using `reqwest`.
//!
//! [`HttpTransport`] talks JSON to the user API of an XL Spaceship instance.
//! Non-2xx responses are surfaced as [`RequestError::Status`] with the raw body,
//! which for the fire endpoint carries the reason the salvo was refused.
//! A 2xx fire reply is always an accepted salvo: an empty or unrecognised body
//! yields an empty [`SalvoReport`].
//!
//! # Feature gate
//!
//! This module is only available when the `transport-http` feature is enabled
//! (it is enabled by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::RequestError;
use crate::protocol::{FireRequest, GameState, NewGameRequest, SalvoReport, WhoAmIResponse};
use crate::transport::Transport;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_PATH: &str = "xl-spaceship/user";

/// A [`Transport`] backed by a `reqwest` HTTP client.
///
/// ```rust,no_run
/// # fn example() -> Result<(), xlspaceship_client::error::RequestError> {
/// use xlspaceship_client::HttpTransport;
///
/// let transport = HttpTransport::new("http://localhost:8080")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the instance at `base_url`, using
    /// [`DEFAULT_REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RequestError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Network`] if the HTTP client cannot be built.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::from_client(client, base_url))
    }

    /// Wrap an existing client, e.g. one configured with a proxy.
    pub fn from_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = if path.is_empty() {
            format!("{}/{USER_PATH}", self.base_url)
        } else {
            format!("{}/{USER_PATH}/{path}", self.base_url)
        };
        debug!(%method, %url, "http request");
        self.client.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RequestError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RequestError> {
    let body = read_success(response).await?;
    Ok(serde_json::from_str(&body)?)
}

async fn read_report(response: Response) -> Result<SalvoReport, RequestError> {
    let body = read_success(response).await?;
    if body.trim().is_empty() {
        return Ok(SalvoReport::default());
    }
    match serde_json::from_str(&body) {
        Ok(report) => Ok(report),
        Err(e) => {
            debug!("unrecognised fire response body: {e}");
            Ok(SalvoReport::default())
        }
    }
}

/// Body of a 2xx response, or [`RequestError::Status`].
async fn read_success(response: Response) -> Result<String, RequestError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RequestError::Network(e.to_string()))?;

    if !status.is_success() {
        return Err(RequestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn whoami(&self) -> Result<WhoAmIResponse, RequestError> {
        self.send(self.request(Method::GET, "")).await
    }

    async fn new_game(&self, req: &NewGameRequest) -> Result<GameState, RequestError> {
        self.send(self.request(Method::POST, "game/new").json(req))
            .await
    }

    async fn game_status(&self, game_id: &str) -> Result<GameState, RequestError> {
        self.send(self.request(Method::GET, &format!("game/{game_id}")))
            .await
    }

    async fn fire(&self, game_id: &str, req: &FireRequest) -> Result<SalvoReport, RequestError> {
        let response = self
            .request(Method::PUT, &format!("game/{game_id}/fire"))
            .json(req)
            .send()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;
        read_report(response).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::salvo::Salvo;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Request line and body of the single request served.
    struct Captured {
        request_line: String,
        body: String,
    }

    /// Serve exactly one HTTP request with the given status and body.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let (head_len, content_length) = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    break (end + 4, content_length);
                }
            };
            while raw.len() < head_len + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            let text = String::from_utf8_lossy(&raw).to_string();
            Captured {
                request_line: text.lines().next().unwrap().to_string(),
                body: text[head_len..].to_string(),
            }
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn whoami_hits_the_user_route() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"user_id":"player-1","full_name":"Player One","games":["match-1"]}"#,
        )
        .await;
        let transport = HttpTransport::new(format!("{url}/")).unwrap();

        let res = transport.whoami().await.unwrap();
        assert_eq!(res.user_id, "player-1");
        assert_eq!(res.games, vec!["match-1"]);
        assert_eq!(
            server.await.unwrap().request_line,
            "GET /xl-spaceship/user HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn fire_sends_the_salvo() {
        let (url, server) = serve_once("200 OK", r#"{"salvo":{"0x0":"miss"}}"#).await;
        let transport = HttpTransport::new(url).unwrap();
        let req = FireRequest {
            salvo: Salvo::from_shots(&["0x0"]).unwrap(),
        };

        let report = transport.fire("match-1", &req).await.unwrap();
        assert_eq!(report.hits(), 0);

        let captured = server.await.unwrap();
        assert_eq!(
            captured.request_line,
            "PUT /xl-spaceship/user/game/match-1/fire HTTP/1.1"
        );
        assert_eq!(captured.body, r#"{"salvo":["0x0"]}"#);
    }

    #[tokio::test]
    async fn empty_fire_reply_is_an_accepted_salvo() {
        let (url, _server) = serve_once("200 OK", "").await;
        let transport = HttpTransport::new(url).unwrap();
        let req = FireRequest {
            salvo: Salvo::from_shots(&["0x0"]).unwrap(),
        };

        let report = transport.fire("match-1", &req).await.unwrap();
        assert!(report.salvo.is_empty());
    }

    #[tokio::test]
    async fn unrecognised_fire_reply_is_an_accepted_salvo() {
        let (url, _server) = serve_once("200 OK", r#""accepted""#).await;
        let transport = HttpTransport::new(url).unwrap();
        let req = FireRequest {
            salvo: Salvo::from_shots(&["0x0"]).unwrap(),
        };

        let report = transport.fire("match-1", &req).await.unwrap();
        assert_eq!(report.hits(), 0);
    }

    #[tokio::test]
    async fn rejected_fire_keeps_the_reason() {
        let (url, _server) = serve_once("400 Bad Request", "Not your turn").await;
        let transport = HttpTransport::new(url).unwrap();
        let req = FireRequest {
            salvo: Salvo::from_shots(&["0x0"]).unwrap(),
        };

        let err = transport.fire("match-1", &req).await.unwrap_err();
        assert!(matches!(err, RequestError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn error_status_keeps_the_body() {
        let (url, _server) = serve_once("400 Bad Request", "Not your turn").await;
        let transport = HttpTransport::new(url).unwrap();

        let err = transport.game_status("match-1").await.unwrap_err();
        assert_eq!(
            err,
            RequestError::Status {
                status: 400,
                body: "Not your turn".into(),
            }
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let (url, _server) = serve_once("200 OK", r#"{"game_id":"match-1"}"#).await;
        let transport = HttpTransport::new(url).unwrap();

        let err = transport.game_status("match-1").await.unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let transport = HttpTransport::new(format!("http://{addr}")).unwrap();

        let err = transport.whoami().await.unwrap_err();
        assert!(matches!(err, RequestError::Network(_)));
    }
}
