//! HTTP transport seam.
//!
//! [`Transport`] is the only thing the channel knows about the network. The
//! production implementation is [`HttpTransport`] (reqwest); tests drive the
//! channel with scripted transports.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use crate::error::RemoteError;
use crate::message::Outgoing;

/// Path of the long-poll endpoint under the server base URL
pub const ENDPOINT_PATH: &str = "/hsocket/";

/// Raw HTTP answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Request/response transport to the controller.
///
/// A request that exceeds its deadline must fail with [`RemoteError::Timeout`];
/// any other connection-level failure is [`RemoteError::Transport`].
pub trait Transport: Send + Sync + 'static {
    /// Long-poll for the next message.
    fn poll(
        &self,
        sid: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse, RemoteError>> + Send;

    /// Sends form fields to the controller.
    fn send(
        &self,
        sid: Option<&str>,
        message: &Outgoing,
    ) -> impl Future<Output = Result<HttpResponse, RemoteError>> + Send;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    poll_timeout: Duration,
}

impl HttpTransport {
    /// Builds a client for `server_url`.
    ///
    /// `poll_timeout` bounds each long-poll GET; `request_timeout` bounds POSTs.
    pub fn new(
        server_url: &str,
        poll_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(format!("warden/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint_url(server_url),
            poll_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `{server}/hsocket/` without doubled slashes
pub fn endpoint_url(server_url: &str) -> String {
    format!("{}{ENDPOINT_PATH}", server_url.trim_end_matches('/'))
}

fn map_reqwest(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(err.to_string())
    }
}

async fn into_response(response: reqwest::Response) -> Result<HttpResponse, RemoteError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(map_reqwest)?;
    Ok(HttpResponse { status, body })
}

impl Transport for HttpTransport {
    async fn poll(&self, sid: Option<&str>) -> Result<HttpResponse, RemoteError> {
        let mut request = self.client.get(&self.endpoint).timeout(self.poll_timeout);
        if let Some(sid) = sid {
            request = request.query(&[("sid", sid)]);
        }
        let response = request.send().await.map_err(map_reqwest)?;
        into_response(response).await
    }

    async fn send(
        &self,
        sid: Option<&str>,
        message: &Outgoing,
    ) -> Result<HttpResponse, RemoteError> {
        let mut request = self.client.post(&self.endpoint).form(message);
        if let Some(sid) = sid {
            request = request.query(&[("sid", sid)]);
        }
        let response = request.send().await.map_err(map_reqwest)?;
        into_response(response).await
    }
}
