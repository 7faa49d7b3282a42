//! JSON-over-HTTP transport backed by reqwest.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::Transport;
use crate::error::{Error, Result, TransportError};

/// One HTTP call relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpTransport {
    /// Build a transport. `timeout` bounds each call end to end.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    type Descriptor = HttpRequest;
    type Output = serde_json::Value;

    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = std::result::Result<serde_json::Value, TransportError>> + Send {
        let url = self.url(&request.path);
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.client.request(request.method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        async move {
            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Failed(format!("request failed: {e}")))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Failed(format!("failed to read body: {e}")))?;

            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }
            if text.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            serde_json::from_str(&text)
                .map_err(|e| TransportError::Failed(format!("invalid JSON body: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_doubled_slashes() {
        let transport =
            HttpTransport::new("https://api.example.com/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.url("/v1/orders"), "https://api.example.com/v1/orders");
        assert_eq!(transport.url("v1/orders"), "https://api.example.com/v1/orders");
    }
}
