//! The HTTP transport seam.
//!
//! The engine only ever talks to a [`Transport`]: one call sends one request
//! and reports the observed status code. Every HTTP status, 4xx and 5xx
//! included, is a normal `Ok` return; a [`TransportError`] is reserved for
//! connection-level faults. Tests substitute stub transports through the same
//! trait.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use thiserror::Error;

use crate::proxy::ProxyEndpoint;

/// HTTP method issued by the engine. Workers alternate between the two.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// An HTTP GET request without a body.
    Get,
    /// An HTTP POST request carrying a JSON body.
    Post,
}

impl Method {
    /// The method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A connection-level failure; response statuses never end up here.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// TCP connect (or TLS handshake) to the target or proxy failed.
    #[error("connection failed: {0}")]
    Connect(reqwest::Error),

    /// Any other fault below the HTTP layer, including DNS resolution errors.
    #[error("transport failure: {0}")]
    Other(reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err)
        } else {
            Self::Other(err)
        }
    }
}

/// A transport shared by all workers of a run.
pub type SharedTransport = std::sync::Arc<dyn Transport>;

/// Sends one request and reports the observed HTTP status.
#[async_trait::async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Sends one request with the given identity, optionally through a proxy.
    async fn send(
        &self,
        method: Method,
        headers: &[(&'static str, String)],
        body: Option<&serde_json::Value>,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<u16, TransportError>;
}

/// The reqwest-backed production transport.
///
/// reqwest binds proxies to clients, not to requests, so one client is built
/// per configured proxy endpoint up front, plus a direct client for runs
/// without proxying. The per-request timeout is fixed for the whole run and
/// baked into every client.
#[derive(Debug)]
pub struct HttpTransport {
    target: String,
    direct: reqwest::Client,
    proxied: HashMap<ProxyEndpoint, reqwest::Client>,
}

impl HttpTransport {
    /// Builds the client set for a run against `target`.
    pub fn new(
        target: &str,
        timeout: Duration,
        proxies: &[ProxyEndpoint],
    ) -> anyhow::Result<Self> {
        let direct = Self::client(timeout, None)?;

        let mut proxied = HashMap::with_capacity(proxies.len());
        for endpoint in proxies {
            proxied.insert(endpoint.clone(), Self::client(timeout, Some(endpoint))?);
        }

        Ok(Self {
            target: target.to_owned(),
            direct,
            proxied,
        })
    }

    fn client(
        timeout: Duration,
        proxy: Option<&ProxyEndpoint>,
    ) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(endpoint) = proxy {
            let mut proxy = reqwest::Proxy::all(endpoint.to_string())?;
            if let (Some(username), Some(password)) = (&endpoint.username, &endpoint.password) {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        headers: &[(&'static str, String)],
        body: Option<&serde_json::Value>,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<u16, TransportError> {
        let client = proxy
            .and_then(|endpoint| self.proxied.get(endpoint))
            .unwrap_or(&self.direct);

        let mut request = match method {
            Method::Get => client.get(&self.target),
            Method::Post => client.post(&self.target),
        };
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Ok(response.status().as_u16())
    }
}
