//! Transport seam between the endpoint layer and the network.
//!
//! # Design
//! `Transport` executes one `HttpRequest` and hands back the `HttpResponse`
//! as data, whatever its status. Only failures that produce no response at
//! all become errors (`ApiError::Network`).
//!
//! Credentials are attached by `CredentialedTransport`, a decorator every
//! request issued by `ApiService` passes through. It is applied
//! unconditionally; individual calls cannot opt out.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument};

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response, including non-2xx ones.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).send(request).await
    }
}

/// Headers that authenticate the caller to the server.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    headers: Vec<(String, String)>,
}

impl Credentials {
    pub fn none() -> Self {
        Self::default()
    }

    /// A session cookie header value, e.g. `session=abc; csrftoken=xyz`.
    pub fn cookie(cookie: impl Into<String>) -> Self {
        Self::none().with_header("cookie", cookie)
    }

    pub fn bearer(token: &str) -> Self {
        Self::none().with_header("authorization", format!("Bearer {token}"))
    }

    /// The server rejects state-changing requests without a CSRF token that
    /// matches the session cookie.
    pub fn with_csrf_token(self, token: impl Into<String>) -> Self {
        self.with_header("x-csrftoken", token)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value.into()));
        self
    }

    /// Set every credential header on `request`, replacing headers of the
    /// same name the request already carries.
    pub fn apply(&self, request: &mut HttpRequest) {
        for (name, value) in &self.headers {
            request
                .headers
                .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            request.headers.push((name.clone(), value.clone()));
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Credentials")
            .field("headers", &names)
            .finish_non_exhaustive()
    }
}

/// Attaches `Credentials` to every request before delegating to `inner`.
#[derive(Debug)]
pub struct CredentialedTransport<T> {
    inner: T,
    credentials: Credentials,
}

impl<T: Transport> CredentialedTransport<T> {
    pub fn new(inner: T, credentials: Credentials) -> Self {
        Self { inner, credentials }
    }
}

#[async_trait]
impl<T: Transport> Transport for CredentialedTransport<T> {
    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.credentials.apply(&mut request);
        self.inner.send(request).await
    }
}

/// `Transport` backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap a caller-built client, keeping its timeout and TLS settings.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(method = request.method.as_str(), path = %request.path))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self
            .client
            .request(method, request.url())
            .headers(header_map(&request.headers)?);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, "HTTP request failed");
            if e.is_timeout() {
                ApiError::Network(format!("request timed out: {e}"))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read response body: {e}")))?;
        debug!(status, "received HTTP response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::Internal(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Internal(format!("invalid value for header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
