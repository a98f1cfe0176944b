//! Single request/response exchanges.
//!
//! An [`HttpExchange`] describes one request and which response statuses are
//! acceptable for it. A [`Transport`] performs the round trip; status
//! evaluation happens in [`ServiceClient::send`](crate::client::ServiceClient::send)
//! so every transport gets the same acceptance rules.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};
use url::Url;

use crate::envelope;
use crate::error::Result;

/// Header carrying a pre-issued token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Which response statuses count as success for an exchange.
#[derive(Clone, Default)]
pub enum AcceptStatus {
    /// Any 2xx status.
    #[default]
    Success,
    /// Exactly the listed statuses.
    OneOf(Vec<StatusCode>),
    /// A custom rule.
    Predicate(fn(StatusCode) -> bool),
}

impl AcceptStatus {
    /// Evaluate the rule for `status`.
    #[must_use]
    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            Self::Success => status.is_success(),
            Self::OneOf(codes) => codes.contains(&status),
            Self::Predicate(rule) => rule(status),
        }
    }
}

impl fmt::Debug for AcceptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("Success"),
            Self::OneOf(codes) => f.debug_tuple("OneOf").field(codes).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// One request, consumed when sent.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    method: Method,
    url: Url,
    body: Option<Value>,
    accept: AcceptStatus,
}

impl HttpExchange {
    /// Describe a request with no body, accepting any 2xx.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            accept: AcceptStatus::Success,
        }
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override which statuses are acceptable.
    #[must_use]
    pub fn accepting(mut self, accept: AcceptStatus) -> Self {
        self.accept = accept;
        self
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable request URL, for appending query parameters.
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Acceptance rule.
    #[must_use]
    pub const fn accept(&self) -> &AcceptStatus {
        &self.accept
    }
}

/// Immutable response of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: StatusCode,
    body: Bytes,
}

impl HttpResponse {
    /// Build a response from its parts.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Unwrap a required root envelope.
    ///
    /// # Errors
    ///
    /// See [`envelope::decode`].
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        envelope::decode(&self.body, key)
    }

    /// Unwrap an optional root envelope.
    ///
    /// # Errors
    ///
    /// See [`envelope::decode_optional`].
    pub fn decode_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        envelope::decode_optional(&self.body, key)
    }

    /// Parse the whole body, `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`](crate::error::Error::Deserialization)
    /// for malformed JSON.
    pub fn document(&self) -> Result<Option<Value>> {
        envelope::parse_document(&self.body)
    }
}

/// Performs one HTTP round trip.
///
/// Implementations must not interpret the status code; they only fail when
/// no response was obtained.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the exchange and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::error::Error::Transport) when the
    /// request could not be completed.
    async fn send(&self, exchange: HttpExchange) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    http: Client,
    token: Option<SecretString>,
}

impl ReqwestTransport {
    /// Wrap a configured `reqwest` client.
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http, token: None }
    }

    /// Send `token` with every request.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, exchange: HttpExchange) -> Result<HttpResponse> {
        let HttpExchange {
            method, url, body, ..
        } = exchange;

        info!(%method, %url, "Sending request");

        let mut request = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header(AUTH_TOKEN_HEADER, token.expose_secret());
        }
        if let Some(payload) = &body {
            request = request.json(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(%status, len = bytes.len(), "Received response");

        Ok(HttpResponse::new(status, bytes))
    }
}
