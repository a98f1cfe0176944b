//! Service clients and HTTP configuration.
//!
//! [`ServiceClient`] binds a base URL to a [`Transport`] and is the piece every
//! service binding builds on: it resolves paths and link targets, applies the
//! acceptable-status rule of each exchange, and unwraps root envelopes.

use reqwest::{ClientBuilder, Method};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use validator::Validate;

use crate::config::StratusConfig;
use crate::continuation::{try_select, Outcome};
use crate::envelope;
use crate::error::{Error, Result};
use crate::http::{AcceptStatus, HttpExchange, HttpResponse, ReqwestTransport, Transport};
use crate::types::ServiceType;

// Service-specific timeout configurations (in seconds)

/// Default timeout for compute requests
pub const COMPUTE_DEFAULT_TIMEOUT: u64 = 30;

/// Default timeout for image requests (larger for uploads)
pub const IMAGE_DEFAULT_TIMEOUT: u64 = 60;

/// Default timeout for block storage requests
pub const BLOCK_STORAGE_DEFAULT_TIMEOUT: u64 = 30;

/// Default timeout for network requests
pub const NETWORK_DEFAULT_TIMEOUT: u64 = 20;

/// Default timeout for identity requests
pub const IDENTITY_DEFAULT_TIMEOUT: u64 = 15;

// Connection pool settings

/// Default idle timeout for connection pools
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Enable response compression
    pub enable_compression: bool,
}

impl HttpConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            enable_compression: true,
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set connection pool idle timeout.
    #[must_use]
    pub const fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    #[must_use]
    pub const fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Enable or disable compression.
    #[must_use]
    pub const fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`ServiceClient`].
#[derive(Clone)]
pub struct ServiceClientBuilder {
    service: ServiceType,
    base_url: Url,
    http_config: HttpConfig,
    user_agent: Option<String>,
    token: Option<String>,
    tls_verify: bool,
    tls_ca_cert: Option<std::path::PathBuf>,
    transport: Option<Arc<dyn Transport>>,
}

impl ServiceClientBuilder {
    /// Create a builder for `service` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] when the URL cannot be parsed.
    pub fn new(service: ServiceType, base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = normalize_base(Url::parse(base_url.as_ref())?);
        Ok(Self {
            service,
            base_url,
            http_config: HttpConfig::new().with_timeout(service.default_timeout()),
            user_agent: None,
            token: None,
            tls_verify: true,
            tls_ca_cert: None,
            transport: None,
        })
    }

    /// Create a builder from a [`StratusConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the configuration fails validation
    /// or the endpoint cannot be parsed.
    pub fn from_config(service: ServiceType, config: &StratusConfig) -> Result<Self> {
        config.validate()?;
        let base_url = normalize_base(config.parse_endpoint()?);
        Ok(Self {
            service,
            base_url,
            http_config: HttpConfig::new().with_timeout(config.timeout()),
            user_agent: None,
            token: config.auth_token.clone(),
            tls_verify: config.tls_verify,
            tls_ca_cert: config.tls_ca_cert.clone(),
            transport: None,
        })
    }

    /// Override the HTTP configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: HttpConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Send a pre-issued token as `X-Auth-Token`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use a custom transport instead of the default `reqwest` one.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the HTTP client cannot be built.
    pub fn build(self) -> Result<ServiceClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(self.build_reqwest_transport()?),
        };

        Ok(ServiceClient {
            service: self.service,
            base_url: self.base_url,
            transport,
        })
    }

    fn build_reqwest_transport(&self) -> Result<ReqwestTransport> {
        let config = &self.http_config;
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .gzip(config.enable_compression);

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        if !self.tls_verify {
            warn!(service = %self.service, "TLS verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca_cert) = &self.tls_ca_cert {
            debug!("loading CA certificate from {}", ca_cert.display());
            let bytes = std::fs::read(ca_cert).map_err(|err| {
                Error::ConfigError(format!(
                    "Failed to read CA certificate {}: {err}",
                    ca_cert.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&bytes)
                .map_err(|err| Error::ConfigError(format!("Invalid CA certificate: {err}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build {} HTTP client: {err}", self.service))
        })?;

        let mut transport = ReqwestTransport::new(http);
        if let Some(token) = &self.token {
            transport = transport.with_token(SecretString::from(token.clone()));
        }
        Ok(transport)
    }
}

impl fmt::Debug for ServiceClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClientBuilder")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("http_config", &self.http_config)
            .field("tls_verify", &self.tls_verify)
            .finish_non_exhaustive()
    }
}

// `Url::join` replaces the last segment unless the base ends with a slash.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Client for one service endpoint.
#[derive(Clone)]
pub struct ServiceClient {
    service: ServiceType,
    base_url: Url,
    transport: Arc<dyn Transport>,
}

impl ServiceClient {
    /// Start a builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] when the URL cannot be parsed.
    pub fn builder(service: ServiceType, base_url: impl AsRef<str>) -> Result<ServiceClientBuilder> {
        ServiceClientBuilder::new(service, base_url)
    }

    /// Service this client talks to.
    #[must_use]
    pub const fn service(&self) -> ServiceType {
        self.service
    }

    /// Base URL (always ends with `/`).
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a relative path or an absolute link target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] when the result is not a valid URL.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url> {
        self.base_url.join(path_or_url).map_err(|err| {
            Error::InvalidEndpoint(format!("Invalid {} path `{path_or_url}`: {err}", self.service))
        })
    }

    /// Describe a request against `path_or_url`.
    ///
    /// # Errors
    ///
    /// See [`ServiceClient::resolve`].
    pub fn exchange(&self, method: Method, path_or_url: &str) -> Result<HttpExchange> {
        Ok(HttpExchange::new(method, self.resolve(path_or_url)?))
    }

    /// Perform one exchange and check its status.
    ///
    /// Returns `Canceled` without issuing the request when `token` is already
    /// canceled. A status outside the exchange's acceptable set becomes
    /// [`Error::TransientHttp`] carrying the raw body.
    pub async fn send(&self, exchange: HttpExchange, token: &CancellationToken) -> Outcome<HttpResponse> {
        let accept = exchange.accept().clone();
        let service = self.service;
        try_select(
            Outcome::guard(token, self.transport.send(exchange)),
            move |response| check_status(service, &accept, response),
        )
        .await
    }

    /// `GET` a resource and unwrap its root envelope.
    pub async fn get_enveloped<T>(&self, path: &str, key: &str, token: &CancellationToken) -> Outcome<T>
    where
        T: DeserializeOwned,
    {
        let exchange = match self.exchange(Method::GET, path) {
            Ok(exchange) => exchange,
            Err(err) => return Outcome::Faulted(err),
        };
        try_select(self.send(exchange, token), |response| response.decode(key)).await
    }

    /// Send `body` wrapped under `request_key` and unwrap the response under
    /// `response_key`.
    pub async fn send_enveloped<B, R>(
        &self,
        method: Method,
        path: &str,
        request_key: &str,
        body: &B,
        response_key: &str,
        token: &CancellationToken,
    ) -> Outcome<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let exchange = match self
            .exchange(method, path)
            .and_then(|exchange| Ok(exchange.with_json(envelope::encode(request_key, body)?)))
        {
            Ok(exchange) => exchange,
            Err(err) => return Outcome::Faulted(err),
        };
        try_select(self.send(exchange, token), |response| {
            response.decode(response_key)
        })
        .await
    }

    /// `DELETE` a resource, accepting any 2xx.
    pub async fn delete(&self, path: &str, token: &CancellationToken) -> Outcome<()> {
        let exchange = match self.exchange(Method::DELETE, path) {
            Ok(exchange) => exchange.accepting(AcceptStatus::Success),
            Err(err) => return Outcome::Faulted(err),
        };
        self.send(exchange, token).await.map(|_| ())
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn check_status(service: ServiceType, accept: &AcceptStatus, response: HttpResponse) -> Result<HttpResponse> {
    let status = response.status();
    if accept.accepts(status) {
        return Ok(response);
    }
    debug!(%service, %status, "Unacceptable response status");
    Err(Error::http(status, response.text()))
}
