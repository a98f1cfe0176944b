//! Asynchronous compute client.

use crate::models::{
    CreateServerRequest, CreatedServer, Image, ImageListParams, Server, ServerListParams,
    IMAGES_KEY, IMAGE_KEY, SERVERS_KEY, SERVER_KEY,
};
use crate::Result;
use reqwest::Method;
use std::sync::Arc;
use stratus_core::client::{HttpConfig, ServiceClient, ServiceClientBuilder};
use stratus_core::config::{PollConfig, StratusConfig};
use stratus_core::continuation::{chain, select, Outcome};
use stratus_core::extensions::negotiate;
use stratus_core::http::Transport;
use stratus_core::ids::{ImageId, ServerId};
use stratus_core::pagination::{collect_all, fetch_first_page, CollectionRequest, Page};
use stratus_core::poll::{wait_for, PollOutcome, PollSpec};
use stratus_core::types::ServiceType;
use stratus_core::{CancellationToken, ResourceStatus};
use tracing::info;
use url::Url;

const USER_AGENT: &str = concat!("stratus-compute/", env!("CARGO_PKG_VERSION"));

/// Builder for [`ComputeClient`].
#[derive(Debug, Clone)]
pub struct ComputeClientBuilder {
    inner: ServiceClientBuilder,
    poll: PollConfig,
}

impl ComputeClientBuilder {
    /// Create a builder for the specified base URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let builder =
            ServiceClientBuilder::new(ServiceType::Compute, base_url)?.with_user_agent(USER_AGENT);

        Ok(Self {
            inner: builder,
            poll: PollConfig::default(),
        })
    }

    /// Create a builder from shared SDK configuration.
    pub fn from_config(config: &StratusConfig) -> Result<Self> {
        let builder = ServiceClientBuilder::from_config(ServiceType::Compute, config)?
            .with_user_agent(USER_AGENT);

        Ok(Self {
            inner: builder,
            poll: config.poll,
        })
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: HttpConfig) -> Self {
        self.inner = self.inner.with_http_config(config);
        self
    }

    /// Configure an X-Auth-Token header.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.inner = self.inner.with_token(token);
        self
    }

    /// Use a custom transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.inner = self.inner.with_transport(transport);
        self
    }

    /// Override the default poll interval and timeout.
    #[must_use]
    pub const fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ComputeClient> {
        let inner = self.inner.build()?;
        Ok(ComputeClient {
            inner,
            poll: self.poll,
        })
    }
}

/// Asynchronous compute client.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    inner: ServiceClient,
    poll: PollConfig,
}

impl ComputeClient {
    /// Construct a client directly from the base URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        ComputeClientBuilder::new(base_url)?.build()
    }

    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    /// Underlying service client.
    #[must_use]
    pub const fn service_client(&self) -> &ServiceClient {
        &self.inner
    }

    /// First page of servers; later pages are fetched on demand.
    pub async fn list_servers(
        &self,
        params: &ServerListParams,
        token: &CancellationToken,
    ) -> Outcome<Option<Page<Server>>> {
        let request =
            CollectionRequest::new("servers/detail", SERVERS_KEY).with_query(params.to_query());
        fetch_first_page(&self.inner, request, token).await
    }

    /// Every server matching `params`, across all pages.
    pub async fn list_all_servers(
        &self,
        params: &ServerListParams,
        token: &CancellationToken,
    ) -> Outcome<Vec<Server>> {
        chain(self.list_servers(params, token), |first| {
            collect_all(first, token)
        })
        .await
    }

    /// Fetch a single server.
    pub async fn get_server(&self, id: ServerId, token: &CancellationToken) -> Outcome<Server> {
        self.inner
            .get_enveloped(&format!("servers/{id}"), SERVER_KEY, token)
            .await
    }

    /// Request a new server; it starts in `BUILD`.
    pub async fn create_server(
        &self,
        request: &CreateServerRequest,
        token: &CancellationToken,
    ) -> Outcome<CreatedServer> {
        info!(name = %request.name, "Creating server");
        self.inner
            .send_enveloped(Method::POST, "servers", SERVER_KEY, request, SERVER_KEY, token)
            .await
    }

    /// Request deletion of a server.
    pub async fn delete_server(&self, id: ServerId, token: &CancellationToken) -> Outcome<()> {
        info!(%id, "Deleting server");
        self.inner.delete(&format!("servers/{id}"), token).await
    }

    /// Poll spec for `subject` preloaded with this client's defaults.
    #[must_use]
    pub fn poll_spec(&self, subject: impl Into<String>) -> PollSpec {
        PollSpec::from_config(subject, &self.poll)
    }

    /// Wait for a server to reach one of `desired`; `ERROR` fails the wait.
    pub async fn wait_for_server_status<I>(
        &self,
        id: ServerId,
        desired: I,
        token: &CancellationToken,
    ) -> PollOutcome<Server>
    where
        I: IntoIterator<Item = ResourceStatus>,
    {
        let spec = self
            .poll_spec(id.to_string())
            .desired(desired)
            .errors([ResourceStatus::Error])
            .cancellation(token.clone());
        self.wait_for_server(id, spec, token).await
    }

    /// Wait for a server to disappear.
    pub async fn wait_for_server_deletion(
        &self,
        id: ServerId,
        token: &CancellationToken,
    ) -> PollOutcome<Server> {
        let spec = self
            .poll_spec(id.to_string())
            .desired([ResourceStatus::Deleted, ResourceStatus::SoftDeleted])
            .errors([ResourceStatus::Error])
            .cancellation(token.clone())
            .for_deletion();
        self.wait_for_server(id, spec, token).await
    }

    /// Poll a server with a caller-built spec.
    pub async fn wait_for_server(
        &self,
        id: ServerId,
        spec: PollSpec,
        token: &CancellationToken,
    ) -> PollOutcome<Server> {
        wait_for(spec, || self.get_server(id, token)).await
    }

    /// First page of images.
    pub async fn list_images(
        &self,
        params: &ImageListParams,
        token: &CancellationToken,
    ) -> Outcome<Option<Page<Image>>> {
        let request =
            CollectionRequest::new("images/detail", IMAGES_KEY).with_query(params.to_query());
        fetch_first_page(&self.inner, request, token).await
    }

    /// Fetch a single image.
    pub async fn get_image(&self, id: ImageId, token: &CancellationToken) -> Outcome<Image> {
        self.inner
            .get_enveloped(&format!("images/{id}"), IMAGE_KEY, token)
            .await
    }

    /// Wait for an image to reach one of `desired`; `ERROR` and `KILLED` fail
    /// the wait.
    pub async fn wait_for_image_status<I>(
        &self,
        id: ImageId,
        desired: I,
        token: &CancellationToken,
    ) -> PollOutcome<Image>
    where
        I: IntoIterator<Item = ResourceStatus>,
    {
        let spec = self
            .poll_spec(id.to_string())
            .desired(desired)
            .errors([ResourceStatus::Error, ResourceStatus::Killed])
            .cancellation(token.clone());
        wait_for(spec, || self.get_image(id, token)).await
    }

    /// Whether the service advertises the extension `alias`.
    pub async fn supports_extension(&self, alias: &str, token: &CancellationToken) -> Outcome<bool> {
        select(negotiate(&self.inner, alias, token), |support| {
            support.is_present()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use stratus_core::Error;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> ComputeClient {
        ComputeClientBuilder::new(format!("{}/v2.1", server.uri()))
            .unwrap()
            .with_poll_config(PollConfig::new().with_interval_ms(10).with_timeout_secs(5))
            .build()
            .unwrap()
    }

    fn server_json(id: ServerId, status: &str) -> serde_json::Value {
        json!({"server": {"id": id, "name": "web-01", "status": status}})
    }

    #[tokio::test]
    async fn list_all_servers_follows_next_links() {
        let server = MockServer::start().await;
        let first = ServerId::new_v4();
        let second = ServerId::new_v4();

        Mock::given(method("GET"))
            .and(path("/v2.1/servers/detail"))
            .and(query_param("marker", first.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": second, "name": "db", "status": "SHUTOFF"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.1/servers/detail"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": first, "name": "web", "status": "ACTIVE"}],
                "servers_links": [{
                    "rel": "next",
                    "href": format!("{}/v2.1/servers/detail?marker={first}", server.uri())
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let params = ServerListParams {
            limit: Some(1),
            ..ServerListParams::default()
        };
        let servers = client
            .list_all_servers(&params, &CancellationToken::new())
            .await
            .completed()
            .unwrap();

        let ids: Vec<_> = servers.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(servers[1].status, ResourceStatus::Shutoff);
    }

    #[tokio::test]
    async fn get_server_not_found() {
        let server = MockServer::start().await;
        let id = ServerId::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v2.1/servers/{id}").as_str()))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .get_server(id, &CancellationToken::new())
            .await
            .fault()
            .unwrap();
        assert!(err.is_not_found());
        assert_eq!(
            err,
            Error::TransientHttp {
                status: 404,
                body: "missing".into()
            }
        );
    }

    #[tokio::test]
    async fn create_server_wraps_request() {
        let server = MockServer::start().await;
        let id = ServerId::new_v4();
        let image = ImageId::new_v4();

        Mock::given(method("POST"))
            .and(path("/v2.1/servers"))
            .and(body_json(json!({
                "server": {"name": "web-01", "flavorRef": "1", "imageRef": image}
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "server": {"id": id, "adminPass": "s3cret", "links": []}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let request = CreateServerRequest::new("web-01", "1").with_image(image);
        let created = client
            .create_server(&request, &CancellationToken::new())
            .await
            .completed()
            .unwrap();
        assert_eq!(created.id, id);
        assert_eq!(created.admin_pass.as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn canceled_token_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();

        let client = test_client(&server);
        let outcome = client.delete_server(ServerId::new_v4(), &token).await;
        assert_eq!(outcome, Outcome::Canceled);
    }

    #[tokio::test]
    async fn wait_for_server_status_until_active() {
        let server = MockServer::start().await;
        let id = ServerId::new_v4();
        let route = format!("/v2.1/servers/{id}");

        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_json(id, "BUILD")))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_json(id, "ACTIVE")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let outcome = client
            .wait_for_server_status(id, [ResourceStatus::Active], &CancellationToken::new())
            .await;

        match outcome {
            PollOutcome::Succeeded(Some(found)) => assert_eq!(found.status, ResourceStatus::Active),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_server_status_fails_on_error() {
        let server = MockServer::start().await;
        let id = ServerId::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v2.1/servers/{id}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_json(id, "ERROR")))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let outcome = client
            .wait_for_server_status(id, [ResourceStatus::Active], &CancellationToken::new())
            .await;

        match outcome.into_outcome() {
            Outcome::Faulted(Error::TerminalState {
                subject,
                status,
                snapshot,
            }) => {
                assert_eq!(subject, id.to_string());
                assert_eq!(status, ResourceStatus::Error);
                assert_eq!(snapshot["name"], "web-01");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_server_deletion_treats_not_found_as_done() {
        let server = MockServer::start().await;
        let id = ServerId::new_v4();
        let route = format!("/v2.1/servers/{id}");

        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_json(id, "ACTIVE")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let outcome = client
            .wait_for_server_deletion(id, &CancellationToken::new())
            .await;
        assert_eq!(outcome, PollOutcome::Succeeded(None));
    }

    #[tokio::test]
    async fn wait_times_out_with_last_status() {
        let server = MockServer::start().await;
        let id = ImageId::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v2.1/images/{id}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "image": {"id": id, "name": "snap", "status": "SAVING", "progress": 25}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let spec_timeout = Duration::from_millis(50);
        let token = CancellationToken::new();
        let spec = client
            .poll_spec(id.to_string())
            .desired([ResourceStatus::Active])
            .timeout(spec_timeout)
            .cancellation(token.clone());
        let outcome = wait_for(spec, || client.get_image(id, &token)).await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                subject: id.to_string(),
                last_status: Some(ResourceStatus::Saving),
            }
        );
    }

    #[tokio::test]
    async fn supports_extension_probes_alias() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/extensions/os-keypairs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "extension": {"alias": "os-keypairs", "name": "Keypairs"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.1/extensions/os-baremetal"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let token = CancellationToken::new();
        assert_eq!(
            client.supports_extension("os-keypairs", &token).await,
            Outcome::Completed(true)
        );
        assert_eq!(
            client.supports_extension("os-baremetal", &token).await,
            Outcome::Completed(false)
        );
    }
}
