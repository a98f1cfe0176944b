//! Asynchronous block storage client.

use crate::models::{
    CreateSnapshotRequest, CreateVolumeRequest, Snapshot, SnapshotListParams, Volume,
    VolumeListParams, SNAPSHOTS_KEY, SNAPSHOT_KEY, VOLUMES_KEY, VOLUME_KEY,
};
use crate::Result;
use futures::Stream;
use reqwest::Method;
use std::sync::Arc;
use stratus_core::client::{HttpConfig, ServiceClient, ServiceClientBuilder};
use stratus_core::config::{PollConfig, StratusConfig};
use stratus_core::continuation::{select, Outcome};
use stratus_core::http::Transport;
use stratus_core::ids::{SnapshotId, VolumeId};
use stratus_core::pagination::{fetch_first_page, into_stream, CollectionRequest, Page};
use stratus_core::poll::{wait_for, PollOutcome, PollSpec};
use stratus_core::types::ServiceType;
use stratus_core::{CancellationToken, ResourceStatus};
use tracing::info;
use url::Url;

const USER_AGENT: &str = concat!("stratus-blockstorage/", env!("CARGO_PKG_VERSION"));

/// Builder for [`BlockStorageClient`].
#[derive(Debug, Clone)]
pub struct BlockStorageClientBuilder {
    inner: ServiceClientBuilder,
    poll: PollConfig,
}

impl BlockStorageClientBuilder {
    /// Create a builder for the specified base URL (including the project
    /// segment, e.g. `.../v3/{project_id}`).
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let builder = ServiceClientBuilder::new(ServiceType::BlockStorage, base_url)?
            .with_user_agent(USER_AGENT);

        Ok(Self {
            inner: builder,
            poll: PollConfig::default(),
        })
    }

    /// Create a builder from shared SDK configuration.
    pub fn from_config(config: &StratusConfig) -> Result<Self> {
        let builder = ServiceClientBuilder::from_config(ServiceType::BlockStorage, config)?
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
    pub fn build(self) -> Result<BlockStorageClient> {
        let inner = self.inner.build()?;
        Ok(BlockStorageClient {
            inner,
            poll: self.poll,
        })
    }
}

/// Asynchronous block storage client.
#[derive(Debug, Clone)]
pub struct BlockStorageClient {
    inner: ServiceClient,
    poll: PollConfig,
}

impl BlockStorageClient {
    /// Construct a client directly from the base URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        BlockStorageClientBuilder::new(base_url)?.build()
    }

    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    /// First page of volumes; later pages are fetched on demand.
    pub async fn list_volumes(
        &self,
        params: &VolumeListParams,
        token: &CancellationToken,
    ) -> Outcome<Option<Page<Volume>>> {
        let request =
            CollectionRequest::new("volumes/detail", VOLUMES_KEY).with_query(params.to_query());
        fetch_first_page(&self.inner, request, token).await
    }

    /// Volumes as a stream of per-page batches.
    ///
    /// The outer outcome covers the first page; later pages are requested as
    /// the stream is polled.
    pub async fn volume_batches(
        &self,
        params: &VolumeListParams,
        token: &CancellationToken,
    ) -> Outcome<impl Stream<Item = Outcome<Vec<Volume>>>> {
        let owned = token.clone();
        select(self.list_volumes(params, token), move |first| {
            into_stream(first, owned)
        })
        .await
    }

    /// Fetch a single volume.
    pub async fn get_volume(&self, id: VolumeId, token: &CancellationToken) -> Outcome<Volume> {
        self.inner
            .get_enveloped(&format!("volumes/{id}"), VOLUME_KEY, token)
            .await
    }

    /// Request a new volume; it starts in `creating`.
    pub async fn create_volume(
        &self,
        request: &CreateVolumeRequest,
        token: &CancellationToken,
    ) -> Outcome<Volume> {
        info!(size = request.size, "Creating volume");
        self.inner
            .send_enveloped(Method::POST, "volumes", VOLUME_KEY, request, VOLUME_KEY, token)
            .await
    }

    /// Request deletion of a volume.
    pub async fn delete_volume(&self, id: VolumeId, token: &CancellationToken) -> Outcome<()> {
        info!(%id, "Deleting volume");
        self.inner.delete(&format!("volumes/{id}"), token).await
    }

    /// Poll spec for `subject` preloaded with this client's defaults.
    #[must_use]
    pub fn poll_spec(&self, subject: impl Into<String>) -> PollSpec {
        PollSpec::from_config(subject, &self.poll)
    }

    /// Wait for a volume to reach one of `desired`; `error` fails the wait.
    pub async fn wait_for_volume_status<I>(
        &self,
        id: VolumeId,
        desired: I,
        token: &CancellationToken,
    ) -> PollOutcome<Volume>
    where
        I: IntoIterator<Item = ResourceStatus>,
    {
        let spec = self
            .poll_spec(id.to_string())
            .desired(desired)
            .errors([ResourceStatus::Error])
            .cancellation(token.clone());
        wait_for(spec, || self.get_volume(id, token)).await
    }

    /// Wait for a volume to disappear; `error_deleting` fails the wait.
    pub async fn wait_for_volume_deletion(
        &self,
        id: VolumeId,
        token: &CancellationToken,
    ) -> PollOutcome<Volume> {
        let spec = self
            .poll_spec(id.to_string())
            .desired([ResourceStatus::Deleted])
            .errors([ResourceStatus::ErrorDeleting, ResourceStatus::Error])
            .cancellation(token.clone())
            .for_deletion();
        wait_for(spec, || self.get_volume(id, token)).await
    }

    /// First page of snapshots.
    pub async fn list_snapshots(
        &self,
        params: &SnapshotListParams,
        token: &CancellationToken,
    ) -> Outcome<Option<Page<Snapshot>>> {
        let request =
            CollectionRequest::new("snapshots/detail", SNAPSHOTS_KEY).with_query(params.to_query());
        fetch_first_page(&self.inner, request, token).await
    }

    /// Fetch a single snapshot.
    pub async fn get_snapshot(&self, id: SnapshotId, token: &CancellationToken) -> Outcome<Snapshot> {
        self.inner
            .get_enveloped(&format!("snapshots/{id}"), SNAPSHOT_KEY, token)
            .await
    }

    /// Snapshot a volume.
    pub async fn create_snapshot(
        &self,
        request: &CreateSnapshotRequest,
        token: &CancellationToken,
    ) -> Outcome<Snapshot> {
        info!(volume = %request.volume_id, "Creating snapshot");
        self.inner
            .send_enveloped(
                Method::POST,
                "snapshots",
                SNAPSHOT_KEY,
                request,
                SNAPSHOT_KEY,
                token,
            )
            .await
    }

    /// Wait for a snapshot to reach one of `desired`; `error` fails the wait.
    pub async fn wait_for_snapshot_status<I>(
        &self,
        id: SnapshotId,
        desired: I,
        token: &CancellationToken,
    ) -> PollOutcome<Snapshot>
    where
        I: IntoIterator<Item = ResourceStatus>,
    {
        let spec = self
            .poll_spec(id.to_string())
            .desired(desired)
            .errors([ResourceStatus::Error])
            .cancellation(token.clone());
        wait_for(spec, || self.get_snapshot(id, token)).await
    }
}
