//! Compute models: servers and images.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use stratus_core::ids::{ImageId, NetworkId, ServerId};
use stratus_core::poll::Pollable;
use stratus_core::query::QueryParams;
use stratus_core::ResourceStatus;

/// Envelope key of a single server.
pub const SERVER_KEY: &str = "server";
/// Envelope key of the server collection.
pub const SERVERS_KEY: &str = "servers";
/// Envelope key of a single image.
pub const IMAGE_KEY: &str = "image";
/// Envelope key of the image collection.
pub const IMAGES_KEY: &str = "images";

/// Filters supported by the `servers/detail` endpoint.
#[derive(Debug, Default, Clone)]
pub struct ServerListParams {
    /// Filter by name (regular expression on the server side).
    pub name: Option<String>,
    /// Filter by status.
    pub status: Option<ResourceStatus>,
    /// Filter by image.
    pub image: Option<ImageId>,
    /// Filter by flavor ID.
    pub flavor: Option<String>,
    /// Only servers changed since this time.
    pub changes_since: Option<DateTime<Utc>>,
    /// Page size.
    pub limit: Option<u32>,
    /// ID of the last server already seen.
    pub marker: Option<String>,
}

impl ServerListParams {
    /// Convert the filters into query parameters.
    #[must_use]
    pub fn to_query(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.push_opt("name", self.name.as_deref());
        params.push_opt("status", self.status.as_ref().map(ResourceStatus::as_str));
        params.push_opt("image", self.image);
        params.push_opt("flavor", self.flavor.as_deref());
        params.push_opt("changes-since", self.changes_since.map(|t| t.to_rfc3339()));
        params.push_paging(self.limit, self.marker.as_deref());
        params
    }
}

/// Filters supported by the `images/detail` endpoint.
#[derive(Debug, Default, Clone)]
pub struct ImageListParams {
    /// Filter by name.
    pub name: Option<String>,
    /// Filter by status.
    pub status: Option<ResourceStatus>,
    /// Page size.
    pub limit: Option<u32>,
    /// ID of the last image already seen.
    pub marker: Option<String>,
}

impl ImageListParams {
    /// Convert the filters into query parameters.
    #[must_use]
    pub fn to_query(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.push_opt("name", self.name.as_deref());
        params.push_opt("status", self.status.as_ref().map(ResourceStatus::as_str));
        params.push_paging(self.limit, self.marker.as_deref());
        params
    }
}

/// One address attached to a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    /// IP address.
    pub addr: String,
    /// IP version (4 or 6).
    pub version: u8,
    /// `fixed` or `floating`.
    #[serde(
        rename = "OS-EXT-IPS:type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
}

/// Fault recorded on a server in `ERROR` state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerFault {
    /// Error code.
    pub code: u16,
    /// Short message.
    pub message: String,
    /// Detailed trace, admin-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A server as returned by the compute service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    /// Server ID.
    pub id: ServerId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Current status.
    pub status: ResourceStatus,
    /// Owning project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Creating user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Image reference; an empty string for volume-backed servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    /// Flavor reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Value>,
    /// Addresses keyed by network name.
    #[serde(default)]
    pub addresses: HashMap<String, Vec<Address>>,
    /// User metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Key pair name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Build progress in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Task in progress.
    #[serde(
        rename = "OS-EXT-STS:task_state",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub task_state: Option<String>,
    /// Hypervisor power state.
    #[serde(
        rename = "OS-EXT-STS:power_state",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub power_state: Option<u8>,
    /// Availability zone.
    #[serde(
        rename = "OS-EXT-AZ:availability_zone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub availability_zone: Option<String>,
    /// Fault details when in `ERROR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ServerFault>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Pollable for Server {
    fn status(&self) -> ResourceStatus {
        self.status.clone()
    }
}

/// Response to a create request; the full server is fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedServer {
    /// ID of the new server.
    pub id: ServerId,
    /// Generated administrator password, when the service returns one.
    #[serde(rename = "adminPass", default, skip_serializing_if = "Option::is_none")]
    pub admin_pass: Option<String>,
}

/// Network attachment in a create request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkRef {
    /// Network to attach.
    pub uuid: NetworkId,
    /// Fixed IP to request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_ip: Option<String>,
}

/// Payload for creating a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateServerRequest {
    /// Display name.
    pub name: String,
    /// Flavor ID.
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    /// Image to boot from; omitted for volume-backed servers.
    #[serde(rename = "imageRef", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageId>,
    /// Networks to attach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkRef>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Key pair to inject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Availability zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

impl CreateServerRequest {
    /// Start a request for `name` with `flavor_ref`.
    #[must_use]
    pub fn new(name: impl Into<String>, flavor_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor_ref: flavor_ref.into(),
            image_ref: None,
            networks: Vec::new(),
            metadata: HashMap::new(),
            key_name: None,
            availability_zone: None,
        }
    }

    /// Boot from `image`.
    #[must_use]
    pub fn with_image(mut self, image: ImageId) -> Self {
        self.image_ref = Some(image);
        self
    }

    /// Attach `network`.
    #[must_use]
    pub fn with_network(mut self, network: NetworkId) -> Self {
        self.networks.push(NetworkRef {
            uuid: network,
            fixed_ip: None,
        });
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Inject a key pair.
    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }
}

/// An image as returned by the compute service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    /// Image ID.
    pub id: ImageId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Current status.
    pub status: ResourceStatus,
    /// Upload or snapshot progress in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Minimum disk in GiB.
    #[serde(rename = "minDisk", default)]
    pub min_disk: u64,
    /// Minimum RAM in MiB.
    #[serde(rename = "minRam", default)]
    pub min_ram: u64,
    /// Size in bytes.
    #[serde(
        rename = "OS-EXT-IMG-SIZE:size",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    /// Image metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Server the image was taken from, for snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Value>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Pollable for Image {
    fn status(&self) -> ResourceStatus {
        self.status.clone()
    }
}
