//! Block storage models: volumes and volume snapshots.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stratus_core::ids::{ImageId, ServerId, SnapshotId, VolumeId};
use stratus_core::poll::Pollable;
use stratus_core::query::QueryParams;
use stratus_core::ResourceStatus;

/// Envelope key of a single volume.
pub const VOLUME_KEY: &str = "volume";
/// Envelope key of the volume collection.
pub const VOLUMES_KEY: &str = "volumes";
/// Envelope key of a single snapshot.
pub const SNAPSHOT_KEY: &str = "snapshot";
/// Envelope key of the snapshot collection.
pub const SNAPSHOTS_KEY: &str = "snapshots";

/// Filters supported by the `volumes/detail` endpoint.
#[derive(Debug, Default, Clone)]
pub struct VolumeListParams {
    /// Filter by name.
    pub name: Option<String>,
    /// Filter by status.
    pub status: Option<ResourceStatus>,
    /// Include volumes of every project (admin only).
    pub all_tenants: bool,
    /// Page size.
    pub limit: Option<u32>,
    /// ID of the last volume already seen.
    pub marker: Option<String>,
}

impl VolumeListParams {
    /// Convert the filters into query parameters.
    #[must_use]
    pub fn to_query(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.push_opt("name", self.name.as_deref());
        params.push_opt("status", self.status.as_ref().map(status_filter));
        if self.all_tenants {
            params.push("all_tenants", 1);
        }
        params.push_paging(self.limit, self.marker.as_deref());
        params
    }
}

/// Filters supported by the `snapshots/detail` endpoint.
#[derive(Debug, Default, Clone)]
pub struct SnapshotListParams {
    /// Only snapshots of this volume.
    pub volume_id: Option<VolumeId>,
    /// Filter by status.
    pub status: Option<ResourceStatus>,
    /// Page size.
    pub limit: Option<u32>,
    /// ID of the last snapshot already seen.
    pub marker: Option<String>,
}

impl SnapshotListParams {
    /// Convert the filters into query parameters.
    #[must_use]
    pub fn to_query(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.push_opt("volume_id", self.volume_id);
        params.push_opt("status", self.status.as_ref().map(status_filter));
        params.push_paging(self.limit, self.marker.as_deref());
        params
    }
}

// Block storage reports and filters on lowercase statuses.
fn status_filter(status: &ResourceStatus) -> String {
    status.as_str().to_ascii_lowercase()
}

/// Attachment of a volume to a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeAttachment {
    /// Attachment ID.
    pub attachment_id: String,
    /// Server the volume is attached to.
    pub server_id: ServerId,
    /// Device path on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Hypervisor host name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
}

/// A volume as returned by the block storage service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    /// Volume ID.
    pub id: VolumeId,
    /// Display name; volumes may be unnamed.
    #[serde(default)]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current status.
    pub status: ResourceStatus,
    /// Size in GiB.
    pub size: u64,
    /// Volume type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// Availability zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// `"true"` or `"false"`, as sent by the service.
    #[serde(default)]
    pub bootable: String,
    /// Whether the volume may be attached to several servers.
    #[serde(default)]
    pub multiattach: bool,
    /// Whether the volume is encrypted.
    #[serde(default)]
    pub encrypted: bool,
    /// Snapshot the volume was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<SnapshotId>,
    /// Current attachments.
    #[serde(default)]
    pub attachments: Vec<VolumeAttachment>,
    /// User metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl Volume {
    /// Whether the volume can be booted from.
    #[must_use]
    pub fn is_bootable(&self) -> bool {
        self.bootable.eq_ignore_ascii_case("true")
    }

    /// Whether the volume is attached to `server`.
    #[must_use]
    pub fn is_attached_to(&self, server: ServerId) -> bool {
        self.attachments.iter().any(|a| a.server_id == server)
    }
}

impl Pollable for Volume {
    fn status(&self) -> ResourceStatus {
        self.status.clone()
    }
}

/// A volume snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Snapshot ID.
    pub id: SnapshotId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current status.
    pub status: ResourceStatus,
    /// Size in GiB.
    pub size: u64,
    /// Source volume.
    pub volume_id: VolumeId,
    /// Completion in percent, e.g. `"45%"`.
    #[serde(
        rename = "os-extended-snapshot-attributes:progress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<String>,
    /// User metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl Pollable for Snapshot {
    fn status(&self) -> ResourceStatus {
        self.status.clone()
    }
}

/// Payload for creating a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateVolumeRequest {
    /// Size in GiB.
    pub size: u64,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Volume type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// Availability zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Create from this snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<SnapshotId>,
    /// Create from this image.
    #[serde(rename = "imageRef", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageId>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl CreateVolumeRequest {
    /// Start a request for an empty volume of `size` GiB.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            name: None,
            description: None,
            volume_type: None,
            availability_zone: None,
            snapshot_id: None,
            image_ref: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the volume type.
    #[must_use]
    pub fn with_volume_type(mut self, volume_type: impl Into<String>) -> Self {
        self.volume_type = Some(volume_type.into());
        self
    }

    /// Populate from a snapshot.
    #[must_use]
    pub fn from_snapshot(mut self, snapshot: SnapshotId) -> Self {
        self.snapshot_id = Some(snapshot);
        self
    }

    /// Populate from an image.
    #[must_use]
    pub fn from_image(mut self, image: ImageId) -> Self {
        self.image_ref = Some(image);
        self
    }
}

/// Payload for snapshotting a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateSnapshotRequest {
    /// Volume to snapshot.
    pub volume_id: VolumeId,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Snapshot even if the volume is attached.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

impl CreateSnapshotRequest {
    /// Start a request for `volume_id`.
    #[must_use]
    pub const fn new(volume_id: VolumeId) -> Self {
        Self {
            volume_id,
            name: None,
            description: None,
            force: false,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allow snapshotting an attached volume.
    #[must_use]
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}
