//! Block storage binding for the Stratus SDK.
//!
//! Provides typed models and an asynchronous client for volumes and volume
//! snapshots.

#![deny(missing_docs)]

pub mod client;
pub mod models;

pub use client::{BlockStorageClient, BlockStorageClientBuilder};
pub use models::{
    CreateSnapshotRequest, CreateVolumeRequest, Snapshot, SnapshotListParams, Volume,
    VolumeAttachment, VolumeListParams,
};

/// Convenient result alias using the shared Stratus error type.
pub type Result<T> = stratus_core::Result<T>;
