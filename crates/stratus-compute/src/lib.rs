//! Compute binding for the Stratus SDK.
//!
//! Servers and images, listed page by page and awaited with the shared status
//! poller from `stratus-core`.

#![deny(missing_docs)]

pub mod client;
pub mod models;

pub use client::{ComputeClient, ComputeClientBuilder};
pub use models::{
    Address, CreateServerRequest, CreatedServer, Image, ImageListParams, NetworkRef, Server,
    ServerFault, ServerListParams,
};

/// Convenient result alias that reuses the shared Stratus error type.
pub type Result<T> = stratus_core::Result<T>;
