//! # stratus-core
//!
//! Shared machinery for the Stratus cloud SDK service clients.
//!
//! Every service binding is a thin layer over this crate: requests go through
//! a [`ServiceClient`], results come back as an [`Outcome`] that is completed,
//! faulted, or canceled, list endpoints are walked page by page, and
//! long-running operations are awaited with the status poller.
//!
//! ## Modules
//!
//! - [`continuation`] - Outcome type and combinators for composing async steps
//! - [`http`] - Request descriptions, responses, and the transport seam
//! - [`client`] - Per-service client and builder
//! - [`envelope`] - Root-wrapper encoding and link extraction
//! - [`pagination`] - Lazy, marker-linked collection pages
//! - [`poll`] - Waiting for resource status transitions
//! - [`extensions`] - Extension discovery
//! - [`status`] - Resource status values
//! - [`error`] - Error types and HTTP status mapping
//! - [`config`] - Client and poller configuration
//! - [`ids`] - Strongly-typed resource identifiers
//! - [`types`] - Service catalog types
//! - [`query`] - Query string builder

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod continuation;
pub mod envelope;
pub mod error;
pub mod extensions;
pub mod http;
pub mod ids;
pub mod pagination;
pub mod poll;
pub mod query;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use client::{ServiceClient, ServiceClientBuilder};
pub use continuation::Outcome;
pub use error::{Error, Result};
pub use pagination::{Advance, CollectionRequest, Page};
pub use poll::{PollOutcome, PollSpec, Pollable};
pub use status::ResourceStatus;
pub use tokio_util::sync::CancellationToken;
