//! Service catalog types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::client::{
    BLOCK_STORAGE_DEFAULT_TIMEOUT, COMPUTE_DEFAULT_TIMEOUT, IDENTITY_DEFAULT_TIMEOUT,
    IMAGE_DEFAULT_TIMEOUT, NETWORK_DEFAULT_TIMEOUT,
};
use crate::error::{Error, Result};

/// Services exposed by the remote infrastructure API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// Servers, flavors and images as seen by compute
    Compute,
    /// Image registry
    Image,
    /// Volumes and volume snapshots
    BlockStorage,
    /// Networks and ports
    Network,
    /// Tokens and catalog
    Identity,
}

impl ServiceType {
    /// Returns the catalog type string for the service.
    #[must_use]
    pub const fn catalog_type(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Image => "image",
            Self::BlockStorage => "volumev3",
            Self::Network => "network",
            Self::Identity => "identity",
        }
    }

    /// Returns all known services.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Compute,
            Self::Image,
            Self::BlockStorage,
            Self::Network,
            Self::Identity,
        ]
    }

    /// Default request timeout for the service.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        let secs = match self {
            Self::Compute => COMPUTE_DEFAULT_TIMEOUT,
            Self::Image => IMAGE_DEFAULT_TIMEOUT,
            Self::BlockStorage => BLOCK_STORAGE_DEFAULT_TIMEOUT,
            Self::Network => NETWORK_DEFAULT_TIMEOUT,
            Self::Identity => IDENTITY_DEFAULT_TIMEOUT,
        };
        Duration::from_secs(secs)
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compute" => Ok(Self::Compute),
            "image" => Ok(Self::Image),
            "volume" | "volumev3" | "block-storage" => Ok(Self::BlockStorage),
            "network" => Ok(Self::Network),
            "identity" => Ok(Self::Identity),
            _ => Err(Error::ConfigError(format!("Unknown service type: {s}"))),
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.catalog_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_round_trip() {
        for service in ServiceType::all() {
            let parsed: ServiceType = service.catalog_type().parse().unwrap();
            assert_eq!(&parsed, service);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            "VOLUME".parse::<ServiceType>().unwrap(),
            ServiceType::BlockStorage
        );
        assert!("object-store".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_default_timeouts() {
        assert_eq!(
            ServiceType::Image.default_timeout(),
            Duration::from_secs(IMAGE_DEFAULT_TIMEOUT)
        );
        assert!(ServiceType::Image.default_timeout() > ServiceType::Identity.default_timeout());
    }

    #[test]
    fn test_display() {
        assert_eq!(ServiceType::BlockStorage.to_string(), "volumev3");
    }
}
