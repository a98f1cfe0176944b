//! Resource status vocabulary.
//!
//! Statuses are server-extensible strings. Well-known values get their own
//! variant; anything else is kept verbatim in [`ResourceStatus::Unknown`] and
//! compared by value, ignoring ASCII case.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

macro_rules! statuses {
    ($($(#[$meta:meta])* $variant:ident => $name:literal,)+) => {
        /// Status of a remote resource (server, image, volume, snapshot).
        #[derive(Debug, Clone, Eq)]
        pub enum ResourceStatus {
            $($(#[$meta])* $variant,)+
            /// A status this crate does not know about, kept as sent.
            Unknown(String),
        }

        impl ResourceStatus {
            /// Canonical wire form of the status.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $name,)+
                    Self::Unknown(raw) => raw,
                }
            }

            fn well_known(value: &str) -> Option<Self> {
                $(if value.eq_ignore_ascii_case($name) {
                    return Some(Self::$variant);
                })+
                None
            }
        }
    };
}

statuses! {
    /// Resource is running and usable
    Active => "ACTIVE",
    /// Resource is being built
    Build => "BUILD",
    /// Resource failed
    Error => "ERROR",
    /// Resource was deleted
    Deleted => "DELETED",
    /// Resource was soft-deleted and may be restored
    SoftDeleted => "SOFT_DELETED",
    /// Server is powered off
    Shutoff => "SHUTOFF",
    /// Server is paused
    Paused => "PAUSED",
    /// Server is suspended
    Suspended => "SUSPENDED",
    /// Server is rebooting
    Reboot => "REBOOT",
    /// Server is hard rebooting
    HardReboot => "HARD_REBOOT",
    /// Server is being rebuilt
    Rebuild => "REBUILD",
    /// Server is resizing
    Resize => "RESIZE",
    /// Server resize awaits confirmation
    VerifyResize => "VERIFY_RESIZE",
    /// Server is migrating
    Migrating => "MIGRATING",
    /// Image upload is queued
    Queued => "QUEUED",
    /// Image is being saved
    Saving => "SAVING",
    /// Image upload was killed
    Killed => "KILLED",
    /// Image deletion is pending
    PendingDelete => "PENDING_DELETE",
    /// Volume or snapshot is ready
    Available => "AVAILABLE",
    /// Volume or snapshot is being created
    Creating => "CREATING",
    /// Volume or snapshot is being deleted
    Deleting => "DELETING",
    /// Volume is attached
    InUse => "IN-USE",
    /// Volume is attaching
    Attaching => "ATTACHING",
    /// Volume is detaching
    Detaching => "DETACHING",
    /// Deletion failed
    ErrorDeleting => "ERROR_DELETING",
    /// Volume is being restored from backup
    Restoring => "RESTORING",
}

impl ResourceStatus {
    /// Parse a status, falling back to [`ResourceStatus::Unknown`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::well_known(value).unwrap_or_else(|| Self::Unknown(value.to_string()))
    }

    /// True when the status was not recognized.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl PartialEq for ResourceStatus {
    fn eq(&self, other: &Self) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl Hash for ResourceStatus {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.as_str().bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl FromStr for ResourceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for ResourceStatus {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_lowercase())
    }
}

impl Serialize for ResourceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
