//! Opaque, collision-resistant identifiers for every entity in the data model.
//!
//! Spec §6 only requires ids to be "collision-resistant within the process
//! lifetime"; `uuid::Uuid::new_v4()` satisfies that directly, the way
//! `hut8-soar` uses `uuid` for its own opaque row identities.

use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, uuid::Uuid::new_v4()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(PassengerId, "pax");
opaque_id!(PoolId, "pool");
opaque_id!(WaypointId, "wp");
opaque_id!(SurgeZoneId, "zone");

/// Identity of a lease holder — any independent actor able to contend for a
/// pool lease (a matcher tick, a cancellation request, ...). Not a UUID by
/// construction since callers often want a meaningful label ("matcher-1").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderId(pub String);

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HolderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HolderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
