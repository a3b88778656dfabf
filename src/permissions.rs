//! Permission registry — acquisition state of the capabilities the assistant
//! needs before it can make proactive suggestions.

use serde::{Deserialize, Serialize};

/// A named external integration the user must authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    AccountLink,
    Location,
    Notifications,
}

impl Capability {
    /// Every recognized capability, in prompt order.
    pub const ALL: [Capability; 3] = [
        Capability::AccountLink,
        Capability::Location,
        Capability::Notifications,
    ];

    /// Human-readable name used in chat messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AccountLink => "Google account",
            Self::Location => "location",
            Self::Notifications => "notifications",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::AccountLink => 0,
            Self::Location => 1,
            Self::Notifications => 2,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccountLink => write!(f, "account-link"),
            Self::Location => write!(f, "location"),
            Self::Notifications => write!(f, "notifications"),
        }
    }
}

impl std::str::FromStr for Capability {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "account-link" | "account" | "google" => Ok(Self::AccountLink),
            "location" => Ok(Self::Location),
            "notifications" | "notify" => Ok(Self::Notifications),
            _ => Err(format!("Unknown capability: {}", s)),
        }
    }
}

/// Acquisition status of a single capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    #[default]
    Idle,
    Pending,
    Granted,
    Denied,
}

impl PermissionStatus {
    /// Whether `self → target` follows the expected acquisition flow
    /// (idle → pending → granted/denied, with a reset back to idle).
    ///
    /// Advisory only: the registry itself accepts any write.
    pub fn can_transition_to(&self, target: PermissionStatus) -> bool {
        use PermissionStatus::*;
        matches!(
            (self, target),
            (Idle, Pending)
                | (Pending, Granted)
                | (Pending, Denied)
                | (Granted, Denied)
                | (Denied, Idle)
                | (Granted, Idle)
        )
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Denied => "denied",
        };
        write!(f, "{s}")
    }
}

/// Last-write-wins store of capability statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionRegistry {
    statuses: [PermissionStatus; 3],
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the status for `capability`. Returns the previous status.
    pub fn update(&mut self, capability: Capability, status: PermissionStatus) -> PermissionStatus {
        std::mem::replace(&mut self.statuses[capability.index()], status)
    }

    pub fn status(&self, capability: Capability) -> PermissionStatus {
        self.statuses[capability.index()]
    }

    /// True once every capability has been granted.
    pub fn all_granted(&self) -> bool {
        self.statuses
            .iter()
            .all(|s| *s == PermissionStatus::Granted)
    }

    /// Iterate `(capability, status)` pairs in prompt order.
    pub fn iter(&self) -> impl Iterator<Item = (Capability, PermissionStatus)> + '_ {
        Capability::ALL.iter().map(|c| (*c, self.status(*c)))
    }
}

impl Serialize for PermissionRegistry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(Capability::ALL.len()))?;
        for (capability, status) in self.iter() {
            map.serialize_entry(&capability, &status)?;
        }
        map.end()
    }
}
