//! Hubs, users and the records that tie devices to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

use super::device::{Device, DeviceId};
use crate::error::DomainError;

crate::define_id_type!(HubId);
crate::define_id_type!(UserId);

/// Prefix shared by every hub identifier.
pub const HUB_ID_PREFIX: &str = "HUB_";

pub const DEFAULT_HUB_NAME: &str = "Default Hub";

impl HubId {
    /// Generate a fresh `HUB_<uuid>` identifier.
    pub fn generate() -> Self {
        Self(format!("{}{}", HUB_ID_PREFIX, Uuid::new_v4()))
    }
}

/// True when the raw identifier names a hub rather than a device.
pub fn is_hub_id(id: &str) -> bool {
    id.starts_with(HUB_ID_PREFIX)
}

/// Stored hub type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HubType {
    #[default]
    #[serde(rename = "HUB_R")]
    Residential,
}

impl HubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "HUB_R",
        }
    }
}

/// Hub flavour requested at commissioning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HubVariant {
    #[default]
    Residential,
    Manager,
}

impl HubVariant {
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::Residential => "HUB_R",
            Self::Manager => "HUB_M",
        }
    }
}

impl FromStr for HubVariant {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RESIDENTIAL" | "HUB_R" => Ok(Self::Residential),
            "MANAGER" | "HUB_M" => Ok(Self::Manager),
            other => Err(DomainError::validation(format!(
                "Unknown hub variant: {}",
                other
            ))),
        }
    }
}

fn default_hub_name() -> String {
    DEFAULT_HUB_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hub {
    pub id: HubId,
    #[serde(rename = "type", default)]
    pub hub_type: HubType,
    #[serde(default = "default_hub_name")]
    pub name: String,
    #[serde(default)]
    pub owner: Option<UserId>,
    #[serde(default)]
    pub shared_with: Vec<UserId>,
    #[serde(default)]
    pub devices: Vec<DeviceId>,
}

impl Hub {
    /// Unowned residential hub with no devices.
    pub fn new(id: HubId, name: Option<String>) -> Self {
        Self {
            id,
            hub_type: HubType::Residential,
            name: name.unwrap_or_else(default_hub_name),
            owner: None,
            shared_with: Vec::new(),
            devices: Vec::new(),
        }
    }

    pub fn has_access(&self, user: &UserId) -> bool {
        self.owner.as_ref() == Some(user) || self.shared_with.contains(user)
    }

    pub fn contains_device(&self, device: &DeviceId) -> bool {
        self.devices.contains(device)
    }
}

/// A registered user and the hubs they can reach.
///
/// Profile fields other than the hub bookkeeping are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub default_hub_id: Option<HubId>,
    #[serde(default)]
    pub hubs_access: Vec<HubId>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl User {
    pub fn new(id: UserId, profile: Map<String, Value>) -> Self {
        Self {
            id,
            default_hub_id: None,
            hubs_access: Vec::new(),
            profile,
        }
    }

    /// Record access to `hub`, making it the default when none is set.
    pub fn grant_hub(&mut self, hub: &HubId) {
        if !self.hubs_access.contains(hub) {
            self.hubs_access.push(hub.clone());
        }
        if self.default_hub_id.is_none() {
            self.default_hub_id = Some(hub.clone());
        }
    }
}

/// Record placed in the free pool by commissioning.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolItem {
    Device(Device),
    Hub(Hub),
}

/// Free-form status report appended to a device's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hub_defaults_from_json() {
        let hub: Hub = serde_json::from_value(json!({ "id": "HUB_1" })).unwrap();
        assert_eq!(hub.hub_type, HubType::Residential);
        assert_eq!(hub.name, DEFAULT_HUB_NAME);
        assert!(hub.owner.is_none());
        assert!(hub.devices.is_empty());

        let value = serde_json::to_value(&hub).unwrap();
        assert_eq!(value["type"], "HUB_R");
    }

    #[test]
    fn test_hub_access() {
        let mut hub = Hub::new(HubId::generate(), None);
        let owner = UserId::from("alice");
        let guest = UserId::from("bob");
        assert!(!hub.has_access(&owner));

        hub.owner = Some(owner.clone());
        hub.shared_with.push(guest.clone());
        assert!(hub.has_access(&owner));
        assert!(hub.has_access(&guest));
        assert!(!hub.has_access(&UserId::from("carol")));
    }

    #[test]
    fn test_is_hub_id() {
        assert!(is_hub_id(HubId::generate().as_str()));
        assert!(!is_hub_id("DEV_123"));
    }

    #[test]
    fn test_user_keeps_profile_fields() {
        let user: User = serde_json::from_value(json!({
            "id": "u1",
            "email": "u1@example.com"
        }))
        .unwrap();
        assert_eq!(user.profile["email"], "u1@example.com");
        assert!(user.hubs_access.is_empty());
    }

    #[test]
    fn test_grant_hub_sets_default_once() {
        let mut user = User::new(UserId::from("u1"), Map::new());
        let first = HubId::from("HUB_a");
        let second = HubId::from("HUB_b");
        user.grant_hub(&first);
        user.grant_hub(&second);
        user.grant_hub(&first);
        assert_eq!(user.hubs_access, vec![first.clone(), second]);
        assert_eq!(user.default_hub_id, Some(first));
    }

    #[test]
    fn test_hub_variant_parse() {
        assert_eq!("residential".parse::<HubVariant>().unwrap(), HubVariant::Residential);
        assert_eq!("HUB_M".parse::<HubVariant>().unwrap(), HubVariant::Manager);
        assert!("castle".parse::<HubVariant>().is_err());
    }
}
