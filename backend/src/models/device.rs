//! Smart device model and its local control rules.
//!
//! A [`Device`] carries the fields every device shares plus a [`DeviceKind`]
//! holding the type-specific settings. The JSON form is flat: `type` is the
//! discriminator and the kind fields sit next to the common ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::hub::HubId;
use crate::error::{DomainError, DomainResult};

crate::define_id_type!(DeviceId);

impl DeviceId {
    /// Generate a fresh `DEV_<uuid>` identifier.
    pub fn generate() -> Self {
        Self(format!("DEV_{}", Uuid::new_v4()))
    }
}

/// Default rating of a smart bulb in watts.
pub const DEFAULT_LIGHT_RATING: f64 = 10.0;
/// Default rating of a thermostat in watts.
pub const DEFAULT_THERMOSTAT_RATING: f64 = 1000.0;

pub const MIN_TARGET_TEMP: f64 = 10.0;
pub const MAX_TARGET_TEMP: f64 = 30.0;

/// Temperature differential at which a thermostat draws its full rating.
const FULL_POWER_DIFFERENTIAL: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Light,
    Thermostat,
    Plug,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "LIGHT",
            Self::Thermostat => "THERMOSTAT",
            Self::Plug => "PLUG",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LIGHT" => Ok(Self::Light),
            "THERMOSTAT" => Ok(Self::Thermostat),
            "PLUG" => Ok(Self::Plug),
            other => Err(DomainError::validation(format!(
                "Unknown device type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThermostatMode {
    Heat,
    Cool,
    Off,
}

impl FromStr for ThermostatMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HEAT" => Ok(Self::Heat),
            "COOL" => Ok(Self::Cool),
            "OFF" => Ok(Self::Off),
            other => Err(DomainError::validation(format!(
                "Invalid thermostat mode: {} (expected HEAT, COOL or OFF)",
                other
            ))),
        }
    }
}

fn default_brightness() -> u8 {
    100
}

fn default_color() -> String {
    "#FFFFFF".to_string()
}

fn default_current_temp() -> f64 {
    20.0
}

fn default_target_temp() -> f64 {
    22.0
}

fn default_mode() -> ThermostatMode {
    ThermostatMode::Heat
}

/// Type-specific device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum DeviceKind {
    Light {
        #[serde(default = "default_brightness")]
        brightness: u8,
        #[serde(default = "default_color")]
        color: String,
    },
    Thermostat {
        #[serde(default = "default_current_temp")]
        current_temp: f64,
        #[serde(default = "default_target_temp")]
        target_temp: f64,
        #[serde(default = "default_mode")]
        mode: ThermostatMode,
    },
}

impl DeviceKind {
    /// Nameplate rating assumed when a stored record has none.
    pub fn default_rating(&self) -> f64 {
        match self {
            Self::Light { .. } => DEFAULT_LIGHT_RATING,
            Self::Thermostat { .. } => DEFAULT_THERMOSTAT_RATING,
        }
    }
}

/// A commissioned smart device as stored in the document repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DeviceRecord")]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub hub_id: Option<HubId>,
    #[serde(default)]
    pub state: bool,
    /// Instantaneous draw in watts.
    #[serde(default)]
    pub power_usage: f64,
    /// Nameplate rating in watts.
    pub power_rating: f64,
    #[serde(flatten)]
    pub kind: DeviceKind,
}

/// Stored form of a [`Device`]; a missing rating falls back to the kind's.
#[derive(Deserialize)]
struct DeviceRecord {
    id: DeviceId,
    name: String,
    #[serde(default)]
    hub_id: Option<HubId>,
    #[serde(default)]
    state: bool,
    #[serde(default)]
    power_usage: f64,
    #[serde(default)]
    power_rating: Option<f64>,
    #[serde(flatten)]
    kind: DeviceKind,
}

impl From<DeviceRecord> for Device {
    fn from(record: DeviceRecord) -> Self {
        let power_rating = record
            .power_rating
            .unwrap_or_else(|| record.kind.default_rating());
        Self {
            id: record.id,
            name: record.name,
            hub_id: record.hub_id,
            state: record.state,
            power_usage: record.power_usage,
            power_rating,
            kind: record.kind,
        }
    }
}

/// Snapshot of a device published on the telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub device_id: DeviceId,
    pub name: String,
    pub state: bool,
    pub power_usage: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DeviceKind,
}

/// Round to one decimal place, ties to even.
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

fn default_name(device_type: DeviceType) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..5].to_uppercase();
    format!("{}_{}", device_type, suffix)
}

impl Device {
    /// Build a fresh, switched-off device with default settings.
    ///
    /// Only lights and thermostats can be built; plugs are rejected.
    pub fn new(device_type: DeviceType) -> DomainResult<Self> {
        let (kind, power_rating) = match device_type {
            DeviceType::Light => (
                DeviceKind::Light {
                    brightness: default_brightness(),
                    color: default_color(),
                },
                DEFAULT_LIGHT_RATING,
            ),
            DeviceType::Thermostat => (
                DeviceKind::Thermostat {
                    current_temp: default_current_temp(),
                    target_temp: default_target_temp(),
                    mode: default_mode(),
                },
                DEFAULT_THERMOSTAT_RATING,
            ),
            DeviceType::Plug => {
                return Err(DomainError::unsupported(format!(
                    "Unsupported device type: {}",
                    device_type
                )))
            }
        };

        Ok(Self {
            id: DeviceId::generate(),
            name: default_name(device_type),
            hub_id: None,
            state: false,
            power_usage: 0.0,
            power_rating,
            kind,
        })
    }

    pub fn device_type(&self) -> DeviceType {
        match self.kind {
            DeviceKind::Light { .. } => DeviceType::Light,
            DeviceKind::Thermostat { .. } => DeviceType::Thermostat,
        }
    }

    /// Flip the power state and recompute the draw.
    ///
    /// A thermostat switched off goes to `OFF`; switched on it picks `HEAT`
    /// when the room is colder than the target and `COOL` otherwise.
    pub fn toggle_state(&mut self) {
        self.state = !self.state;
        let state = self.state;
        if let DeviceKind::Thermostat {
            current_temp,
            target_temp,
            mode,
        } = &mut self.kind
        {
            *mode = if !state {
                ThermostatMode::Off
            } else if *current_temp < *target_temp {
                ThermostatMode::Heat
            } else {
                ThermostatMode::Cool
            };
        }
        self.update_energy_usage();
    }

    /// Set the power state directly, as the toggle endpoint does.
    pub fn set_state(&mut self, state: bool) {
        self.state = state;
        self.update_energy_usage();
    }

    pub fn set_brightness(&mut self, value: i64) -> DomainResult<()> {
        match &mut self.kind {
            DeviceKind::Light { brightness, .. } => {
                *brightness = value.clamp(0, 100) as u8;
            }
            _ => return Err(self.wrong_kind("brightness")),
        }
        self.update_energy_usage();
        Ok(())
    }

    pub fn set_color(&mut self, value: &str) -> DomainResult<()> {
        let valid = value.len() == 7
            && value.starts_with('#')
            && value[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(DomainError::validation(format!(
                "Invalid colour '{}': expected #RRGGBB",
                value
            )));
        }
        match &mut self.kind {
            DeviceKind::Light { color, .. } => {
                *color = value.to_uppercase();
                Ok(())
            }
            _ => Err(self.wrong_kind("color")),
        }
    }

    pub fn set_target_temp(&mut self, value: f64) -> DomainResult<()> {
        match &mut self.kind {
            DeviceKind::Thermostat { target_temp, .. } => {
                *target_temp = round_one_decimal(value.clamp(MIN_TARGET_TEMP, MAX_TARGET_TEMP));
            }
            _ => return Err(self.wrong_kind("target_temp")),
        }
        self.update_energy_usage();
        Ok(())
    }

    pub fn set_mode(&mut self, value: ThermostatMode) -> DomainResult<()> {
        match &mut self.kind {
            DeviceKind::Thermostat { mode, .. } => *mode = value,
            _ => return Err(self.wrong_kind("mode")),
        }
        self.state = value != ThermostatMode::Off;
        self.update_energy_usage();
        Ok(())
    }

    pub fn update_current_temp(&mut self, value: f64) -> DomainResult<()> {
        match &mut self.kind {
            DeviceKind::Thermostat { current_temp, .. } => {
                *current_temp = round_one_decimal(value);
            }
            _ => return Err(self.wrong_kind("current_temp")),
        }
        self.update_energy_usage();
        Ok(())
    }

    /// Recompute `power_usage` from state and settings.
    pub fn update_energy_usage(&mut self) {
        self.power_usage = match &self.kind {
            DeviceKind::Light { brightness, .. } => {
                if self.state {
                    self.power_rating * (*brightness as f64 / 100.0)
                } else {
                    0.0
                }
            }
            DeviceKind::Thermostat {
                current_temp,
                target_temp,
                mode,
            } => {
                if !self.state || *mode == ThermostatMode::Off {
                    0.0
                } else {
                    let working = (*mode == ThermostatMode::Heat && current_temp < target_temp)
                        || (*mode == ThermostatMode::Cool && current_temp > target_temp);
                    if working {
                        let differential = (current_temp - target_temp).abs();
                        self.power_rating * (differential / FULL_POWER_DIFFERENTIAL).min(1.0)
                    } else {
                        0.0
                    }
                }
            }
        };
    }

    pub fn telemetry_message(&self, now: DateTime<Utc>) -> TelemetryMessage {
        TelemetryMessage {
            device_id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            power_usage: self.power_usage,
            timestamp: now,
            kind: self.kind.clone(),
        }
    }

    fn wrong_kind(&self, setting: &str) -> DomainError {
        DomainError::validation(format!(
            "Device {} ({}) has no '{}' setting",
            self.id,
            self.device_type(),
            setting
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Device {
        Device::new(DeviceType::Light).unwrap()
    }

    fn thermostat() -> Device {
        Device::new(DeviceType::Thermostat).unwrap()
    }

    #[test]
    fn test_new_light_defaults() {
        let device = light();
        assert!(device.id.as_str().starts_with("DEV_"));
        assert!(device.name.starts_with("LIGHT_"));
        assert_eq!(device.name.len(), "LIGHT_".len() + 5);
        assert!(!device.state);
        assert_eq!(device.power_rating, DEFAULT_LIGHT_RATING);
        assert_eq!(
            device.kind,
            DeviceKind::Light {
                brightness: 100,
                color: "#FFFFFF".to_string()
            }
        );
    }

    #[test]
    fn test_plug_is_unsupported() {
        let err = Device::new(DeviceType::Plug).unwrap_err();
        assert!(matches!(err, DomainError::Unsupported(_)));
    }

    #[test]
    fn test_light_energy_scales_with_brightness() {
        let mut device = light();
        device.toggle_state();
        assert_eq!(device.power_usage, 10.0);

        device.set_brightness(50).unwrap();
        assert_eq!(device.power_usage, 5.0);

        device.set_brightness(250).unwrap();
        assert!(matches!(device.kind, DeviceKind::Light { brightness: 100, .. }));

        device.set_brightness(-5).unwrap();
        assert_eq!(device.power_usage, 0.0);

        device.set_brightness(100).unwrap();
        device.toggle_state();
        assert_eq!(device.power_usage, 0.0);
    }

    #[test]
    fn test_set_color_validation() {
        let mut device = light();
        device.set_color("#ff00aa").unwrap();
        assert!(matches!(&device.kind, DeviceKind::Light { color, .. } if color == "#FF00AA"));

        assert!(device.set_color("ff00aa").is_err());
        assert!(device.set_color("#ff00a").is_err());
        assert!(device.set_color("#gg00aa").is_err());
    }

    #[test]
    fn test_thermostat_toggle_picks_mode() {
        let mut device = thermostat();
        // 20.0 < 22.0 -> heating at 2/5 of the rating
        device.toggle_state();
        assert!(device.state);
        assert!(matches!(device.kind, DeviceKind::Thermostat { mode: ThermostatMode::Heat, .. }));
        assert!((device.power_usage - 400.0).abs() < 1e-9);

        device.toggle_state();
        assert!(matches!(device.kind, DeviceKind::Thermostat { mode: ThermostatMode::Off, .. }));
        assert_eq!(device.power_usage, 0.0);

        device.update_current_temp(25.0).unwrap();
        device.toggle_state();
        assert!(matches!(device.kind, DeviceKind::Thermostat { mode: ThermostatMode::Cool, .. }));
        assert!((device.power_usage - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_thermostat_target_is_clamped_and_rounded() {
        let mut device = thermostat();
        device.set_target_temp(35.0).unwrap();
        assert!(matches!(device.kind, DeviceKind::Thermostat { target_temp, .. } if target_temp == 30.0));
        device.set_target_temp(21.26).unwrap();
        assert!(matches!(device.kind, DeviceKind::Thermostat { target_temp, .. } if target_temp == 21.3));
        device.set_target_temp(2.0).unwrap();
        assert!(matches!(device.kind, DeviceKind::Thermostat { target_temp, .. } if target_temp == 10.0));
    }

    #[test]
    fn test_half_tenths_round_to_even() {
        let mut device = thermostat();
        device.set_target_temp(21.25).unwrap();
        assert!(matches!(device.kind, DeviceKind::Thermostat { target_temp, .. } if target_temp == 21.2));
        device.set_target_temp(20.75).unwrap();
        assert!(matches!(device.kind, DeviceKind::Thermostat { target_temp, .. } if target_temp == 20.8));
        device.update_current_temp(18.25).unwrap();
        assert!(matches!(device.kind, DeviceKind::Thermostat { current_temp, .. } if current_temp == 18.2));
    }

    #[test]
    fn test_thermostat_caps_at_full_rating() {
        let mut device = thermostat();
        device.set_mode(ThermostatMode::Heat).unwrap();
        assert!(device.state);
        device.update_current_temp(5.0).unwrap();
        assert_eq!(device.power_usage, 1000.0);

        // Heating a room that is already warm enough draws nothing
        device.update_current_temp(23.0).unwrap();
        assert_eq!(device.power_usage, 0.0);

        device.set_mode(ThermostatMode::Off).unwrap();
        assert!(!device.state);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let mut device = light();
        assert!(device.set_mode(ThermostatMode::Cool).is_err());
        let mut device = thermostat();
        assert!(device.set_brightness(10).is_err());
        assert!(device.set_color("#000000").is_err());
    }

    #[test]
    fn test_json_shape_is_flat() {
        let device = light();
        let value = serde_json::to_value(&device).unwrap();
        assert_eq!(value["type"], "LIGHT");
        assert_eq!(value["brightness"], 100);
        assert_eq!(value["color"], "#FFFFFF");
        assert_eq!(value["power_rating"], 10.0);
        assert!(value["hub_id"].is_null());

        let back: Device = serde_json::from_value(value).unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn test_thermostat_json_fills_defaults() {
        let value = serde_json::json!({
            "id": "DEV_x",
            "name": "THERMOSTAT_ABCDE",
            "type": "THERMOSTAT",
            "power_rating": 1000.0
        });
        let device: Device = serde_json::from_value(value).unwrap();
        assert_eq!(device.device_type(), DeviceType::Thermostat);
        assert_eq!(
            device.kind,
            DeviceKind::Thermostat {
                current_temp: 20.0,
                target_temp: 22.0,
                mode: ThermostatMode::Heat
            }
        );
    }

    #[test]
    fn test_missing_rating_defaults_by_kind() {
        let light: Device = serde_json::from_value(serde_json::json!({
            "id": "DEV_l",
            "name": "LIGHT_ABCDE",
            "type": "LIGHT",
            "state": true
        }))
        .unwrap();
        assert_eq!(light.power_rating, DEFAULT_LIGHT_RATING);

        let thermostat: Device = serde_json::from_value(serde_json::json!({
            "id": "DEV_t",
            "name": "THERMOSTAT_ABCDE",
            "type": "THERMOSTAT"
        }))
        .unwrap();
        assert_eq!(thermostat.power_rating, DEFAULT_THERMOSTAT_RATING);

        let custom: Device = serde_json::from_value(serde_json::json!({
            "id": "DEV_c",
            "name": "LIGHT_CUSTOM",
            "type": "LIGHT",
            "power_rating": 60.0
        }))
        .unwrap();
        assert_eq!(custom.power_rating, 60.0);
    }

    #[test]
    fn test_telemetry_message_contains_kind_fields() {
        let device = light();
        let msg = device.telemetry_message(Utc::now());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["device_id"], device.id.as_str());
        assert_eq!(value["type"], "LIGHT");
        assert_eq!(value["brightness"], 100);
        assert!(value.get("power_rating").is_none());
    }

    #[test]
    fn test_device_type_parsing() {
        assert_eq!("light".parse::<DeviceType>().unwrap(), DeviceType::Light);
        assert_eq!("THERMOSTAT".parse::<DeviceType>().unwrap(), DeviceType::Thermostat);
        assert!("toaster".parse::<DeviceType>().is_err());
        assert_eq!("cool".parse::<ThermostatMode>().unwrap(), ThermostatMode::Cool);
    }
}
