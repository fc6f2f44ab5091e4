//! Normalized records shared by the sync engine and the devices consuming its events.
//!
//! Every field of [`StateData`] is optional: `None` means "no information this
//! cycle" and consumers must leave the corresponding capability untouched.

use crate::models::tado::{
    AirConditioningMode, BatteryState, FanLevel, FanSpeed, HomeId, HorizontalSwing, Light, Swing, VerticalSwing,
    ZoneId, ZoneType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const HOT_WATER_SUFFIX: &str = "-HOT_WATER";

/// A logical device known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub home_id: HomeId,
    pub zone_id: ZoneId,
    pub zone_type: ZoneType,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>, home_id: HomeId, zone_id: ZoneId, zone_type: ZoneType) -> Self {
        DeviceRecord {
            id: id.into(),
            home_id,
            zone_id,
            zone_type,
        }
    }
}

/// Id of the hot-water sub-device sharing `serial` with its thermostat.
pub fn hot_water_device_id(serial: &str) -> String {
    format!("{serial}{HOT_WATER_SUFFIX}")
}

/// One physical device as seen in a zone listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneMembership {
    pub id: String,
    pub zone_id: ZoneId,
    pub zone_type: ZoneType,
    pub connection_state: bool,
    pub battery_state: Option<BatteryState>,
}

/// Payload of a zone-data event, keyed by membership id.
pub type ZoneData = BTreeMap<String, ZoneMembership>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverlayMode {
    Manual,
    Timer,
    TadoMode,
}

impl OverlayMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "MANUAL" => Some(OverlayMode::Manual),
            "TIMER" => Some(OverlayMode::Timer),
            "TADO_MODE" => Some(OverlayMode::TadoMode),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcMode {
    Off,
    Cool,
    Heat,
    Dry,
    Fan,
    Auto,
}

impl From<AirConditioningMode> for AcMode {
    fn from(value: AirConditioningMode) -> Self {
        match value {
            AirConditioningMode::Auto => AcMode::Auto,
            AirConditioningMode::Cool => AcMode::Cool,
            AirConditioningMode::Heat => AcMode::Heat,
            AirConditioningMode::Dry => AcMode::Dry,
            AirConditioningMode::Fan => AcMode::Fan,
        }
    }
}

impl AcMode {
    /// The API mode this maps to; `None` for `Off`.
    pub fn api_mode(self) -> Option<AirConditioningMode> {
        match self {
            AcMode::Off => None,
            AcMode::Cool => Some(AirConditioningMode::Cool),
            AcMode::Heat => Some(AirConditioningMode::Heat),
            AcMode::Dry => Some(AirConditioningMode::Dry),
            AcMode::Fan => Some(AirConditioningMode::Fan),
            AcMode::Auto => Some(AirConditioningMode::Auto),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub target_temperature: Option<f64>,
    pub measure_temperature: Option<f64>,
    pub measure_humidity: Option<f64>,
    pub power: Option<bool>,
    pub overlay: Option<OverlayMode>,
    pub ac_mode: Option<AcMode>,
    pub fan_speed: Option<FanSpeed>,
    pub fan_level: Option<FanLevel>,
    pub swing: Option<Swing>,
    pub vertical_swing: Option<VerticalSwing>,
    pub horizontal_swing: Option<HorizontalSwing>,
    pub light: Option<Light>,
    pub open_window_detected: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStateRecord {
    pub home_id: HomeId,
    pub zone_id: ZoneId,
    pub data: StateData,
}
