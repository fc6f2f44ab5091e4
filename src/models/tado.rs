//! Models for the subset of the Tado v2 API this crate talks to.
//!
//! Scope: types only, no API client code.
//!
//! Notes
//! - Every field is optional; the API omits fields freely depending on zone type.
//! - Request bodies (`ZoneOverlay`, `WebhookInput`) skip `None` fields when serialized,
//!   the API rejects explicit nulls in overlay settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i64);

/// Remote webhook id. The API hands out numbers, but it is only ever echoed back
/// into a URL path, so it is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WebhookId(pub String);

impl<'de> Deserialize<'de> for WebhookId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => WebhookId(n.to_string()),
            Raw::Text(s) => WebhookId(s),
        })
    }
}

impl core::fmt::Display for WebhookId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceType(pub String); // e.g. RU02, VA02, WR02, BU01

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneOverlayType(pub String); // only known value MANUAL

// =====================
// Core enums
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirConditioningMode {
    Auto,
    Cool,
    Heat,
    Dry,
    Fan,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryState {
    Low,
    Normal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanLevel {
    Auto,
    Level1,
    Level2,
    Level3,
    Level4,
    Level5,
    Silent,
}

/// Pre-v1.0 AC fan setting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanSpeed {
    Auto,
    High,
    Middle,
    Low,
}

/// Pre-v1.0 AC swing setting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Swing {
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "ON")]
    On,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HorizontalSwing {
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "RIGHT")]
    Right,
    #[serde(rename = "LEFT")]
    Left,
    #[serde(rename = "MID")]
    Mid,
    #[serde(rename = "MID_RIGHT")]
    MidRight,
    #[serde(rename = "MID_LEFT")]
    MidLeft,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerticalSwing {
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "MID_UP")]
    MidUp,
    #[serde(rename = "MID_DOWN")]
    MidDown,
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "MID")]
    Mid,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Light {
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "ON")]
    On,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Power {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HomePresence {
    Home,
    Away,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneOverlayTerminationType {
    Manual,
    TadoMode,
    Timer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneType {
    AirConditioning,
    Heating,
    HotWater,
}

// =====================
// Datapoints
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Temperature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Option<f64>,
}

impl Temperature {
    pub fn celsius(value: f64) -> Self {
        Temperature {
            celsius: Some(value),
            fahrenheit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureDataPoint {
    pub celsius: Option<f64>,
    pub fahrenheit: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub r#type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PercentageDataPoint {
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    pub percentage: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SensorDataPoints {
    pub inside_temperature: Option<TemperatureDataPoint>,
    pub humidity: Option<PercentageDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDataPoints {
    pub heating_power: Option<PercentageDataPoint>,
}

// =====================
// Capabilities
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TemperatureRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TemperatureCapability {
    pub celsius: Option<TemperatureRange>,
    pub fahrenheit: Option<TemperatureRange>,
}

/// Per-mode capability block of an AC zone. Older units report `fanSpeeds`/`swings`,
/// v1.0 units report `fanLevel` and the split swings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AirConditioningModeCapabilities {
    pub temperatures: Option<TemperatureCapability>,
    pub fan_speeds: Option<Vec<FanSpeed>>,
    pub swings: Option<Vec<Swing>>,
    pub fan_level: Option<Vec<FanLevel>>,
    pub vertical_swing: Option<Vec<VerticalSwing>>,
    pub horizontal_swing: Option<Vec<HorizontalSwing>>,
    pub light: Option<Vec<Light>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCapabilities {
    pub r#type: Option<ZoneType>,
    pub temperatures: Option<TemperatureCapability>,
    pub can_set_temperature: Option<bool>,
    #[serde(rename = "AUTO")]
    pub auto: Option<AirConditioningModeCapabilities>,
    #[serde(rename = "HEAT")]
    pub heat: Option<AirConditioningModeCapabilities>,
    #[serde(rename = "FAN")]
    pub fan: Option<AirConditioningModeCapabilities>,
    #[serde(rename = "COOL")]
    pub cool: Option<AirConditioningModeCapabilities>,
    #[serde(rename = "DRY")]
    pub dry: Option<AirConditioningModeCapabilities>,
}

impl ZoneCapabilities {
    pub fn for_mode(&self, mode: AirConditioningMode) -> Option<&AirConditioningModeCapabilities> {
        match mode {
            AirConditioningMode::Auto => self.auto.as_ref(),
            AirConditioningMode::Heat => self.heat.as_ref(),
            AirConditioningMode::Fan => self.fan.as_ref(),
            AirConditioningMode::Cool => self.cool.as_ref(),
            AirConditioningMode::Dry => self.dry.as_ref(),
        }
    }

    pub fn ac_modes(&self) -> impl Iterator<Item = &AirConditioningModeCapabilities> {
        [&self.cool, &self.heat, &self.dry, &self.fan, &self.auto]
            .into_iter()
            .filter_map(|m| m.as_ref())
    }

    pub fn celsius_range(&self) -> Option<&TemperatureRange> {
        self.temperatures.as_ref().and_then(|t| t.celsius.as_ref())
    }
}

// =====================
// Devices
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConnectionState {
    pub value: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_type: Option<DeviceType>,
    pub serial_no: Option<DeviceId>,
    pub short_serial_no: Option<String>,
    pub current_fw_version: Option<String>,
    pub connection_state: Option<DeviceConnectionState>,
    pub battery_state: Option<BatteryState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExtra {
    #[serde(flatten)]
    pub device: Device,
    pub duties: Option<Vec<String>>,
}

// =====================
// Homes, users
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HomeBase {
    pub id: Option<HomeId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub id: Option<String>,
    pub homes: Option<Vec<HomeBase>>,
}

// =====================
// Zones
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOpenWindowDetection {
    pub supported: Option<bool>,
    pub enabled: Option<bool>,
    pub timeout_in_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: Option<ZoneId>,
    pub name: Option<String>,
    pub r#type: Option<ZoneType>,
    pub date_created: Option<DateTime<Utc>>,
    pub device_types: Option<Vec<DeviceType>>,
    pub devices: Option<Vec<DeviceExtra>>,
    pub open_window_detection: Option<ZoneOpenWindowDetection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ZoneType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Temperature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AirConditioningMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed: Option<FanSpeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_level: Option<FanLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swing: Option<Swing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_swing: Option<VerticalSwing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_swing: Option<HorizontalSwing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<Light>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_boost: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOverlayTermination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ZoneOverlayTerminationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time_in_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOverlay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ZoneOverlayType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<ZoneSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<ZoneOverlayTermination>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOpenWindow {
    pub detected_time: Option<DateTime<Utc>>,
    pub duration_in_seconds: Option<i64>,
    pub expiry: Option<DateTime<Utc>>,
    pub remaining_time_in_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStateLink {
    pub state: Option<String>, // ONLINE/OFFLINE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneState {
    pub tado_mode: Option<HomePresence>,
    pub setting: Option<ZoneSetting>,
    pub overlay_type: Option<ZoneOverlayType>,
    pub overlay: Option<ZoneOverlay>,
    pub open_window: Option<ZoneOpenWindow>,
    pub open_window_detected: Option<bool>,
    pub link: Option<ZoneStateLink>,
    pub activity_data_points: Option<ActivityDataPoints>,
    pub sensor_data_points: Option<SensorDataPoints>,
}

// =====================
// Webhooks
// =====================

/// Events every registered hook subscribes to.
pub const WEBHOOK_EVENTS: [&str; 4] = ["overlayType", "setting", "insideTemperature", "humidity"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: Option<WebhookId>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInput {
    pub events: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WebhookHome {
    pub id: Option<HomeId>,
}

/// Inbound delivery from a registered hook. Every part is optional so that
/// incomplete deliveries reach the engine's own validation. `overlayType: null`
/// is meaningful (the zone returned to its schedule), hence the nested option.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub home: Option<WebhookHome>,
    pub zone: Option<Zone>,
    pub inside_temperature: Option<TemperatureDataPoint>,
    pub humidity: Option<PercentageDataPoint>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub overlay_type: Option<Option<ZoneOverlayType>>,
    pub setting: Option<ZoneSetting>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_overlay_type_distinguishes_null_from_absent() {
        let absent: WebhookEvent = serde_json::from_str(r#"{"home":{"id":1}}"#).unwrap();
        assert_eq!(absent.overlay_type, None);

        let null: WebhookEvent = serde_json::from_str(r#"{"home":{"id":1},"overlayType":null}"#).unwrap();
        assert_eq!(null.overlay_type, Some(None));

        let manual: WebhookEvent = serde_json::from_str(r#"{"home":{"id":1},"overlayType":"MANUAL"}"#).unwrap();
        assert_eq!(manual.overlay_type, Some(Some(ZoneOverlayType("MANUAL".into()))));
    }

    #[test]
    fn webhook_id_accepts_numbers_and_strings() {
        let hooks: Vec<Webhook> = serde_json::from_str(r#"[{"id":42,"url":"a"},{"id":"43","url":"b"}]"#).unwrap();
        assert_eq!(hooks[0].id, Some(WebhookId("42".into())));
        assert_eq!(hooks[1].id, Some(WebhookId("43".into())));
    }

    #[test]
    fn overlay_request_omits_unset_fields() {
        let overlay = ZoneOverlay {
            r#type: None,
            setting: Some(ZoneSetting {
                r#type: Some(ZoneType::Heating),
                power: Some(Power::On),
                temperature: Some(Temperature::celsius(21.5)),
                ..Default::default()
            }),
            termination: Some(ZoneOverlayTermination {
                r#type: Some(ZoneOverlayTerminationType::Timer),
                duration_in_seconds: Some(1800),
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&overlay).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 21.5}},
                "termination": {"type": "TIMER", "durationInSeconds": 1800}
            })
        );
    }

    #[test]
    fn zone_capabilities_expose_ac_modes() {
        let caps: ZoneCapabilities = serde_json::from_str(
            r#"{"type":"AIR_CONDITIONING",
                "COOL":{"temperatures":{"celsius":{"min":18,"max":30,"step":1.0}},"fanLevel":["LEVEL1","AUTO"]},
                "FAN":{"fanLevel":["LEVEL1"]}}"#,
        )
        .unwrap();
        assert_eq!(caps.ac_modes().count(), 2);
        let cool = caps.for_mode(AirConditioningMode::Cool).unwrap();
        assert_eq!(cool.fan_level.as_deref(), Some(&[FanLevel::Level1, FanLevel::Auto][..]));
        assert!(caps.for_mode(AirConditioningMode::Heat).is_none());
    }
}
