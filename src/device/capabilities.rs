//! Hub capability changes to Tado overlay requests, per product line.

use crate::client::TadoClientError;
use crate::host::{CapabilityValue, DeviceHost, DeviceSettings, HostError, store_get};
use crate::models::state::{AcMode, OverlayMode};
use crate::models::tado::{
    FanLevel, FanSpeed, HorizontalSwing, Light, Power, Swing, Temperature, TemperatureRange, VerticalSwing,
    ZoneCapabilities, ZoneOverlay, ZoneOverlayTermination, ZoneOverlayTerminationType, ZoneSetting, ZoneType,
};
use crate::utils::{parse_enum_name, serde_enum_name};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TARGET_TEMPERATURE: &str = "target_temperature";
pub const MEASURE_TEMPERATURE: &str = "measure_temperature";
pub const MEASURE_HUMIDITY: &str = "measure_humidity";
pub const POWER_MODE: &str = "power_mode";
pub const AC_MODE: &str = "ac_mode";
pub const FAN_SPEED: &str = "fan_speed";
pub const FAN_LEVEL: &str = "fan_level";
pub const SWING: &str = "swing";
pub const VERTICAL_SWING: &str = "vertical_swing";
pub const HORIZONTAL_SWING: &str = "horizontal_swing";
pub const AC_LIGHT: &str = "ac_light";
pub const DETECT_OPEN_WINDOW: &str = "detect_open_window";
pub const ALARM_BATTERY: &str = "alarm_battery";
pub const HOT_WATER_ONOFF: &str = "hot_water_onoff";
pub const HOT_WATER_TEMPERATURE: &str = "target_temperature.hot_water";

/// Store key holding the zone's [`ZoneCapabilities`] as read at pairing.
pub const STORE_TADO_CAPABILITIES: &str = "tadoCapabilities";

const HEATING_COMMANDS: [&str; 2] = [TARGET_TEMPERATURE, POWER_MODE];
const AC_COMMANDS: [&str; 8] = [
    TARGET_TEMPERATURE,
    AC_MODE,
    FAN_SPEED,
    FAN_LEVEL,
    SWING,
    VERTICAL_SWING,
    HORIZONTAL_SWING,
    AC_LIGHT,
];
pub const HOT_WATER_COMMANDS: [&str; 2] = [HOT_WATER_TEMPERATURE, HOT_WATER_ONOFF];

/// Longest overlay a duration may request.
const MAX_DURATION_SECS: f64 = 86_400.0;

/// Requested capability values, keyed by capability id.
pub type CapabilityValues = BTreeMap<String, CapabilityValue>;

#[derive(Debug)]
pub enum CommandError {
    TemperatureOutOfRange { min: f64, max: f64 },
    DurationOutOfRange,
    UnsupportedValue { setting: &'static str, allowed: String },
    SettingNotAvailable { setting: &'static str },
    /// No capability block for the requested AC mode.
    IncorrectCapabilities,
    InvalidValue { capability: String, value: String },
    NotSupported(String),
    NoValues,
    Api(TadoClientError),
    Host(HostError),
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandError::TemperatureOutOfRange { min, max } => {
                write!(f, "temperature must be between {} and {}", min, max)
            }
            CommandError::DurationOutOfRange => write!(f, "duration must be between 1 second and 24 hours"),
            CommandError::UnsupportedValue { setting, allowed } => {
                write!(f, "{} for this mode must be one of: {}", setting, allowed)
            }
            CommandError::SettingNotAvailable { setting } => write!(f, "{} is not available in this mode", setting),
            CommandError::IncorrectCapabilities => write!(f, "device has no capabilities for the selected mode"),
            CommandError::InvalidValue { capability, value } => write!(f, "invalid value {} for {}", value, capability),
            CommandError::NotSupported(c) => write!(f, "{} is not supported by this device", c),
            CommandError::NoValues => write!(f, "nothing to set"),
            CommandError::Api(e) => write!(f, "{}", e),
            CommandError::Host(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<TadoClientError> for CommandError {
    fn from(value: TadoClientError) -> Self {
        CommandError::Api(value)
    }
}

impl From<HostError> for CommandError {
    fn from(value: HostError) -> Self {
        CommandError::Host(value)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceKind {
    Thermostat,
    Valve,
    AirConditioning,
    HotWater,
}

impl DeviceKind {
    /// Product line of a Tado device type code (`RU02`, `VA02`, `WR02`, ...).
    pub fn from_device_type(device_type: &str) -> Option<Self> {
        if device_type.contains("RU") || device_type.contains("SU") {
            Some(DeviceKind::Thermostat)
        } else if device_type.contains("VA") {
            Some(DeviceKind::Valve)
        } else if device_type.contains("WR") {
            Some(DeviceKind::AirConditioning)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::Thermostat => "Thermostat",
            DeviceKind::Valve => "Radiator Valve",
            DeviceKind::AirConditioning => "AC Control",
            DeviceKind::HotWater => "Hot Water",
        }
    }

    fn commands(self) -> &'static [&'static str] {
        match self {
            DeviceKind::Thermostat | DeviceKind::Valve => &HEATING_COMMANDS,
            DeviceKind::AirConditioning => &AC_COMMANDS,
            DeviceKind::HotWater => &HOT_WATER_COMMANDS,
        }
    }

    /// Check `values` without building anything to send.
    pub fn validate<H>(self, host: &H, values: &CapabilityValues) -> Result<(), CommandError>
    where
        H: DeviceHost + ?Sized,
    {
        self.build_setting(host, values).map(|_| ())
    }

    /// The overlay setting for `values`, filling unspecified fields from the
    /// device's current capability values.
    pub fn build_setting<H>(self, host: &H, values: &CapabilityValues) -> Result<ZoneSetting, CommandError>
    where
        H: DeviceHost + ?Sized,
    {
        if let Some(key) = values.keys().find(|k| !self.commands().contains(&k.as_str())) {
            return Err(CommandError::NotSupported(key.clone()));
        }
        match self {
            DeviceKind::Thermostat | DeviceKind::Valve => heating_setting(host, values),
            DeviceKind::AirConditioning => ac_setting(host, values),
            DeviceKind::HotWater => hot_water_setting(host, values),
        }
    }
}

/// Wrap `setting` into an overlay for a zone of `zone_type`.
///
/// A positive `duration_ms` always makes a timer overlay; otherwise the device's
/// overlay settings decide how it terminates.
pub fn overlay(
    mut setting: ZoneSetting,
    zone_type: ZoneType,
    duration_ms: u64,
    settings: &DeviceSettings,
) -> Result<ZoneOverlay, CommandError> {
    setting.r#type = Some(zone_type);
    Ok(ZoneOverlay {
        r#type: None,
        setting: Some(setting),
        termination: Some(termination(duration_ms, settings)?),
    })
}

pub fn termination(duration_ms: u64, settings: &DeviceSettings) -> Result<ZoneOverlayTermination, CommandError> {
    if duration_ms > 0 {
        let secs = duration_ms as f64 / 1000.0;
        if !(1.0..=MAX_DURATION_SECS).contains(&secs) {
            return Err(CommandError::DurationOutOfRange);
        }
        return Ok(ZoneOverlayTermination {
            r#type: Some(ZoneOverlayTerminationType::Timer),
            duration_in_seconds: Some((duration_ms / 1000) as i64),
            ..Default::default()
        });
    }

    Ok(match settings.overlay_mode {
        OverlayMode::Manual => ZoneOverlayTermination {
            r#type: Some(ZoneOverlayTerminationType::Manual),
            ..Default::default()
        },
        OverlayMode::Timer => ZoneOverlayTermination {
            r#type: Some(ZoneOverlayTerminationType::Timer),
            duration_in_seconds: Some(i64::from(settings.timer_duration) * 60),
            ..Default::default()
        },
        OverlayMode::TadoMode => ZoneOverlayTermination {
            r#type: Some(ZoneOverlayTerminationType::TadoMode),
            ..Default::default()
        },
    })
}

fn heating_setting<H>(host: &H, values: &CapabilityValues) -> Result<ZoneSetting, CommandError>
where
    H: DeviceHost + ?Sized,
{
    let mut celsius = host.capability_value(TARGET_TEMPERATURE).and_then(|v| v.as_f64());
    if let Some(requested) = number(values, TARGET_TEMPERATURE)? {
        check_range(host, TARGET_TEMPERATURE, requested)?;
        celsius = Some(requested);
    }
    let power = named::<Power>(values, POWER_MODE)?.unwrap_or(Power::On);

    Ok(ZoneSetting {
        power: Some(power),
        temperature: celsius.map(Temperature::celsius),
        ..Default::default()
    })
}

fn hot_water_setting<H>(host: &H, values: &CapabilityValues) -> Result<ZoneSetting, CommandError>
where
    H: DeviceHost + ?Sized,
{
    let celsius = number(values, HOT_WATER_TEMPERATURE)?;
    let on = match values.get(HOT_WATER_ONOFF) {
        Some(v) => Some(v.as_bool().ok_or_else(|| invalid(HOT_WATER_ONOFF, v))?),
        None => None,
    };
    if celsius.is_none() && on.is_none() {
        return Err(CommandError::NoValues);
    }
    if let Some(c) = celsius {
        check_range(host, HOT_WATER_TEMPERATURE, c)?;
    }

    let power = if on == Some(false) { Power::Off } else { Power::On };
    Ok(ZoneSetting {
        power: Some(power),
        temperature: celsius.filter(|_| power == Power::On).map(Temperature::celsius),
        ..Default::default()
    })
}

fn ac_setting<H>(host: &H, values: &CapabilityValues) -> Result<ZoneSetting, CommandError>
where
    H: DeviceHost + ?Sized,
{
    let caps: ZoneCapabilities = store_get(host, STORE_TADO_CAPABILITIES).ok_or(CommandError::IncorrectCapabilities)?;
    let mut mode = named::<AcMode>(values, AC_MODE)?
        .or_else(|| current(host, AC_MODE))
        .ok_or(CommandError::IncorrectCapabilities)?;

    if mode == AcMode::Off {
        return Ok(ZoneSetting {
            power: Some(Power::Off),
            ..Default::default()
        });
    }

    let requested_celsius = number(values, TARGET_TEMPERATURE)?;
    if requested_celsius.is_some() && !matches!(mode, AcMode::Heat | AcMode::Cool) {
        mode = AcMode::Cool;
    }
    let api_mode = mode.api_mode().ok_or(CommandError::IncorrectCapabilities)?;
    let mode_caps = caps.for_mode(api_mode).ok_or(CommandError::IncorrectCapabilities)?;

    let mut setting = ZoneSetting {
        power: Some(Power::On),
        mode: Some(api_mode),
        ..Default::default()
    };

    if let Some(range) = mode_caps.temperatures.as_ref().and_then(|t| t.celsius.as_ref()) {
        let celsius = requested_celsius
            .or_else(|| host.capability_value(TARGET_TEMPERATURE).and_then(|v| v.as_f64()))
            .or_else(|| default_temperature(range));
        if let Some(c) = celsius {
            if let (Some(min), Some(max)) = (range.min, range.max)
                && (c < min || c > max)
            {
                return Err(CommandError::TemperatureOutOfRange { min, max });
            }
            setting.temperature = Some(Temperature::celsius(c));
        }
    }

    setting.fan_speed = choose::<FanSpeed, H>(host, values, FAN_SPEED, "fan speed", mode_caps.fan_speeds.as_deref(), FanSpeed::Auto)?;
    setting.fan_level = choose::<FanLevel, H>(host, values, FAN_LEVEL, "fan level", mode_caps.fan_level.as_deref(), FanLevel::Auto)?;
    setting.swing = choose::<Swing, H>(host, values, SWING, "swing", mode_caps.swings.as_deref(), Swing::On)?;
    setting.vertical_swing = choose::<VerticalSwing, H>(
        host,
        values,
        VERTICAL_SWING,
        "vertical swing",
        mode_caps.vertical_swing.as_deref(),
        VerticalSwing::On,
    )?;
    setting.horizontal_swing = choose::<HorizontalSwing, H>(
        host,
        values,
        HORIZONTAL_SWING,
        "horizontal swing",
        mode_caps.horizontal_swing.as_deref(),
        HorizontalSwing::On,
    )?;

    if mode_caps.light.is_some() {
        let light = named::<Light>(values, AC_LIGHT)?
            .or_else(|| current(host, AC_LIGHT))
            .unwrap_or(Light::On);
        setting.light = Some(light);
    }

    Ok(setting)
}

/// Validate a requested AC value against the mode's list, then pick what to send:
/// requested or current value if allowed, else `preferred`, else the first allowed.
fn choose<T, H>(
    host: &H,
    values: &CapabilityValues,
    capability: &str,
    setting: &'static str,
    allowed: Option<&[T]>,
    preferred: T,
) -> Result<Option<T>, CommandError>
where
    T: DeserializeOwned + Serialize + PartialEq + Copy,
    H: DeviceHost + ?Sized,
{
    let requested = named::<T>(values, capability)?;
    if let Some(value) = requested {
        let Some(allowed) = allowed else {
            return Err(CommandError::SettingNotAvailable { setting });
        };
        if !allowed.contains(&value) {
            let names: Vec<String> = allowed.iter().filter_map(serde_enum_name).collect();
            return Err(CommandError::UnsupportedValue {
                setting,
                allowed: names.join(", "),
            });
        }
    }

    let Some(allowed) = allowed else {
        return Ok(None);
    };
    let wanted = requested.or_else(|| current(host, capability));
    Ok(wanted
        .filter(|w| allowed.contains(w))
        .or_else(|| allowed.contains(&preferred).then_some(preferred))
        .or_else(|| allowed.first().copied()))
}

/// Midpoint of the range, rounded to whole degrees.
fn default_temperature(range: &TemperatureRange) -> Option<f64> {
    match (range.min, range.max) {
        (Some(min), Some(max)) => Some(((min + max) / 2.0).round()),
        (min, _) => min,
    }
}

fn check_range<H>(host: &H, capability: &str, value: f64) -> Result<(), CommandError>
where
    H: DeviceHost + ?Sized,
{
    let Some(options) = host.capability_options(capability) else {
        return Ok(());
    };
    let min = options.min.unwrap_or(f64::NEG_INFINITY);
    let max = options.max.unwrap_or(f64::INFINITY);
    if value < min || value > max {
        return Err(CommandError::TemperatureOutOfRange { min, max });
    }
    Ok(())
}

fn invalid(capability: &str, value: &CapabilityValue) -> CommandError {
    CommandError::InvalidValue {
        capability: capability.to_string(),
        value: value.to_string(),
    }
}

fn number(values: &CapabilityValues, capability: &str) -> Result<Option<f64>, CommandError> {
    match values.get(capability) {
        Some(v) => v.as_f64().map(Some).ok_or_else(|| invalid(capability, v)),
        None => Ok(None),
    }
}

fn named<T: DeserializeOwned>(values: &CapabilityValues, capability: &str) -> Result<Option<T>, CommandError> {
    match values.get(capability) {
        Some(v) => v
            .as_str()
            .and_then(parse_enum_name::<T>)
            .map(Some)
            .ok_or_else(|| invalid(capability, v)),
        None => Ok(None),
    }
}

fn current<T, H>(host: &H, capability: &str) -> Option<T>
where
    T: DeserializeOwned,
    H: DeviceHost + ?Sized,
{
    host.capability_value(capability)
        .and_then(|v| v.as_str().and_then(parse_enum_name::<T>))
}
