//! Raw Tado payloads to normalized records.
//!
//! The poll path and the webhook path produce the same [`StateData`] shape, but the
//! poll path sees a full snapshot while webhook deliveries only carry what changed.

use crate::models::state::{AcMode, OverlayMode, StateData, ZoneData, ZoneMembership, hot_water_device_id};
use crate::models::tado::{Power, WebhookEvent, Zone, ZoneOverlayTerminationType, ZoneSetting, ZoneState, ZoneType};
use crate::utils::round_to_tenth;
use log::debug;

/// Flatten zone listings into per-device membership records.
///
/// Hot-water zones share the serial of the thermostat wired to the boiler, so their
/// members are keyed with the hot-water suffix.
pub fn parse_zone_data(zones: &[Zone]) -> ZoneData {
    let mut out = ZoneData::new();
    for zone in zones {
        let (Some(zone_id), Some(zone_type)) = (zone.id, zone.r#type) else {
            debug!("Skipping zone without id/type: {:?}", zone.name);
            continue;
        };
        for extra in zone.devices.as_deref().unwrap_or(&[]) {
            let device = &extra.device;
            let Some(serial) = device.serial_no.as_ref() else {
                continue;
            };
            let id = if zone_type == ZoneType::HotWater {
                hot_water_device_id(&serial.0)
            } else {
                serial.0.clone()
            };
            let connection_state = device
                .connection_state
                .as_ref()
                .and_then(|c| c.value)
                .unwrap_or(true);
            out.insert(
                id.clone(),
                ZoneMembership {
                    id,
                    zone_id,
                    zone_type,
                    connection_state,
                    battery_state: device.battery_state,
                },
            );
        }
    }
    out
}

/// Normalize a full zone-state snapshot.
pub fn parse_zone_state(state: &ZoneState) -> StateData {
    let setting = state.setting.as_ref();
    let mut out = StateData {
        target_temperature: setting.and_then(setting_celsius),
        measure_temperature: state
            .sensor_data_points
            .as_ref()
            .and_then(|s| s.inside_temperature.as_ref())
            .and_then(|t| t.celsius)
            .map(round_to_tenth),
        measure_humidity: state
            .sensor_data_points
            .as_ref()
            .and_then(|s| s.humidity.as_ref())
            .and_then(|h| h.percentage)
            .map(round_to_tenth),
        power: setting.and_then(|s| s.power).map(|p| p == Power::On),
        // Always emitted so devices have a definite prior value to detect transitions.
        open_window_detected: Some(state.open_window_detected == Some(true)),
        ..Default::default()
    };

    let termination = state
        .overlay
        .as_ref()
        .and_then(|o| o.termination.as_ref())
        .and_then(|t| t.r#type);
    out.overlay = Some(match termination {
        Some(ZoneOverlayTerminationType::Manual) => OverlayMode::Manual,
        Some(ZoneOverlayTerminationType::Timer) => OverlayMode::Timer,
        _ => OverlayMode::TadoMode,
    });

    if let Some(s) = setting
        && s.r#type == Some(ZoneType::AirConditioning)
    {
        out.ac_mode = Some(match (s.power, s.mode) {
            (Some(Power::On), Some(mode)) => AcMode::from(mode),
            _ => AcMode::Off,
        });
        copy_ac_settings(s, &mut out);
    }

    out
}

/// Normalize a webhook delivery. Only fields present in the payload are set.
pub fn parse_webhook_state(event: &WebhookEvent) -> StateData {
    let mut out = StateData {
        measure_temperature: event
            .inside_temperature
            .as_ref()
            .and_then(|t| t.celsius)
            .map(round_to_tenth),
        measure_humidity: event.humidity.as_ref().and_then(|h| h.percentage).map(round_to_tenth),
        ..Default::default()
    };

    match event.overlay_type.as_ref() {
        // explicit null: back on the smart schedule
        Some(None) => out.overlay = Some(OverlayMode::TadoMode),
        Some(Some(kind)) => {
            out.overlay = OverlayMode::from_name(&kind.0);
            if out.overlay.is_none() {
                debug!("Ignoring unknown overlay type {:?} in webhook", kind.0);
            }
        }
        None => {}
    }

    if let Some(s) = event.setting.as_ref() {
        out.target_temperature = setting_celsius(s);
        out.power = s.power.map(|p| p == Power::On);
        // Heating and hot-water zones have no AC mode, powered off or not.
        let may_be_ac = !matches!(s.r#type, Some(ZoneType::Heating) | Some(ZoneType::HotWater));
        out.ac_mode = match (s.mode, s.power) {
            (Some(mode), _) => Some(AcMode::from(mode)),
            (None, Some(Power::Off)) if may_be_ac => Some(AcMode::Off),
            _ => None,
        };
        copy_ac_settings(s, &mut out);
    }

    out
}

fn setting_celsius(setting: &ZoneSetting) -> Option<f64> {
    setting.temperature.as_ref().and_then(|t| t.celsius).map(round_to_tenth)
}

fn copy_ac_settings(setting: &ZoneSetting, out: &mut StateData) {
    out.fan_speed = setting.fan_speed;
    out.fan_level = setting.fan_level;
    out.swing = setting.swing;
    out.vertical_swing = setting.vertical_swing;
    out.horizontal_swing = setting.horizontal_swing;
    out.light = setting.light;
}
