//! Discovery of pairable devices in a home.
//!
//! Every device of every zone becomes one hub device, except hot-water zones: they
//! share the serial of the thermostat wired to the boiler and are folded into that
//! thermostat when it is paired from the same home.

use crate::client::{TadoApi, TadoClientError};
use crate::device::capabilities::*;
use crate::device::tado_device::{
    STORE_DEVICE_TYPE, STORE_HOME_ID, STORE_HOT_WATER_ZONE_ID, STORE_HOT_WATER_ZONE_TYPE, STORE_ZONE_ID,
    STORE_ZONE_TYPE, TadoDevice,
};
use crate::host::{CapabilityOptions, DeviceHost, DeviceSettings, HostError, MemoryHost, store_set};
use crate::models::state::hot_water_device_id;
use crate::models::tado::{
    AirConditioningModeCapabilities, HomeId, TemperatureRange, Zone, ZoneCapabilities, ZoneId, ZoneState, ZoneType,
};
use log::{debug, info};
use std::collections::BTreeMap;

const MIN_STEP: f64 = 0.5;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HotWaterZone {
    pub zone_id: ZoneId,
    pub zone_type: ZoneType,
}

/// Everything the hub needs to create a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedDevice {
    pub name: String,
    pub id: String,
    pub kind: DeviceKind,
    pub home_id: HomeId,
    pub zone_id: ZoneId,
    pub zone_type: ZoneType,
    pub device_type: String,
    pub serial_number: String,
    pub capabilities: Vec<String>,
    pub capability_options: BTreeMap<String, CapabilityOptions>,
    pub zone_capabilities: ZoneCapabilities,
    pub batteries: Vec<&'static str>,
    pub hot_water: Option<HotWaterZone>,
}

impl PairedDevice {
    /// In-memory host with this device's capabilities, options, settings and store.
    pub fn build_host(&self) -> Result<MemoryHost, HostError> {
        let capabilities: Vec<&str> = self.capabilities.iter().map(String::as_str).collect();
        let mut host = MemoryHost::new(self.name.clone(), &capabilities);
        for (capability, options) in &self.capability_options {
            host.set_options(capability, options.clone());
        }
        host.set_settings(DeviceSettings {
            serial_number: self.serial_number.clone(),
            ..Default::default()
        })?;

        store_set(&mut host, STORE_HOME_ID, &self.home_id)?;
        store_set(&mut host, STORE_ZONE_ID, &self.zone_id)?;
        store_set(&mut host, STORE_ZONE_TYPE, &self.zone_type)?;
        store_set(&mut host, STORE_DEVICE_TYPE, &self.device_type)?;
        store_set(&mut host, STORE_TADO_CAPABILITIES, &self.zone_capabilities)?;
        if let Some(hot_water) = self.hot_water {
            store_set(&mut host, STORE_HOT_WATER_ZONE_ID, &hot_water.zone_id)?;
            store_set(&mut host, STORE_HOT_WATER_ZONE_TYPE, &hot_water.zone_type)?;
        }
        Ok(host)
    }

    pub fn into_device(self) -> Result<TadoDevice<MemoryHost>, HostError> {
        let host = self.build_host()?;
        Ok(TadoDevice::new(self.id, self.kind, host))
    }
}

/// List the devices of `home_id` whose product line is in `kinds`.
///
/// Hot-water zones are picked up with [`DeviceKind::Thermostat`].
pub fn discover_devices<A>(api: &A, home_id: HomeId, kinds: &[DeviceKind]) -> Result<Vec<PairedDevice>, TadoClientError>
where
    A: TadoApi + ?Sized,
{
    let zones = api.get_zones(home_id)?;
    let mut devices = Vec::new();
    let mut hot_water = Vec::new();
    let mut found = Vec::new();

    for zone in &zones {
        let (Some(zone_id), Some(zone_type)) = (zone.id, zone.r#type) else {
            continue;
        };
        let zone_capabilities = api.get_zone_capabilities(home_id, zone_id)?;
        let (mut capabilities, capability_options) = capabilities_from_zone_capabilities(&zone_capabilities);
        let state = api.get_zone_state(home_id, zone_id)?;
        capabilities.extend(capabilities_from_zone_state(zone, &state));

        let zone_name = zone.name.clone().unwrap_or_else(|| format!("Zone {}", zone_id.0));
        for extra in zone.devices.as_deref().unwrap_or(&[]) {
            let device = &extra.device;
            let (Some(serial), Some(device_type)) = (device.serial_no.as_ref(), device.device_type.as_ref()) else {
                continue;
            };
            found.push(serial.0.clone());

            let Some(base_kind) = DeviceKind::from_device_type(&device_type.0) else {
                debug!("Skipping {} of unknown device type {}", serial.0, device_type.0);
                continue;
            };
            if !kinds.contains(&base_kind) {
                continue;
            }

            let (kind, id) = if zone_type == ZoneType::HotWater {
                (DeviceKind::HotWater, hot_water_device_id(&serial.0))
            } else {
                (base_kind, serial.0.clone())
            };
            let mut paired = PairedDevice {
                name: format!("{} - {}", zone_name, kind.label()),
                id,
                kind,
                home_id,
                zone_id,
                zone_type,
                device_type: device_type.0.clone(),
                serial_number: serial.0.clone(),
                capabilities: capabilities.clone(),
                capability_options: capability_options.clone(),
                zone_capabilities: zone_capabilities.clone(),
                batteries: Vec::new(),
                hot_water: None,
            };
            if device.battery_state.is_some() {
                paired.capabilities.push(ALARM_BATTERY.to_string());
                paired.batteries = battery_types(&device_type.0);
            }

            if kind == DeviceKind::HotWater {
                hot_water.push(paired);
            } else {
                devices.push(paired);
            }
        }
    }

    for candidate in hot_water {
        merge_hot_water(candidate, &mut devices);
    }

    info!("Devices found in home {}: {}", home_id.0, found.join(", "));
    Ok(devices)
}

/// Fold a hot-water candidate into the thermostat with the same serial and home,
/// or keep it as its own device.
fn merge_hot_water(candidate: PairedDevice, devices: &mut Vec<PairedDevice>) {
    let thermostat = devices.iter_mut().find(|d| {
        d.kind == DeviceKind::Thermostat && d.serial_number == candidate.serial_number && d.home_id == candidate.home_id
    });
    let Some(thermostat) = thermostat else {
        debug!("Hot water zone {} paired as its own device", candidate.zone_id.0);
        devices.push(candidate);
        return;
    };

    for capability in HOT_WATER_COMMANDS {
        if candidate.capabilities.iter().any(|c| c == capability) {
            thermostat.capabilities.push(capability.to_string());
            if let Some(options) = candidate.capability_options.get(capability) {
                thermostat.capability_options.insert(capability.to_string(), options.clone());
            }
        }
    }
    thermostat.hot_water = Some(HotWaterZone {
        zone_id: candidate.zone_id,
        zone_type: candidate.zone_type,
    });
    debug!("Hot water zone {} merged into {}", candidate.zone_id.0, thermostat.id);
}

/// Hub capabilities and their options from a zone's capability descriptor.
pub fn capabilities_from_zone_capabilities(
    caps: &ZoneCapabilities,
) -> (Vec<String>, BTreeMap<String, CapabilityOptions>) {
    let mut capabilities = Vec::new();
    let mut options = BTreeMap::new();
    let range = caps.celsius_range();

    match caps.r#type {
        Some(ZoneType::HotWater) => {
            if caps.can_set_temperature == Some(true) {
                capabilities.push(HOT_WATER_TEMPERATURE.to_string());
                let mut o = temperature_options(range, 30.0, 70.0);
                o.title = Some("Hot Water Temperature".to_string());
                options.insert(HOT_WATER_TEMPERATURE.to_string(), o);
            } else {
                capabilities.push(HOT_WATER_ONOFF.to_string());
            }
        }
        Some(ZoneType::Heating) => {
            capabilities.push(TARGET_TEMPERATURE.to_string());
            capabilities.push(POWER_MODE.to_string());
            options.insert(TARGET_TEMPERATURE.to_string(), temperature_options(range, 10.0, 35.0));
        }
        Some(ZoneType::AirConditioning) => {
            capabilities.push(TARGET_TEMPERATURE.to_string());
            capabilities.push(AC_MODE.to_string());
            let supported: [(&str, fn(&AirConditioningModeCapabilities) -> bool); 6] = [
                (FAN_SPEED, |m| m.fan_speeds.as_ref().is_some_and(|v| !v.is_empty())),
                (SWING, |m| m.swings.as_ref().is_some_and(|v| !v.is_empty())),
                (FAN_LEVEL, |m| m.fan_level.as_ref().is_some_and(|v| !v.is_empty())),
                (VERTICAL_SWING, |m| m.vertical_swing.as_ref().is_some_and(|v| !v.is_empty())),
                (HORIZONTAL_SWING, |m| m.horizontal_swing.as_ref().is_some_and(|v| !v.is_empty())),
                (AC_LIGHT, |m| m.light.as_ref().is_some_and(|v| !v.is_empty())),
            ];
            for (capability, offered) in supported {
                if caps.ac_modes().any(offered) {
                    capabilities.push(capability.to_string());
                }
            }
            options.insert(TARGET_TEMPERATURE.to_string(), ac_temperature_options(caps));
        }
        None => {}
    }

    if let Some(o) = options.get_mut(TARGET_TEMPERATURE) {
        o.duration = true;
    }
    (capabilities, options)
}

/// Capabilities that depend on what the zone currently reports.
pub fn capabilities_from_zone_state(zone: &Zone, state: &ZoneState) -> Vec<String> {
    let mut capabilities = Vec::new();
    if zone
        .open_window_detection
        .as_ref()
        .is_some_and(|d| d.supported == Some(true))
    {
        capabilities.push(DETECT_OPEN_WINDOW.to_string());
    }
    if let Some(sensors) = state.sensor_data_points.as_ref() {
        if sensors.inside_temperature.is_some() {
            capabilities.push(MEASURE_TEMPERATURE.to_string());
        }
        if sensors.humidity.is_some() {
            capabilities.push(MEASURE_HUMIDITY.to_string());
        }
    }
    capabilities
}

pub fn battery_types(device_type: &str) -> Vec<&'static str> {
    if device_type.contains("RU") || device_type.contains("SU") {
        vec!["AAA", "AAA", "AAA"]
    } else if device_type.contains("VA") {
        vec!["AA", "AA"]
    } else {
        Vec::new()
    }
}

fn temperature_options(range: Option<&TemperatureRange>, min: f64, max: f64) -> CapabilityOptions {
    let step = range.and_then(|r| r.step).unwrap_or(MIN_STEP).max(MIN_STEP);
    CapabilityOptions {
        min: Some(range.and_then(|r| r.min).unwrap_or(min)),
        max: Some(range.and_then(|r| r.max).unwrap_or(max)),
        step: Some(step),
        decimals: Some(decimals_for_step(step)),
        ..Default::default()
    }
}

/// 16-30 °C, widened by what the COOL and HEAT modes allow.
fn ac_temperature_options(caps: &ZoneCapabilities) -> CapabilityOptions {
    let (mut min, mut max, mut step) = (16.0_f64, 30.0_f64, MIN_STEP);
    for mode in [caps.cool.as_ref(), caps.heat.as_ref()].into_iter().flatten() {
        let Some(range) = mode.temperatures.as_ref().and_then(|t| t.celsius.as_ref()) else {
            continue;
        };
        if let Some(v) = range.min {
            min = min.min(v);
        }
        if let Some(v) = range.max {
            max = max.max(v);
        }
        if let Some(v) = range.step {
            step = step.max(v);
        }
    }
    CapabilityOptions {
        min: Some(min),
        max: Some(max),
        step: Some(step),
        decimals: Some(decimals_for_step(step)),
        ..Default::default()
    }
}

fn decimals_for_step(step: f64) -> u8 {
    if step < 0.1 {
        2
    } else if step < 1.0 {
        1
    } else {
        0
    }
}
