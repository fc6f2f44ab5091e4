//! A Tado device as the hub sees it.
//!
//! Identity and zone placement live in the host's device store, so a restart of the
//! hub keeps zone corrections made by earlier passes.

use crate::client::TadoApi;
use crate::device::capabilities::*;
use crate::host::{CapabilityValue, DeviceHost, DeviceSettings, HostError, store_get, store_set};
use crate::models::state::{
    DeviceRecord, OverlayMode, StateData, ZoneData, ZoneStateRecord, hot_water_device_id,
};
use crate::models::tado::{BatteryState, HomeId, Power, ZoneId, ZoneType};
use crate::sync::events::{EventSubscriber, SyncEvent};
use crate::utils::serde_enum_name;
use log::{debug, info, warn};

pub const STORE_HOME_ID: &str = "homeId";
pub const STORE_ZONE_ID: &str = "zoneId";
pub const STORE_ZONE_TYPE: &str = "zoneType";
pub const STORE_HOT_WATER_ZONE_ID: &str = "hotWaterZoneId";
pub const STORE_HOT_WATER_ZONE_TYPE: &str = "hotWaterZoneType";
pub const STORE_DEVICE_TYPE: &str = "deviceType";

/// Boost keeps the maximum temperature for half an hour, like the Tado app.
pub const BOOST_DURATION_MS: u64 = 30 * 60 * 1000;

const NOT_CONNECTED: &str = "Device is not connected";

pub struct TadoDevice<H: DeviceHost> {
    id: String,
    kind: DeviceKind,
    host: H,
    current_overlay: Option<OverlayMode>,
}

impl<H: DeviceHost> TadoDevice<H> {
    pub fn new(id: impl Into<String>, kind: DeviceKind, host: H) -> Self {
        TadoDevice {
            id: id.into(),
            kind,
            host,
            current_overlay: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn current_overlay(&self) -> Option<OverlayMode> {
        self.current_overlay
    }

    /// The registry record of this device, from its store.
    pub fn record(&self) -> Option<DeviceRecord> {
        Some(DeviceRecord::new(
            self.id.clone(),
            store_get(&self.host, STORE_HOME_ID)?,
            store_get(&self.host, STORE_ZONE_ID)?,
            store_get(&self.host, STORE_ZONE_TYPE)?,
        ))
    }

    /// Record of the hot-water zone merged into this thermostat, if any.
    pub fn hot_water_record(&self) -> Option<DeviceRecord> {
        Some(DeviceRecord::new(
            hot_water_device_id(&self.id),
            store_get(&self.host, STORE_HOME_ID)?,
            store_get(&self.host, STORE_HOT_WATER_ZONE_ID)?,
            store_get::<ZoneType>(&self.host, STORE_HOT_WATER_ZONE_TYPE).unwrap_or(ZoneType::HotWater),
        ))
    }

    /// Everything to register with the engine for this device.
    pub fn records(&self) -> Vec<DeviceRecord> {
        self.record().into_iter().chain(self.hot_water_record()).collect()
    }

    /// Apply zone membership. Returns corrected records when the zone moved.
    pub fn apply_zone_data(&mut self, data: &ZoneData) -> Vec<DeviceRecord> {
        let mut corrections = Vec::new();

        if let Some(member) = data.get(&self.id) {
            if let Some(record) = self.record()
                && record.zone_id != member.zone_id
            {
                info!("{}: zone changed {} -> {}", self.id, record.zone_id.0, member.zone_id.0);
                report(&self.id, store_set(&mut self.host, STORE_ZONE_ID, &member.zone_id));
                report(&self.id, store_set(&mut self.host, STORE_ZONE_TYPE, &member.zone_type));
                corrections.push(DeviceRecord {
                    zone_id: member.zone_id,
                    zone_type: member.zone_type,
                    ..record
                });
            }

            let availability = if member.connection_state {
                self.host.set_available()
            } else {
                self.host.set_unavailable(NOT_CONNECTED)
            };
            report(&self.id, availability);

            if self.host.has_capability(ALARM_BATTERY)
                && let Some(battery) = member.battery_state
            {
                let low = CapabilityValue::Bool(battery != BatteryState::Normal);
                report(&self.id, self.host.set_capability_value(ALARM_BATTERY, low));
            }
        }

        if let Some(record) = self.hot_water_record()
            && let Some(member) = data.get(&record.id)
            && member.zone_id != record.zone_id
        {
            info!("{}: hot water zone changed {} -> {}", self.id, record.zone_id.0, member.zone_id.0);
            report(&self.id, store_set(&mut self.host, STORE_HOT_WATER_ZONE_ID, &member.zone_id));
            report(&self.id, store_set(&mut self.host, STORE_HOT_WATER_ZONE_TYPE, &member.zone_type));
            corrections.push(DeviceRecord {
                zone_id: member.zone_id,
                zone_type: member.zone_type,
                ..record
            });
        }

        corrections
    }

    /// Apply the state records of a pass or webhook delivery that concern this device.
    pub fn apply_state_data(&mut self, records: &[ZoneStateRecord]) {
        let Some(home_id) = store_get::<HomeId>(&self.host, STORE_HOME_ID) else {
            return;
        };
        let find = move |zone_id: ZoneId| {
            records
                .iter()
                .find(|r| r.home_id == home_id && r.zone_id == zone_id)
                .map(|r| &r.data)
        };

        if self.kind != DeviceKind::HotWater
            && let Some(zone_id) = store_get::<ZoneId>(&self.host, STORE_HOT_WATER_ZONE_ID)
            && let Some(state) = find(zone_id)
        {
            self.apply_hot_water(state);
        }

        let Some(state) = store_get::<ZoneId>(&self.host, STORE_ZONE_ID).and_then(find) else {
            return;
        };
        if self.kind == DeviceKind::HotWater {
            self.apply_hot_water(state);
        } else {
            self.apply_system(state);
            self.apply_custom(state);
        }
        self.apply_overlay(state);
    }

    fn apply_system(&mut self, state: &StateData) {
        self.set_number(TARGET_TEMPERATURE, state.target_temperature);
        self.set_number(MEASURE_TEMPERATURE, state.measure_temperature);
        self.set_number(MEASURE_HUMIDITY, state.measure_humidity);

        if self.host.has_capability(POWER_MODE)
            && let Some(power) = state.power
        {
            let mode = if power { "ON" } else { "OFF" };
            let previous = self.host.capability_value(POWER_MODE);
            report(&self.id, self.host.set_capability_value(POWER_MODE, CapabilityValue::Text(mode.into())));
            if previous.as_ref().and_then(|v| v.as_str()) != Some(mode) {
                let card = if power { "power_mode_on" } else { "power_mode_off" };
                report(&self.id, self.host.trigger_flow(card));
            }
        }
    }

    fn apply_custom(&mut self, state: &StateData) {
        let named = [
            (AC_MODE, state.ac_mode.as_ref().and_then(serde_enum_name)),
            (FAN_SPEED, state.fan_speed.as_ref().and_then(serde_enum_name)),
            (FAN_LEVEL, state.fan_level.as_ref().and_then(serde_enum_name)),
            (SWING, state.swing.as_ref().and_then(serde_enum_name)),
            (VERTICAL_SWING, state.vertical_swing.as_ref().and_then(serde_enum_name)),
            (HORIZONTAL_SWING, state.horizontal_swing.as_ref().and_then(serde_enum_name)),
            (AC_LIGHT, state.light.as_ref().and_then(serde_enum_name)),
        ];
        for (capability, value) in named {
            if let Some(value) = value
                && self.host.has_capability(capability)
            {
                report(&self.id, self.host.set_capability_value(capability, CapabilityValue::Text(value)));
            }
        }

        if self.host.has_capability(DETECT_OPEN_WINDOW)
            && let Some(open) = state.open_window_detected
        {
            let was_open = self.host.capability_value(DETECT_OPEN_WINDOW).and_then(|v| v.as_bool());
            report(&self.id, self.host.set_capability_value(DETECT_OPEN_WINDOW, CapabilityValue::Bool(open)));
            if open && was_open != Some(true) {
                report(&self.id, self.host.trigger_flow("open_window_detected"));
            }
        }
    }

    fn apply_hot_water(&mut self, state: &StateData) {
        if self.host.has_capability(HOT_WATER_ONOFF)
            && let Some(power) = state.power
        {
            report(&self.id, self.host.set_capability_value(HOT_WATER_ONOFF, CapabilityValue::Bool(power)));
        }
        self.set_number(HOT_WATER_TEMPERATURE, state.target_temperature);
    }

    fn apply_overlay(&mut self, state: &StateData) {
        let Some(overlay) = state.overlay else {
            return;
        };
        if overlay == OverlayMode::TadoMode && self.current_overlay != Some(OverlayMode::TadoMode) {
            report(&self.id, self.host.trigger_flow("smart_schedule_activated"));
        }
        if overlay != OverlayMode::TadoMode && self.current_overlay == Some(OverlayMode::TadoMode) {
            report(&self.id, self.host.trigger_flow("smart_schedule_deactivated"));
        }
        self.current_overlay = Some(overlay);
    }

    fn set_number(&mut self, capability: &str, value: Option<f64>) {
        if let Some(v) = value
            && self.host.has_capability(capability)
        {
            report(&self.id, self.host.set_capability_value(capability, CapabilityValue::Number(v)));
        }
    }

    /// Store new settings and copy the overlay policy to every other device of the
    /// same zone, so one physical zone terminates overlays the same way whichever
    /// device set them. Returns the number of devices updated.
    pub fn on_settings_changed<'a>(
        &mut self,
        settings: DeviceSettings,
        devices: impl IntoIterator<Item = &'a mut TadoDevice<H>>,
    ) -> Result<usize, HostError>
    where
        H: 'a,
    {
        self.host.set_settings(settings.clone())?;
        let Some(zone_id) = store_get::<ZoneId>(&self.host, STORE_ZONE_ID) else {
            return Ok(0);
        };
        let home_id: Option<HomeId> = store_get(&self.host, STORE_HOME_ID);

        let mut updated = 0;
        for device in devices {
            let current = device.host.settings();
            if current.serial_number == settings.serial_number
                || store_get::<ZoneId>(&device.host, STORE_ZONE_ID) != Some(zone_id)
                || store_get::<HomeId>(&device.host, STORE_HOME_ID) != home_id
            {
                continue;
            }
            let next = DeviceSettings {
                overlay_mode: settings.overlay_mode,
                timer_duration: settings.timer_duration,
                ..current
            };
            match device.host.set_settings(next) {
                Ok(()) => updated += 1,
                Err(e) => warn!("{}: distributing settings to {} failed: {}", self.id, device.id, e),
            }
        }
        debug!("{}: settings copied to {} device(s) of zone {}", self.id, updated, zone_id.0);
        Ok(updated)
    }

    fn stored<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, CommandError> {
        store_get(&self.host, key).ok_or_else(|| CommandError::Host(HostError::Store(format!("missing {}", key))))
    }

    /// Send capability changes to Tado. Every value is validated before the first
    /// remote call, so a rejected command changes nothing.
    ///
    /// Hot-water capabilities of a thermostat go to its merged hot-water zone.
    pub fn set_capabilities<A>(
        &mut self,
        api: &A,
        values: &CapabilityValues,
        duration_ms: u64,
    ) -> Result<(), CommandError>
    where
        A: TadoApi + ?Sized,
    {
        if let Some(missing) = values.keys().find(|c| !self.host.has_capability(c)) {
            return Err(CommandError::NotSupported(missing.clone()));
        }

        let (hot_water, own): (CapabilityValues, CapabilityValues) = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .partition(|(k, _)| self.kind != DeviceKind::HotWater && HOT_WATER_COMMANDS.contains(&k.as_str()));

        let home_id: HomeId = self.stored(STORE_HOME_ID)?;
        let settings = self.host.settings();
        let mut requests = Vec::new();
        if !own.is_empty() {
            let setting = self.kind.build_setting(&self.host, &own)?;
            let zone_type = self.stored(STORE_ZONE_TYPE)?;
            let zone_id: ZoneId = self.stored(STORE_ZONE_ID)?;
            requests.push((zone_id, overlay(setting, zone_type, duration_ms, &settings)?, own));
        }
        if !hot_water.is_empty() {
            let setting = DeviceKind::HotWater.build_setting(&self.host, &hot_water)?;
            let zone_type = store_get(&self.host, STORE_HOT_WATER_ZONE_TYPE).unwrap_or(ZoneType::HotWater);
            let zone_id: ZoneId = self.stored(STORE_HOT_WATER_ZONE_ID)?;
            requests.push((zone_id, overlay(setting, zone_type, duration_ms, &settings)?, hot_water));
        }
        if requests.is_empty() {
            return Err(CommandError::NoValues);
        }

        // A zone's values are applied once its overlay is accepted and stay
        // applied if a later zone fails.
        for (zone_id, overlay, applied) in requests {
            debug!("{}: overlay for zone {}: {:?}", self.id, zone_id.0, overlay);
            api.set_zone_overlay(home_id, zone_id, &overlay)?;

            if let Some(mode) = applied.get(POWER_MODE).and_then(|v| v.as_str()) {
                let card = if mode == "ON" { "power_mode_on" } else { "power_mode_off" };
                report(&self.id, self.host.trigger_flow(card));
            }
            for (capability, value) in applied {
                report(&self.id, self.host.set_capability_value(&capability, value));
            }
        }
        Ok(())
    }

    pub fn set_power_mode<A>(&mut self, api: &A, power: Power, duration_ms: u64) -> Result<(), CommandError>
    where
        A: TadoApi + ?Sized,
    {
        let mode = serde_enum_name(&power).unwrap_or_default();
        let values = CapabilityValues::from([(POWER_MODE.to_string(), CapabilityValue::Text(mode))]);
        self.set_capabilities(api, &values, duration_ms)
    }

    /// Maximum target temperature for [`BOOST_DURATION_MS`]. A no-op without a target
    /// temperature.
    pub fn set_boost_heating<A>(&mut self, api: &A) -> Result<(), CommandError>
    where
        A: TadoApi + ?Sized,
    {
        if !self.host.has_capability(TARGET_TEMPERATURE) {
            return Ok(());
        }
        let max = self
            .host
            .capability_options(TARGET_TEMPERATURE)
            .and_then(|o| o.max)
            .ok_or_else(|| CommandError::NotSupported(TARGET_TEMPERATURE.to_string()))?;
        let values = CapabilityValues::from([(TARGET_TEMPERATURE.to_string(), CapabilityValue::Number(max))]);
        self.set_capabilities(api, &values, BOOST_DURATION_MS)
    }

    /// Drop the overlay, returning the zone to its smart schedule.
    pub fn unset_overlay<A>(&mut self, api: &A) -> Result<(), CommandError>
    where
        A: TadoApi + ?Sized,
    {
        let home_id: HomeId = self.stored(STORE_HOME_ID)?;
        let zone_id: ZoneId = self.stored(STORE_ZONE_ID)?;
        api.delete_zone_overlay(home_id, zone_id)?;
        Ok(())
    }
}

/// Host calls during event handling are best effort.
fn report(id: &str, result: Result<(), HostError>) {
    if let Err(e) = result {
        warn!("{}: {}", id, e);
    }
}

impl<H: DeviceHost> EventSubscriber for TadoDevice<H> {
    fn on_event(&mut self, event: &SyncEvent) -> Vec<DeviceRecord> {
        match event {
            SyncEvent::ZoneData(data) => self.apply_zone_data(data),
            SyncEvent::StateData(records) => {
                self.apply_state_data(records);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CapabilityOptions, MemoryHost};
    use crate::models::state::{AcMode, ZoneMembership};
    use crate::models::tado::{AirConditioningMode, FanLevel, ZoneCapabilities, ZoneOverlayTerminationType};
    use crate::testing::{FakeApi, load_fixture};

    fn stored_host(name: &str, caps: &[&str], zone: i64, zone_type: ZoneType) -> MemoryHost {
        let mut host = MemoryHost::new(name, caps);
        store_set(&mut host, STORE_HOME_ID, &HomeId(1)).unwrap();
        store_set(&mut host, STORE_ZONE_ID, &ZoneId(zone)).unwrap();
        store_set(&mut host, STORE_ZONE_TYPE, &zone_type).unwrap();
        host
    }

    fn thermostat() -> TadoDevice<MemoryHost> {
        let mut host = stored_host(
            "Living - Thermostat",
            &[
                TARGET_TEMPERATURE,
                MEASURE_TEMPERATURE,
                MEASURE_HUMIDITY,
                POWER_MODE,
                DETECT_OPEN_WINDOW,
                ALARM_BATTERY,
                HOT_WATER_ONOFF,
            ],
            1,
            ZoneType::Heating,
        );
        host.set_options(
            TARGET_TEMPERATURE,
            CapabilityOptions {
                min: Some(5.0),
                max: Some(25.0),
                ..Default::default()
            },
        );
        store_set(&mut host, STORE_HOT_WATER_ZONE_ID, &ZoneId(0)).unwrap();
        store_set(&mut host, STORE_HOT_WATER_ZONE_TYPE, &ZoneType::HotWater).unwrap();
        TadoDevice::new("RU1", DeviceKind::Thermostat, host)
    }

    fn member(id: &str, zone: i64, zone_type: ZoneType, connected: bool, battery: BatteryState) -> (String, ZoneMembership) {
        (
            id.to_string(),
            ZoneMembership {
                id: id.to_string(),
                zone_id: ZoneId(zone),
                zone_type,
                connection_state: connected,
                battery_state: Some(battery),
            },
        )
    }

    fn state(zone: i64, data: StateData) -> ZoneStateRecord {
        ZoneStateRecord {
            home_id: HomeId(1),
            zone_id: ZoneId(zone),
            data,
        }
    }

    fn with_serial(mut host: MemoryHost, serial: &str) -> MemoryHost {
        host.set_settings(DeviceSettings {
            serial_number: serial.to_string(),
            ..Default::default()
        })
        .unwrap();
        host
    }

    #[test]
    fn settings_are_copied_to_devices_of_the_same_zone() {
        let mut living = TadoDevice::new("RU1", DeviceKind::Thermostat, with_serial(thermostat().host, "RU1"));
        let mut valve = TadoDevice::new(
            "VA1",
            DeviceKind::Valve,
            with_serial(stored_host("Living - Valve", &[TARGET_TEMPERATURE], 1, ZoneType::Heating), "VA1"),
        );
        let mut bedroom = TadoDevice::new(
            "VA2",
            DeviceKind::Valve,
            with_serial(stored_host("Bedroom - Valve", &[TARGET_TEMPERATURE], 2, ZoneType::Heating), "VA2"),
        );

        let settings = DeviceSettings {
            serial_number: "RU1".into(),
            overlay_mode: OverlayMode::Timer,
            timer_duration: 90,
        };
        let updated = living
            .on_settings_changed(settings.clone(), [&mut valve, &mut bedroom])
            .unwrap();

        assert_eq!(updated, 1);
        assert_eq!(living.host().settings(), settings);
        assert_eq!(
            valve.host().settings(),
            DeviceSettings {
                serial_number: "VA1".into(),
                overlay_mode: OverlayMode::Timer,
                timer_duration: 90,
            }
        );
        assert_eq!(bedroom.host().settings().overlay_mode, OverlayMode::TadoMode);
        assert_eq!(bedroom.host().settings().timer_duration, 60);
    }

    #[test]
    fn records_include_the_merged_hot_water_zone() {
        let device = thermostat();
        let records = device.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], DeviceRecord::new("RU1", HomeId(1), ZoneId(1), ZoneType::Heating));
        assert_eq!(records[1], DeviceRecord::new("RU1-HOT_WATER", HomeId(1), ZoneId(0), ZoneType::HotWater));
    }

    #[test]
    fn zone_drift_updates_store_and_reports_correction() {
        let mut device = thermostat();
        let data = ZoneData::from([
            member("RU1", 3, ZoneType::Heating, true, BatteryState::Normal),
            member("RU1-HOT_WATER", 0, ZoneType::HotWater, true, BatteryState::Normal),
        ]);

        let corrections = device.apply_zone_data(&data);
        assert_eq!(corrections, vec![DeviceRecord::new("RU1", HomeId(1), ZoneId(3), ZoneType::Heating)]);
        assert_eq!(device.record().unwrap().zone_id, ZoneId(3));

        assert!(device.apply_zone_data(&data).is_empty());
    }

    #[test]
    fn connection_and_battery_state_are_applied() {
        let mut device = thermostat();
        let data = ZoneData::from([member("RU1", 1, ZoneType::Heating, false, BatteryState::Low)]);
        device.apply_zone_data(&data);
        assert!(!device.host().is_available());
        assert_eq!(device.host().unavailable_reason(), Some("Device is not connected"));
        assert_eq!(device.host().capability_value(ALARM_BATTERY), Some(CapabilityValue::Bool(true)));

        let data = ZoneData::from([member("RU1", 1, ZoneType::Heating, true, BatteryState::Normal)]);
        device.apply_zone_data(&data);
        assert!(device.host().is_available());
        assert_eq!(device.host().capability_value(ALARM_BATTERY), Some(CapabilityValue::Bool(false)));
    }

    #[test]
    fn state_is_applied_only_for_present_fields() {
        let mut device = thermostat();
        device.apply_state_data(&[state(
            1,
            StateData {
                target_temperature: Some(21.0),
                measure_temperature: Some(20.4),
                measure_humidity: Some(48.0),
                ..Default::default()
            },
        )]);
        device.apply_state_data(&[state(
            1,
            StateData {
                measure_temperature: Some(20.6),
                ..Default::default()
            },
        )]);

        let host = device.host();
        assert_eq!(host.capability_value(TARGET_TEMPERATURE), Some(CapabilityValue::Number(21.0)));
        assert_eq!(host.capability_value(MEASURE_TEMPERATURE), Some(CapabilityValue::Number(20.6)));
        assert_eq!(host.capability_value(MEASURE_HUMIDITY), Some(CapabilityValue::Number(48.0)));
    }

    #[test]
    fn records_of_other_zones_and_homes_are_ignored() {
        let mut device = thermostat();
        let mut other_home = state(1, StateData {
            target_temperature: Some(30.0),
            ..Default::default()
        });
        other_home.home_id = HomeId(2);
        device.apply_state_data(&[other_home, state(7, StateData {
            target_temperature: Some(30.0),
            ..Default::default()
        })]);
        assert_eq!(device.host().capability_value(TARGET_TEMPERATURE), None);
    }

    #[test]
    fn power_mode_triggers_only_on_change() {
        let mut device = thermostat();
        let on = StateData {
            power: Some(true),
            ..Default::default()
        };
        device.apply_state_data(&[state(1, on.clone())]);
        device.apply_state_data(&[state(1, on)]);
        device.apply_state_data(&[state(1, StateData {
            power: Some(false),
            ..Default::default()
        })]);
        assert_eq!(device.host().triggered(), &["power_mode_on", "power_mode_off"]);
        assert_eq!(device.host().capability_value(POWER_MODE), Some(CapabilityValue::Text("OFF".into())));
    }

    #[test]
    fn open_window_triggers_on_rising_edge() {
        let mut device = thermostat();
        for open in [false, true, true, false, true] {
            device.apply_state_data(&[state(1, StateData {
                open_window_detected: Some(open),
                ..Default::default()
            })]);
        }
        let opened = device.host().triggered().iter().filter(|c| *c == "open_window_detected").count();
        assert_eq!(opened, 2);
    }

    #[test]
    fn overlay_transitions_trigger_schedule_cards() {
        let mut device = thermostat();
        for overlay in [OverlayMode::TadoMode, OverlayMode::TadoMode, OverlayMode::Manual, OverlayMode::Timer, OverlayMode::TadoMode] {
            device.apply_state_data(&[state(1, StateData {
                overlay: Some(overlay),
                ..Default::default()
            })]);
        }
        assert_eq!(
            device.host().triggered(),
            &["smart_schedule_activated", "smart_schedule_deactivated", "smart_schedule_activated"]
        );
        assert_eq!(device.current_overlay(), Some(OverlayMode::TadoMode));
    }

    #[test]
    fn hot_water_zone_state_goes_to_hot_water_capabilities() {
        let mut device = thermostat();
        device.apply_state_data(&[state(0, StateData {
            power: Some(true),
            target_temperature: Some(55.0),
            ..Default::default()
        })]);
        assert_eq!(device.host().capability_value(HOT_WATER_ONOFF), Some(CapabilityValue::Bool(true)));
        assert_eq!(device.host().capability_value(POWER_MODE), None);
        assert_eq!(device.host().capability_value(TARGET_TEMPERATURE), None);
    }

    #[test]
    fn standalone_hot_water_device_applies_its_own_zone() {
        let host = stored_host("Hot Water", &[HOT_WATER_ONOFF, HOT_WATER_TEMPERATURE], 0, ZoneType::HotWater);
        let mut device = TadoDevice::new("RU9-HOT_WATER", DeviceKind::HotWater, host);
        device.apply_state_data(&[state(0, StateData {
            power: Some(false),
            target_temperature: Some(50.0),
            ..Default::default()
        })]);
        assert_eq!(device.host().capability_value(HOT_WATER_ONOFF), Some(CapabilityValue::Bool(false)));
        assert_eq!(device.host().capability_value(HOT_WATER_TEMPERATURE), Some(CapabilityValue::Number(50.0)));
        assert_eq!(device.records().len(), 1);
    }

    #[test]
    fn ac_state_sets_custom_capabilities() {
        let host = stored_host("Bedroom - AC Control", &[AC_MODE, FAN_LEVEL, AC_LIGHT], 3, ZoneType::AirConditioning);
        let mut device = TadoDevice::new("WR1", DeviceKind::AirConditioning, host);
        device.apply_state_data(&[state(3, StateData {
            ac_mode: Some(AcMode::Dry),
            fan_level: Some(FanLevel::Level2),
            ..Default::default()
        })]);
        assert_eq!(device.host().capability_value(AC_MODE), Some(CapabilityValue::Text("DRY".into())));
        assert_eq!(device.host().capability_value(FAN_LEVEL), Some(CapabilityValue::Text("LEVEL2".into())));
        assert_eq!(device.host().capability_value(AC_LIGHT), None);
    }

    #[test]
    fn too_long_duration_issues_no_remote_call() {
        let api = FakeApi::new();
        let mut device = thermostat();
        let values = CapabilityValues::from([(TARGET_TEMPERATURE.to_string(), CapabilityValue::Number(21.0))]);
        let err = device.set_capabilities(&api, &values, 90_000_000).unwrap_err();
        assert!(matches!(err, CommandError::DurationOutOfRange));
        assert!(api.calls().is_empty());
        assert_eq!(device.host().capability_value(TARGET_TEMPERATURE), None);
    }

    #[test]
    fn out_of_range_temperature_issues_no_remote_call() {
        let api = FakeApi::new();
        let mut device = thermostat();
        let values = CapabilityValues::from([(TARGET_TEMPERATURE.to_string(), CapabilityValue::Number(26.0))]);
        assert!(matches!(
            device.set_capabilities(&api, &values, 0),
            Err(CommandError::TemperatureOutOfRange { .. })
        ));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn thermostat_and_hot_water_values_go_to_their_zones() {
        let api = FakeApi::new();
        let mut device = thermostat();
        let values = CapabilityValues::from([
            (TARGET_TEMPERATURE.to_string(), CapabilityValue::Number(21.0)),
            (HOT_WATER_ONOFF.to_string(), CapabilityValue::Bool(false)),
        ]);
        device.set_capabilities(&api, &values, 0).unwrap();

        let overlays = api.overlays();
        assert_eq!(overlays.len(), 2);
        let (_, zone, heating) = &overlays[0];
        assert_eq!(*zone, ZoneId(1));
        let setting = heating.setting.as_ref().unwrap();
        assert_eq!(setting.r#type, Some(ZoneType::Heating));
        assert_eq!(setting.power, Some(Power::On));
        assert_eq!(
            heating.termination.as_ref().unwrap().r#type,
            Some(ZoneOverlayTerminationType::TadoMode)
        );

        let (_, zone, hot_water) = &overlays[1];
        assert_eq!(*zone, ZoneId(0));
        let setting = hot_water.setting.as_ref().unwrap();
        assert_eq!(setting.r#type, Some(ZoneType::HotWater));
        assert_eq!(setting.power, Some(Power::Off));

        assert_eq!(device.host().capability_value(HOT_WATER_ONOFF), Some(CapabilityValue::Bool(false)));
    }

    #[test]
    fn failed_hot_water_overlay_keeps_the_accepted_heating_values() {
        let api = FakeApi::new();
        api.fail_overlay(HomeId(1), ZoneId(0));
        let mut device = thermostat();
        let values = CapabilityValues::from([
            (TARGET_TEMPERATURE.to_string(), CapabilityValue::Number(21.0)),
            (HOT_WATER_ONOFF.to_string(), CapabilityValue::Bool(true)),
        ]);

        assert!(matches!(
            device.set_capabilities(&api, &values, 0),
            Err(CommandError::Api(_))
        ));
        assert_eq!(api.count_calls("PUT /homes/1/zones/1/overlay"), 1);
        assert_eq!(api.count_calls("PUT /homes/1/zones/0/overlay"), 1);
        assert_eq!(device.host().capability_value(TARGET_TEMPERATURE), Some(CapabilityValue::Number(21.0)));
        assert_eq!(device.host().capability_value(HOT_WATER_ONOFF), None);
    }

    #[test]
    fn unsupported_capability_is_rejected() {
        let api = FakeApi::new();
        let mut device = thermostat();
        let values = CapabilityValues::from([(AC_MODE.to_string(), CapabilityValue::Text("COOL".into()))]);
        assert!(matches!(device.set_capabilities(&api, &values, 0), Err(CommandError::NotSupported(_))));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn boost_uses_max_temperature_for_half_an_hour() {
        let api = FakeApi::new();
        let mut device = thermostat();
        device.set_boost_heating(&api).unwrap();

        let overlays = api.overlays();
        let overlay = &overlays[0].2;
        let setting = overlay.setting.as_ref().unwrap();
        assert_eq!(setting.temperature.as_ref().unwrap().celsius, Some(25.0));
        let termination = overlay.termination.as_ref().unwrap();
        assert_eq!(termination.r#type, Some(ZoneOverlayTerminationType::Timer));
        assert_eq!(termination.duration_in_seconds, Some(1800));
    }

    #[test]
    fn power_mode_command_triggers_flow() {
        let api = FakeApi::new();
        let mut device = thermostat();
        device.set_power_mode(&api, Power::Off, 0).unwrap();
        assert_eq!(device.host().triggered(), &["power_mode_off"]);
        let overlays = api.overlays();
        assert_eq!(overlays[0].2.setting.as_ref().unwrap().power, Some(Power::Off));
    }

    #[test]
    fn unset_overlay_returns_zone_to_schedule() {
        let api = FakeApi::new();
        let mut device = thermostat();
        device.unset_overlay(&api).unwrap();
        assert_eq!(api.calls(), vec!["DELETE /homes/1/zones/1/overlay".to_string()]);
    }

    #[test]
    fn ac_command_uses_stored_capabilities() {
        let api = FakeApi::new();
        let mut host = stored_host("Bedroom - AC Control", &[TARGET_TEMPERATURE, AC_MODE, FAN_LEVEL], 3, ZoneType::AirConditioning);
        let caps: ZoneCapabilities = load_fixture("zone-capabilities-ac.json");
        store_set(&mut host, STORE_TADO_CAPABILITIES, &caps).unwrap();
        let mut device = TadoDevice::new("WR1", DeviceKind::AirConditioning, host);

        let values = CapabilityValues::from([(AC_MODE.to_string(), CapabilityValue::Text("COOL".into()))]);
        device.set_capabilities(&api, &values, 600_000).unwrap();

        let overlays = api.overlays();
        let (_, zone, overlay) = &overlays[0];
        assert_eq!(*zone, ZoneId(3));
        let setting = overlay.setting.as_ref().unwrap();
        assert_eq!(setting.r#type, Some(ZoneType::AirConditioning));
        assert_eq!(setting.mode, Some(AirConditioningMode::Cool));
        assert_eq!(setting.temperature.as_ref().unwrap().celsius, Some(24.0));
        assert_eq!(overlay.termination.as_ref().unwrap().duration_in_seconds, Some(600));
    }
}
