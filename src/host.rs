//! Interfaces of the hub runtime this crate plugs into, plus in-memory stand-ins.
//!
//! The hub owns capability state, availability, the per-device key/value store,
//! settings, flow triggers and the inbound webhook channel. The sync engine and the
//! devices only ever go through these traits.

use crate::models::state::OverlayMode;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CapabilityValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CapabilityValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CapabilityValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CapabilityValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl core::fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CapabilityValue::Bool(b) => write!(f, "{}", b),
            CapabilityValue::Number(n) => write!(f, "{}", n),
            CapabilityValue::Text(s) => f.write_str(s),
        }
    }
}

/// Range and presentation options of a capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilityOptions {
    pub title: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub decimals: Option<u8>,
    /// Capability accepts a duration (manual/timer overlay from flows).
    pub duration: bool,
}

/// User-facing device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSettings {
    pub serial_number: String,
    /// How an overlay set from the hub terminates when no explicit duration is given.
    pub overlay_mode: OverlayMode,
    /// Overlay length in minutes when `overlay_mode` is `TIMER`.
    pub timer_duration: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            serial_number: String::new(),
            overlay_mode: OverlayMode::TadoMode,
            timer_duration: 60,
        }
    }
}

#[derive(Debug)]
pub enum HostError {
    UnknownCapability(String),
    Store(String),
    Channel(String),
}

impl core::fmt::Display for HostError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HostError::UnknownCapability(c) => write!(f, "device has no capability {}", c),
            HostError::Store(e) => write!(f, "device store error: {}", e),
            HostError::Channel(e) => write!(f, "webhook channel error: {}", e),
        }
    }
}

impl std::error::Error for HostError {}

/// Per-device view of the hub.
pub trait DeviceHost {
    fn has_capability(&self, capability: &str) -> bool;
    fn capability_value(&self, capability: &str) -> Option<CapabilityValue>;
    fn set_capability_value(&mut self, capability: &str, value: CapabilityValue) -> Result<(), HostError>;
    fn capability_options(&self, capability: &str) -> Option<CapabilityOptions>;
    fn set_available(&mut self) -> Result<(), HostError>;
    fn set_unavailable(&mut self, reason: &str) -> Result<(), HostError>;
    fn store_value(&self, key: &str) -> Option<Value>;
    fn set_store_value(&mut self, key: &str, value: Value) -> Result<(), HostError>;
    fn settings(&self) -> DeviceSettings;
    fn set_settings(&mut self, settings: DeviceSettings) -> Result<(), HostError>;
    fn trigger_flow(&mut self, card: &str) -> Result<(), HostError>;
}

/// Typed read from the device store; missing or mistyped values read as `None`.
pub fn store_get<T: serde::de::DeserializeOwned>(host: &(impl DeviceHost + ?Sized), key: &str) -> Option<T> {
    host.store_value(key).and_then(|v| serde_json::from_value(v).ok())
}

/// Typed write to the device store.
pub fn store_set<T: Serialize>(host: &mut (impl DeviceHost + ?Sized), key: &str, value: &T) -> Result<(), HostError> {
    let value = serde_json::to_value(value).map_err(|e| HostError::Store(e.to_string()))?;
    host.set_store_value(key, value)
}

/// The hub's inbound webhook endpoint that remote hooks deliver to.
pub trait WebhookChannel {
    /// Open the channel, or reuse it when already open, and return its public callback URL.
    fn open(&mut self) -> Result<String, HostError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// Channel with a fixed, externally routed callback URL.
#[derive(Debug, Clone)]
pub struct StaticWebhookChannel {
    url: String,
    open: bool,
}

impl StaticWebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        StaticWebhookChannel {
            url: url.into(),
            open: false,
        }
    }
}

impl WebhookChannel for StaticWebhookChannel {
    fn open(&mut self) -> Result<String, HostError> {
        if self.url.trim().is_empty() {
            return Err(HostError::Channel("callback url is empty".into()));
        }
        if !self.open {
            info!("Webhook channel open at {}", self.url);
            self.open = true;
        }
        Ok(self.url.clone())
    }

    fn close(&mut self) {
        if self.open {
            info!("Webhook channel closed");
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// In-memory device host. Backs the standalone daemon and the tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    pub name: String,
    capabilities: BTreeMap<String, Option<CapabilityValue>>,
    options: BTreeMap<String, CapabilityOptions>,
    store: BTreeMap<String, Value>,
    settings: DeviceSettings,
    unavailable: Option<String>,
    triggered: Vec<String>,
}

impl MemoryHost {
    pub fn new(name: impl Into<String>, capabilities: &[&str]) -> Self {
        MemoryHost {
            name: name.into(),
            capabilities: capabilities.iter().map(|c| (c.to_string(), None)).collect(),
            ..Default::default()
        }
    }

    pub fn add_capability(&mut self, capability: &str) {
        self.capabilities.entry(capability.to_string()).or_insert(None);
    }

    pub fn set_options(&mut self, capability: &str, options: CapabilityOptions) {
        self.options.insert(capability.to_string(), options);
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    /// Flow cards triggered so far, oldest first.
    pub fn triggered(&self) -> &[String] {
        &self.triggered
    }
}

impl DeviceHost for MemoryHost {
    fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains_key(capability)
    }

    fn capability_value(&self, capability: &str) -> Option<CapabilityValue> {
        self.capabilities.get(capability).cloned().flatten()
    }

    fn set_capability_value(&mut self, capability: &str, value: CapabilityValue) -> Result<(), HostError> {
        let slot = self
            .capabilities
            .get_mut(capability)
            .ok_or_else(|| HostError::UnknownCapability(capability.to_string()))?;
        if slot.as_ref() != Some(&value) {
            info!("{}: {} = {}", self.name, capability, value);
        }
        *slot = Some(value);
        Ok(())
    }

    fn capability_options(&self, capability: &str) -> Option<CapabilityOptions> {
        self.options.get(capability).cloned()
    }

    fn set_available(&mut self) -> Result<(), HostError> {
        if self.unavailable.take().is_some() {
            info!("{}: available", self.name);
        }
        Ok(())
    }

    fn set_unavailable(&mut self, reason: &str) -> Result<(), HostError> {
        if self.unavailable.as_deref() != Some(reason) {
            info!("{}: unavailable ({})", self.name, reason);
        }
        self.unavailable = Some(reason.to_string());
        Ok(())
    }

    fn store_value(&self, key: &str) -> Option<Value> {
        self.store.get(key).cloned()
    }

    fn set_store_value(&mut self, key: &str, value: Value) -> Result<(), HostError> {
        self.store.insert(key.to_string(), value);
        Ok(())
    }

    fn settings(&self) -> DeviceSettings {
        self.settings.clone()
    }

    fn set_settings(&mut self, settings: DeviceSettings) -> Result<(), HostError> {
        if self.settings != settings {
            info!(
                "{}: settings overlay_mode={:?} timer_duration={}",
                self.name, settings.overlay_mode, settings.timer_duration
            );
        }
        self.settings = settings;
        Ok(())
    }

    fn trigger_flow(&mut self, card: &str) -> Result<(), HostError> {
        debug!("{}: flow trigger {}", self.name, card);
        self.triggered.push(card.to_string());
        Ok(())
    }
}
