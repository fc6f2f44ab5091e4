//! In-memory [`TadoApi`] for unit tests.

use crate::client::{TadoApi, TadoClientError};
use crate::models::tado::*;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
pub struct FakeApi {
    user: RefCell<User>,
    zones: RefCell<BTreeMap<HomeId, Vec<Zone>>>,
    states: RefCell<BTreeMap<(HomeId, ZoneId), ZoneState>>,
    capabilities: RefCell<BTreeMap<(HomeId, ZoneId), ZoneCapabilities>>,
    failing_zones: RefCell<BTreeSet<(HomeId, ZoneId)>>,
    failing_overlays: RefCell<BTreeSet<(HomeId, ZoneId)>>,
    hooks: RefCell<BTreeMap<HomeId, Vec<Webhook>>>,
    overlays: RefCell<Vec<(HomeId, ZoneId, ZoneOverlay)>>,
    calls: RefCell<Vec<String>>,
    next_hook: Cell<u64>,
    fail_hook_deletes: Cell<bool>,
}

pub fn load_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let json = std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present");
    serde_json::from_str(&json).expect("parse fixture")
}

fn not_found(what: String) -> TadoClientError {
    TadoClientError::Http {
        status: 404,
        message: what,
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_zones(&self, home_id: HomeId, zones: Vec<Zone>) {
        self.zones.borrow_mut().insert(home_id, zones);
    }

    pub fn set_state(&self, home_id: HomeId, zone_id: ZoneId, state: ZoneState) {
        self.states.borrow_mut().insert((home_id, zone_id), state);
    }

    pub fn set_capabilities(&self, home_id: HomeId, zone_id: ZoneId, caps: ZoneCapabilities) {
        self.capabilities.borrow_mut().insert((home_id, zone_id), caps);
    }

    pub fn fail_zone(&self, home_id: HomeId, zone_id: ZoneId) {
        self.failing_zones.borrow_mut().insert((home_id, zone_id));
    }

    pub fn fail_overlay(&self, home_id: HomeId, zone_id: ZoneId) {
        self.failing_overlays.borrow_mut().insert((home_id, zone_id));
    }

    pub fn add_hook(&self, home_id: HomeId, hook: Webhook) {
        self.hooks.borrow_mut().entry(home_id).or_default().push(hook);
    }

    pub fn hooks(&self, home_id: HomeId) -> Vec<Webhook> {
        self.hooks.borrow().get(&home_id).cloned().unwrap_or_default()
    }

    pub fn fail_hook_deletes(&self) {
        self.fail_hook_deletes.set(true);
    }

    pub fn overlays(&self) -> Vec<(HomeId, ZoneId, ZoneOverlay)> {
        self.overlays.borrow().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl TadoApi for FakeApi {
    fn get_me(&self) -> Result<User, TadoClientError> {
        self.log("GET /me".into());
        Ok(self.user.borrow().clone())
    }

    fn get_zones(&self, home_id: HomeId) -> Result<Vec<Zone>, TadoClientError> {
        self.log(format!("GET /homes/{}/zones", home_id.0));
        self.zones
            .borrow()
            .get(&home_id)
            .cloned()
            .ok_or_else(|| not_found(format!("home {}", home_id.0)))
    }

    fn get_zone_capabilities(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneCapabilities, TadoClientError> {
        self.log(format!("GET /homes/{}/zones/{}/capabilities", home_id.0, zone_id.0));
        self.capabilities
            .borrow()
            .get(&(home_id, zone_id))
            .cloned()
            .ok_or_else(|| not_found(format!("zone {}", zone_id.0)))
    }

    fn get_zone_state(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneState, TadoClientError> {
        self.log(format!("GET /homes/{}/zones/{}/state", home_id.0, zone_id.0));
        if self.failing_zones.borrow().contains(&(home_id, zone_id)) {
            return Err(TadoClientError::Transport("connection reset".into()));
        }
        self.states
            .borrow()
            .get(&(home_id, zone_id))
            .cloned()
            .ok_or_else(|| not_found(format!("zone {}", zone_id.0)))
    }

    fn set_zone_overlay(
        &self,
        home_id: HomeId,
        zone_id: ZoneId,
        overlay: &ZoneOverlay,
    ) -> Result<ZoneOverlay, TadoClientError> {
        self.log(format!("PUT /homes/{}/zones/{}/overlay", home_id.0, zone_id.0));
        if self.failing_overlays.borrow().contains(&(home_id, zone_id)) {
            return Err(TadoClientError::Transport("connection reset".into()));
        }
        self.overlays.borrow_mut().push((home_id, zone_id, overlay.clone()));
        Ok(overlay.clone())
    }

    fn delete_zone_overlay(&self, home_id: HomeId, zone_id: ZoneId) -> Result<(), TadoClientError> {
        self.log(format!("DELETE /homes/{}/zones/{}/overlay", home_id.0, zone_id.0));
        Ok(())
    }

    fn get_webhooks(&self, home_id: HomeId) -> Result<Vec<Webhook>, TadoClientError> {
        self.log(format!("GET /homes/{}/hooks", home_id.0));
        Ok(self.hooks(home_id))
    }

    fn create_webhook(&self, home_id: HomeId, input: &WebhookInput) -> Result<Webhook, TadoClientError> {
        self.log(format!("POST /homes/{}/hooks", home_id.0));
        self.next_hook.set(self.next_hook.get() + 1);
        let hook = Webhook {
            id: Some(WebhookId(self.next_hook.get().to_string())),
            url: Some(input.url.clone()),
            events: Some(input.events.clone()),
        };
        self.add_hook(home_id, hook.clone());
        Ok(hook)
    }

    fn delete_webhook(&self, home_id: HomeId, webhook_id: &WebhookId) -> Result<(), TadoClientError> {
        self.log(format!("DELETE /homes/{}/hooks/{}", home_id.0, webhook_id));
        if self.fail_hook_deletes.get() {
            return Err(TadoClientError::Http {
                status: 500,
                message: "internal error".into(),
            });
        }
        if let Some(hooks) = self.hooks.borrow_mut().get_mut(&home_id) {
            hooks.retain(|h| h.id.as_ref() != Some(webhook_id));
        }
        Ok(())
    }
}
