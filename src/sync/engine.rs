//! The sync engine: one per authenticated account.
//!
//! It owns the device registry, the timers, the webhook bookkeeping and the event
//! bus. A pass walks every registered home in order:
//!
//! 1. list the zones and publish the membership (devices correct zone drift here),
//! 2. recompute the zones to poll from the corrected registry,
//! 3. fetch each zone's state, isolating per-zone failures,
//! 4. publish the collected state records.

use crate::client::{TadoApi, TadoClientError, decode_json};
use crate::host::WebhookChannel;
use crate::models::state::{DeviceRecord, ZoneStateRecord};
use crate::models::tado::{HomeId, WebhookEvent, ZoneId};
use crate::sync::events::{EventBus, EventSubscriber, SubscriptionId, SyncEvent};
use crate::sync::parse::{parse_webhook_state, parse_zone_data, parse_zone_state};
use crate::sync::registry::DeviceRegistry;
use crate::sync::scheduler::{Scheduler, Trigger};
use crate::sync::webhooks::WebhookManager;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// A remote call that failed during a pass. `zone_id` is `None` for the zone listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub home_id: HomeId,
    pub zone_id: Option<ZoneId>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub homes: usize,
    pub records: usize,
    pub failures: Vec<SyncFailure>,
}

pub struct SyncEngine<A: TadoApi> {
    api: A,
    registry: DeviceRegistry,
    scheduler: Scheduler,
    webhooks: WebhookManager,
    channel: Option<Box<dyn WebhookChannel>>,
    bus: EventBus,
}

impl<A: TadoApi> SyncEngine<A> {
    pub fn new(api: A, scheduler: Scheduler) -> Self {
        SyncEngine {
            api,
            registry: DeviceRegistry::new(),
            scheduler,
            webhooks: WebhookManager::new(),
            channel: None,
            bus: EventBus::new(),
        }
    }

    /// Register remote webhooks delivering to `channel`. Without one the engine only polls.
    pub fn with_webhook_channel(mut self, channel: Box<dyn WebhookChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn webhooks(&self) -> &WebhookManager {
        &self.webhooks
    }

    pub fn webhook_channel_open(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn subscribe(&mut self, subscriber: Rc<RefCell<dyn EventSubscriber>>) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Add a device. The first fetch is debounced, and the device's home gets a webhook.
    pub fn register_device(&mut self, record: DeviceRecord, now: Instant) -> bool {
        let home_id = record.home_id;
        if !self.registry.register(record) {
            return false;
        }
        self.scheduler.on_register(now);
        self.register_webhook(home_id);
        true
    }

    pub fn update_device(&mut self, record: DeviceRecord) -> bool {
        self.registry.update(record)
    }

    /// Remove a device, drop webhooks of homes without devices, and go idle once
    /// nothing is left.
    pub fn unregister_device(&mut self, id: &str) -> Option<DeviceRecord> {
        let removed = self.registry.unregister(id);
        self.webhooks.prune(&self.api, &self.registry.homes());
        if self.registry.is_empty() {
            self.scheduler.on_empty();
            if let Some(channel) = self.channel.as_deref_mut() {
                channel.close();
            }
        }
        removed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Run the pass due at `now`, if any.
    pub fn poll_timers(&mut self, now: Instant) -> Option<SyncReport> {
        let trigger = self.scheduler.poll(now)?;
        match trigger {
            Trigger::Debounce => debug!("Initial fetch after registration"),
            Trigger::Interval => debug!("Polling interval elapsed"),
        }
        Some(self.sync_all())
    }

    pub fn sync_all(&mut self) -> SyncReport {
        let start = Instant::now();
        let mut report = SyncReport::default();
        let homes: Vec<HomeId> = self.registry.home_zone_index().into_keys().collect();
        for home_id in homes {
            report.homes += 1;
            self.sync_home(home_id, &mut report);
        }
        info!(
            "Synced {} home(s): {} zone record(s), {} failure(s) in {} ms",
            report.homes,
            report.records,
            report.failures.len(),
            start.elapsed().as_millis()
        );
        report
    }

    fn sync_home(&mut self, home_id: HomeId, report: &mut SyncReport) {
        let zones = match self.api.get_zones(home_id) {
            Ok(zones) => zones,
            Err(e) => {
                warn!("Unable to list zones of home {}: {}", home_id.0, e);
                report.failures.push(SyncFailure {
                    home_id,
                    zone_id: None,
                    error: e.to_string(),
                });
                return;
            }
        };
        self.publish(SyncEvent::ZoneData(parse_zone_data(&zones)));

        // Corrections from the zone data may have moved devices between zones.
        let zone_ids = self
            .registry
            .home_zone_index()
            .remove(&home_id)
            .unwrap_or_default();

        let mut records = Vec::with_capacity(zone_ids.len());
        for zone_id in zone_ids {
            match self.api.get_zone_state(home_id, zone_id) {
                Ok(state) => records.push(ZoneStateRecord {
                    home_id,
                    zone_id,
                    data: parse_zone_state(&state),
                }),
                Err(e) => {
                    warn!("Unable to fetch state of zone {} in home {}: {}", zone_id.0, home_id.0, e);
                    report.failures.push(SyncFailure {
                        home_id,
                        zone_id: Some(zone_id),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.records += records.len();
        self.publish(SyncEvent::StateData(records));
    }

    /// Decode and apply one inbound webhook delivery.
    pub fn handle_webhook_body(&mut self, body: &str) -> Result<(), TadoClientError> {
        let event: WebhookEvent = decode_json(body)?;
        self.handle_webhook_event(&event);
        Ok(())
    }

    pub fn handle_webhook_event(&mut self, event: &WebhookEvent) {
        let Some(home_id) = event.home.as_ref().and_then(|h| h.id) else {
            warn!("Ignoring webhook delivery without home id");
            return;
        };
        let Some(zone) = event.zone.as_ref() else {
            warn!("Ignoring webhook delivery for home {} without zone", home_id.0);
            return;
        };
        let Some(zone_id) = zone.id else {
            warn!("Ignoring webhook delivery for home {} without zone id", home_id.0);
            return;
        };
        debug!("Webhook delivery for home {} zone {}", home_id.0, zone_id.0);

        if zone.devices.as_ref().is_some_and(|d| !d.is_empty()) {
            let data = parse_zone_data(std::slice::from_ref(zone));
            if !data.is_empty() {
                self.publish(SyncEvent::ZoneData(data));
            }
        }

        self.publish(SyncEvent::StateData(vec![ZoneStateRecord {
            home_id,
            zone_id,
            data: parse_webhook_state(event),
        }]));
    }

    fn publish(&mut self, event: SyncEvent) {
        for record in self.bus.publish(&event) {
            self.registry.update(record);
        }
    }

    fn register_webhook(&mut self, home_id: HomeId) {
        let Some(channel) = self.channel.as_deref_mut() else {
            return;
        };
        match self.webhooks.register(&self.api, channel, home_id) {
            Ok(Some(id)) => debug!("Home {} delivers to webhook {}", home_id.0, id),
            Ok(None) => {}
            Err(e) => warn!("Unable to register webhook for home {}: {}", home_id.0, e),
        }
    }
}
