//! Fan-out of normalized data to subscribed devices.

use crate::models::state::{DeviceRecord, ZoneData, ZoneStateRecord};
use log::warn;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Zone membership of one home, keyed by device id.
    ZoneData(ZoneData),
    /// State records of one home. A zone without an entry had no update.
    StateData(Vec<ZoneStateRecord>),
}

pub trait EventSubscriber {
    /// Apply `event`. Returns the records whose zone moved underneath the subscriber,
    /// which the engine writes back into its registry.
    fn on_event(&mut self, event: &SyncEvent) -> Vec<DeviceRecord>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Rc<RefCell<dyn EventSubscriber>>)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Rc<RefCell<dyn EventSubscriber>>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every subscriber in subscription order and collect their
    /// zone corrections.
    pub fn publish(&self, event: &SyncEvent) -> Vec<DeviceRecord> {
        let mut corrections = Vec::new();
        for (id, subscriber) in &self.subscribers {
            match subscriber.try_borrow_mut() {
                Ok(mut s) => corrections.extend(s.on_event(event)),
                Err(_) => warn!("Subscriber {:?} is busy, skipping event", id),
            }
        }
        corrections
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
