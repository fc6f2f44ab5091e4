//! Remote webhook registration, one hook per home.

use crate::client::{TadoApi, TadoClientError};
use crate::host::{HostError, WebhookChannel};
use crate::models::tado::{HomeId, WEBHOOK_EVENTS, WebhookId, WebhookInput};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub enum WebhookError {
    Channel(HostError),
    Api(TadoClientError),
    /// The API created a hook but did not return its id.
    MissingId,
}

impl core::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WebhookError::Channel(e) => write!(f, "{}", e),
            WebhookError::Api(e) => write!(f, "{}", e),
            WebhookError::MissingId => write!(f, "created webhook has no id"),
        }
    }
}

impl std::error::Error for WebhookError {}

impl From<HostError> for WebhookError {
    fn from(value: HostError) -> Self {
        WebhookError::Channel(value)
    }
}

impl From<TadoClientError> for WebhookError {
    fn from(value: TadoClientError) -> Self {
        WebhookError::Api(value)
    }
}

/// Takes `&mut self` for registration, so the engine's command loop is the only
/// caller and attempts cannot overlap.
#[derive(Debug, Default)]
pub struct WebhookManager {
    hooks: BTreeMap<HomeId, WebhookId>,
}

impl WebhookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_for(&self, home_id: HomeId) -> Option<&WebhookId> {
        self.hooks.get(&home_id)
    }

    /// Make sure `home_id` has a remote hook pointing at the channel's URL.
    ///
    /// Returns the id when a hook was adopted or created, `None` when the home already
    /// had one.
    pub fn register<A>(
        &mut self,
        api: &A,
        channel: &mut dyn WebhookChannel,
        home_id: HomeId,
    ) -> Result<Option<WebhookId>, WebhookError>
    where
        A: TadoApi + ?Sized,
    {
        if self.hooks.contains_key(&home_id) {
            debug!("Home {} already has a webhook", home_id.0);
            return Ok(None);
        }

        let id = find_or_create(api, channel, home_id)?;
        self.hooks.insert(home_id, id.clone());
        Ok(Some(id))
    }

    /// Delete the hooks of homes not in `active`. Deletion failures are logged and the
    /// id is forgotten regardless; a leftover remote hook is harmless.
    pub fn prune<A>(&mut self, api: &A, active: &BTreeSet<HomeId>) -> usize
    where
        A: TadoApi + ?Sized,
    {
        let stale: Vec<HomeId> = self.hooks.keys().filter(|h| !active.contains(h)).copied().collect();
        for home_id in &stale {
            let Some(id) = self.hooks.remove(home_id) else {
                continue;
            };
            match api.delete_webhook(*home_id, &id) {
                Ok(()) => info!("Deleted webhook {} of home {}", id, home_id.0),
                Err(e) => warn!("Unable to delete webhook {} of home {}: {}", id, home_id.0, e),
            }
        }
        stale.len()
    }
}

fn find_or_create<A>(api: &A, channel: &mut dyn WebhookChannel, home_id: HomeId) -> Result<WebhookId, WebhookError>
where
    A: TadoApi + ?Sized,
{
    let url = channel.open()?;
    let existing = api
        .get_webhooks(home_id)?
        .into_iter()
        .find(|h| h.url.as_deref() == Some(url.as_str()))
        .and_then(|h| h.id);
    if let Some(id) = existing {
        info!("Reusing webhook {} of home {}", id, home_id.0);
        return Ok(id);
    }

    let input = WebhookInput {
        events: WEBHOOK_EVENTS.iter().map(|e| e.to_string()).collect(),
        url,
    };
    let created = api.create_webhook(home_id, &input)?;
    let id = created.id.ok_or(WebhookError::MissingId)?;
    info!("Created webhook {} for home {}", id, home_id.0);
    Ok(id)
}
