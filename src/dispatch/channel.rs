//! The channel adapter seam between the dispatcher and concrete transports.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{error::DispatchError, payload::NotificationPayload};
use crate::models::rule::ChannelKind;

/// One delivery transport. Adapters are stateless with respect to intents;
/// the dispatcher owns attempt counting and retry scheduling.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel kind this adapter serves.
    fn kind(&self) -> ChannelKind;

    /// Delivers one payload to its destination.
    async fn send(&self, payload: &NotificationPayload) -> Result<(), DispatchError>;
}

/// Registry of configured adapters, one per channel kind.
#[derive(Default)]
pub struct ChannelRegistry {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Looks up the adapter for a channel kind.
    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut webhook = MockChannelAdapter::new();
        webhook.expect_kind().return_const(ChannelKind::Webhook);

        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(webhook));

        assert!(registry.get(ChannelKind::Webhook).is_some());
        assert!(registry.get(ChannelKind::Email).is_none());
    }
}
