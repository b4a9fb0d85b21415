//! Listener reacting to published posts.

use crate::event::bus::{DomainEventBus, SubscriptionId};
use crate::event::EventError;
use crate::model::post::PostPublishedEvent;
use log::info;
use std::sync::{Arc, Mutex, PoisonError};

/// Logs every published post and keeps the events it received.
///
/// Clones share one record, so a clone can be subscribed while the original
/// is inspected.
#[derive(Debug, Clone, Default)]
pub struct PostListener {
    received: Arc<Mutex<Vec<PostPublishedEvent>>>,
}

impl PostListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, bus: &DomainEventBus) -> SubscriptionId {
        let listener = self.clone();
        bus.subscribe::<PostPublishedEvent, _>(move |event| listener.on_post_published(event))
    }

    pub fn on_post_published(&self, event: &PostPublishedEvent) -> Result<(), EventError> {
        info!(
            "event=post_published module=event status=ok post_id={} title_chars={}",
            event
                .post_id
                .map_or_else(|| "none".to_string(), |id| id.to_string()),
            event.title.chars().count()
        );
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    /// Events received so far, in delivery order.
    pub fn received(&self) -> Vec<PostPublishedEvent> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::PostListener;
    use crate::event::DomainEventBus;
    use crate::model::post::PostPublishedEvent;

    #[test]
    fn subscribed_listener_records_each_publish_once() {
        let bus = DomainEventBus::new();
        let listener = PostListener::new();
        listener.subscribe(&bus);

        let event = PostPublishedEvent {
            post_id: Some(1),
            title: "event".to_string(),
        };
        bus.publish(&event).unwrap();

        assert_eq!(listener.received(), vec![event]);
    }
}
