//! Type-keyed synchronous publish/subscribe.

use crate::event::{DomainEvent, EventError};
use log::{debug, error};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Handler = Arc<dyn Fn(&dyn Any) -> Result<(), EventError> + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// In-process event bus.
///
/// Handlers run on the publishing thread, in registration order. The
/// registry lock is released before any handler runs, so handlers may
/// subscribe or publish themselves.
#[derive(Default)]
pub struct DomainEventBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<TypeId, Vec<Subscription>>>,
}

impl DomainEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for future events of type `E`.
    ///
    /// Events published before this call are not replayed.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: DomainEvent,
        F: Fn(&E) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let handler: Handler = Arc::new(move |event: &dyn Any| match event.downcast_ref::<E>() {
            Some(event) => handler(event),
            None => Ok(()),
        });

        self.write_handlers()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscription { id, handler });

        debug!(
            "event=bus_subscribe module=event status=ok event_type={} subscription={}",
            type_name::<E>(),
            id.0
        );
        id
    }

    /// Removes a subscription. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.write_handlers();
        let mut removed = false;
        for subscriptions in handlers.values_mut() {
            let before = subscriptions.len();
            subscriptions.retain(|subscription| subscription.id != id);
            removed |= subscriptions.len() != before;
        }
        handlers.retain(|_, subscriptions| !subscriptions.is_empty());
        removed
    }

    pub fn subscriber_count<E: DomainEvent>(&self) -> usize {
        self.read_handlers()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Delivers `event` to every current subscriber of `E`.
    ///
    /// # Errors
    /// - The first handler error. Later handlers are not invoked.
    pub fn publish<E: DomainEvent>(&self, event: &E) -> Result<(), EventError> {
        let handlers: Vec<Handler> = self
            .read_handlers()
            .get(&TypeId::of::<E>())
            .map(|subscriptions| {
                subscriptions
                    .iter()
                    .map(|subscription| Arc::clone(&subscription.handler))
                    .collect()
            })
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(
                "event=bus_publish module=event status=skipped event_name={} reason=no_subscribers",
                event.event_name()
            );
            return Ok(());
        }

        let payload: &dyn Any = event;
        for handler in &handlers {
            if let Err(err) = handler(payload) {
                error!(
                    "event=bus_publish module=event status=error event_name={} error={err}",
                    event.event_name()
                );
                return Err(err);
            }
        }

        debug!(
            "event=bus_publish module=event status=ok event_name={} delivered={}",
            event.event_name(),
            handlers.len()
        );
        Ok(())
    }

    fn read_handlers(&self) -> RwLockReadGuard<'_, HashMap<TypeId, Vec<Subscription>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handlers(&self) -> RwLockWriteGuard<'_, HashMap<TypeId, Vec<Subscription>>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for DomainEventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let registered: usize = self.read_handlers().values().map(Vec::len).sum();
        f.debug_struct("DomainEventBus")
            .field("subscriptions", &registered)
            .finish()
    }
}
