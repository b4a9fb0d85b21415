//! Domain events and their in-process delivery.
//!
//! # Responsibility
//! - Define what a domain event is (`DomainEvent`) and how handler failures
//!   are reported (`EventError`).
//! - Deliver events synchronously to subscribers (`DomainEventBus`).
//!
//! # Invariants
//! - Delivery is synchronous: `publish` returns after every handler ran or
//!   after the first handler failure.

use std::any::Any;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub mod bus;
pub mod listener;

pub use bus::{DomainEventBus, SubscriptionId};
pub use listener::PostListener;

/// Marker for values that can travel over the event bus.
pub trait DomainEvent: Any + Send + Sync + Debug {
    /// Stable name used in logs and errors.
    fn event_name(&self) -> &'static str;
}

/// A subscriber rejected an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventError {
    pub event: &'static str,
    pub message: String,
}

impl EventError {
    pub fn new(event: &'static str, message: impl Into<String>) -> Self {
        Self {
            event,
            message: message.into(),
        }
    }
}

impl Display for EventError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler for `{}` failed: {}", self.event, self.message)
    }
}

impl Error for EventError {}
