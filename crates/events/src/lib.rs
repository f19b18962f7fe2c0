//! Domain event plumbing.
//!
//! Events are published **after** a successful commit, as notifications for
//! downstream consumers (approver inboxes, stock movements, audit feeds). The
//! store remains the source of truth; publication is best-effort.

pub mod bus;
pub mod envelope;
pub mod event;

pub use bus::{EventBus, InMemoryBusError, InMemoryEventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
