//! Identity lifecycle events and their delivery.
//!
//! The identity provider emits `IdentityCreated` / `IdentityDeleted` with
//! at-least-once delivery; consumers must be idempotent.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod identity;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use identity::{AuthProvider, IdentityCreated, IdentityDeleted, IdentityEvent};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
