//! `stockflow-events`: event contracts and in-process distribution.
//!
//! Stock move lifecycle facts (created, submitted, approved, rejected) are
//! expressed as typed events in the domain crates; this crate only provides
//! the transport-agnostic mechanics: the `Event` trait, envelopes, and a bus.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
