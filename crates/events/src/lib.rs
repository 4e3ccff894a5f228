//! Per-session asynchronous event delivery.
//!
//! Each avatar session owns one long-poll event queue. Producers (handoff,
//! chat relay, appearance updates) enqueue named events; the viewer drains
//! them through the locally served event-queue capability.

pub mod broker;
pub mod llevents;
pub mod queue;

pub use {
    broker::QueueBroker,
    queue::{EventQueue, QueueError},
};
