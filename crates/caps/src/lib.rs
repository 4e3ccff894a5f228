//! Capability registry.
//!
//! Regions hand viewers opaque per-purpose HTTP endpoints ("caps"). The
//! gateway swaps the ones it wants to intercept for locally addressable
//! paths and records where each path should route.

pub mod registry;
pub mod token;

pub use {
    registry::{CapabilityEntry, CapabilityRegistry, HandlerKind, RewriteRule},
    token::random_caps_token,
};
