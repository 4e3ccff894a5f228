//! Shared domain types: avatar identity, region descriptors, the per-process
//! session context, and the boundary trait to the external proxying engine.

pub mod circuit;
pub mod context;
pub mod region;
pub mod transport;

pub use {
    circuit::{Appearance, CircuitData},
    context::SessionContext,
    region::RegionDescriptor,
    transport::ProxyTransport,
};
