//! Wire-facing types shared by every gridway crate.
//!
//! The external proxying engine decodes viewer/simulator traffic into the
//! typed packets defined here and hands them to the gateway; the gateway
//! answers with a [`HandlerVerdict`] telling the engine what to do with the
//! original bytes.

pub mod bundle;
pub mod constants;
pub mod packets;
pub mod poll;
pub mod region;

pub use {
    bundle::CapabilityBundle,
    packets::{Direction, HandlerVerdict, Packet, PacketKind},
    poll::{PollRequest, PollResponse, QueuedEvent},
};

/// Errors produced while decoding protocol payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("long-poll request body is missing or not a map")]
    MalformedPollBody,

    #[error("required field missing: {0}")]
    MissingField(&'static str),
}
