//! Boundary to the external packet-interception engine.

use std::net::SocketAddr;

use gridway_protocol::{Direction, Packet};

/// The proxying engine the gateway is plugged into.
///
/// The engine owns the UDP circuits and the capability HTTP surface; the
/// gateway only classifies traffic and injects synthesized packets through
/// this handle.
pub trait ProxyTransport: Send + Sync {
    /// Deliver a synthesized packet directly to one side of the circuit,
    /// without a round trip through the region.
    fn inject(&self, packet: Packet, direction: Direction);

    /// Map a real simulator endpoint to the locally reachable endpoint the
    /// viewer must dial instead.
    fn proxy_endpoint(&self, region: SocketAddr) -> SocketAddr;

    /// Base URI of the local login/caps listener, used when rewriting
    /// capability URLs to point at ourselves.
    fn login_uri(&self) -> String;
}
