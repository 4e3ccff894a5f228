//! Gateway wiring: classifies intercepted traffic and routes it to the
//! session manager, the asset/inventory relay, or the capability registry.

pub mod caps_flow;
pub mod dispatcher;
pub mod login;
pub mod state;

pub use {
    caps_flow::{CapsOutcome, CapsStage},
    dispatcher::Dispatcher,
    state::{Gateway, GatewayState},
};
