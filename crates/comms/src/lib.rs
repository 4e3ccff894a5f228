//! Backend RPC clients: grid lookup, region presence calls, identity auth,
//! and the home-grid inventory/asset service.
//!
//! Every call is a single request/response with no automatic retry; failures
//! are logged at the call site and surfaced to the caller.

pub mod auth;
pub mod grid;
pub mod inventory;
pub mod region;
pub mod types;

pub use {
    auth::AuthClient,
    grid::GridClient,
    inventory::InventoryService,
    region::RegionComms,
    types::{Asset, InventoryCollection, InventoryFolder, InventoryItem},
};

/// Errors from backend RPC calls.
#[derive(Debug, thiserror::Error)]
pub enum CommsError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend reported failure: {0}")]
    Backend(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, CommsError>;
