//! Per-process session context.
//!
//! One avatar, one gateway instance. Everything here is fixed at login time
//! except the appearance, which a handoff may refresh from the outgoing
//! region.

use {tokio::sync::RwLock, uuid::Uuid};

use crate::{
    circuit::{Appearance, CircuitData},
    region::RegionDescriptor,
};

/// Shared identity and home-grid wiring, passed explicitly to every component
/// that needs it.
#[derive(Debug)]
pub struct SessionContext {
    circuit: RwLock<CircuitData>,
    /// Home region: the region of first login, reported to every region the
    /// avatar visits.
    home: RwLock<Option<RegionDescriptor>>,
    pub user_server_url: String,
    pub inventory_server_url: String,
    pub asset_server_url: String,
    pub asset_server_send_key: String,
    pub auth_token: Uuid,
}

impl SessionContext {
    pub fn new(
        circuit: CircuitData,
        user_server_url: String,
        inventory_server_url: String,
        asset_server_url: String,
        asset_server_send_key: String,
        auth_token: Uuid,
    ) -> Self {
        Self {
            circuit: RwLock::new(circuit),
            home: RwLock::new(None),
            user_server_url,
            inventory_server_url: inventory_server_url.trim_end_matches('/').to_string(),
            asset_server_url,
            asset_server_send_key,
            auth_token,
        }
    }

    pub async fn circuit(&self) -> CircuitData {
        self.circuit.read().await.clone()
    }

    pub async fn agent_id(&self) -> Uuid {
        self.circuit.read().await.agent_id
    }

    /// Refresh the appearance from a prior session during handoff.
    pub async fn set_appearance(&self, appearance: Appearance) {
        self.circuit.write().await.appearance = appearance;
    }

    /// Bump the wearables serial and return the new value.
    pub async fn next_appearance_serial(&self) -> u32 {
        let mut circuit = self.circuit.write().await;
        circuit.appearance.serial += 1;
        circuit.appearance.serial
    }

    /// The home region is pinned on first login and never changes.
    pub async fn set_home_if_unset(&self, region: RegionDescriptor) {
        let mut home = self.home.write().await;
        if home.is_none() {
            *home = Some(region);
        }
    }

    pub async fn home(&self) -> Option<RegionDescriptor> {
        self.home.read().await.clone()
    }
}
