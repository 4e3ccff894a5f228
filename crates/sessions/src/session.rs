//! One avatar presence in one region.

use std::{sync::Arc, time::Duration};

use {
    tokio::sync::Mutex,
    tracing::{debug, warn},
    uuid::Uuid,
};

use {
    gridway_common::{RegionDescriptor, SessionContext},
    gridway_comms::RegionComms,
    gridway_events::EventQueue,
    gridway_protocol::packets::Vector3,
};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, presence not yet registered with the region.
    Init,
    /// The viewer's live presence.
    Active,
    /// Being handed off; a successor session is already main.
    HandoffPending,
    /// The successor took over; trailing requests only.
    Superseded,
    /// Region-side presence closed, table entries released.
    Closed,
}

/// One avatar presence in one region, with its own capability seed and
/// event queue.
pub struct Session {
    pub region: RegionDescriptor,
    /// Seed capability token presented to this region.
    pub caps_seed: String,
    /// Random id the locally served event-queue path is keyed by.
    pub queue_id: String,
    pub queue: Arc<EventQueue>,
    comms: RegionComms,
    position: Mutex<(Vector3, Vector3)>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        region: RegionDescriptor,
        caps_seed: String,
        queue: Arc<EventQueue>,
        position: Vector3,
        look_at: Vector3,
        presence_timeout: Duration,
    ) -> Self {
        let comms = RegionComms::new(&region, presence_timeout);
        Self {
            region,
            caps_seed,
            queue_id: Uuid::new_v4().to_string(),
            queue,
            comms,
            position: Mutex::new((position, look_at)),
            state: Mutex::new(SessionState::Init),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn set_state(&self, state: SessionState) {
        debug!(region = %self.region.name, ?state, "session state change");
        *self.state.lock().await = state;
    }

    pub async fn position(&self) -> (Vector3, Vector3) {
        *self.position.lock().await
    }

    pub async fn set_position(&self, position: Vector3, look_at: Vector3) {
        *self.position.lock().await = (position, look_at);
    }

    /// Register this presence with the region: identity push, transfer
    /// credential, create-presence call. Either failure aborts.
    pub async fn go(&self, ctx: &SessionContext, auth_key: &str) -> gridway_comms::Result<()> {
        let mut circuit = ctx.circuit().await;
        circuit.caps_path = self.caps_seed.clone();

        let home = ctx.home().await.unwrap_or_else(|| self.region.clone());
        self.comms
            .inform_region_of_user(
                &circuit,
                &home,
                &ctx.user_server_url,
                &ctx.inventory_server_url,
                &ctx.asset_server_url,
            )
            .await?;
        self.comms.create_child_agent(&circuit, auth_key).await?;
        self.set_state(SessionState::Active).await;
        Ok(())
    }

    /// Push current position (and implicitly appearance) to the region.
    pub async fn update(&self, ctx: &SessionContext) {
        let mut circuit = ctx.circuit().await;
        circuit.caps_path = self.caps_seed.clone();
        let (position, look_at) = self.position().await;
        if let Err(e) = self.comms.update_child_agent(&circuit, position, look_at).await {
            warn!(region = %self.region.name, error = %e, "agent update failed");
        }
    }

    /// Read position/appearance back from the region, best effort. Returns
    /// whether anything was retrieved.
    pub async fn retrieve(&self, ctx: &SessionContext) -> bool {
        let agent_id = ctx.agent_id().await;
        match self.comms.retrieve_root_agent(agent_id).await {
            Ok((position, appearance)) => {
                debug!(region = %self.region.name, ?position, "retrieved old presence");
                {
                    let mut guard = self.position.lock().await;
                    guard.0 = position;
                }
                if let Some(appearance) = appearance {
                    ctx.set_appearance(appearance).await;
                }
                true
            },
            Err(e) => {
                warn!(region = %self.region.name, error = %e, "presence retrieval failed");
                false
            },
        }
    }

    /// Rez one attachment on this region's presence.
    pub async fn rez_attachment(&self, agent_id: Uuid, item_id: Uuid) {
        if let Err(e) = self.comms.create_object(agent_id, item_id).await {
            warn!(region = %self.region.name, %item_id, error = %e, "attachment push failed");
        }
    }

    /// Close the region-side presence.
    pub async fn close(&self, agent_id: Uuid) -> gridway_comms::Result<()> {
        self.comms.close_agent(agent_id).await
    }
}
