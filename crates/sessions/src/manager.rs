//! The session manager: owns the session table and drives handoffs.

use std::{sync::Arc, time::Duration};

use {
    tokio::sync::{RwLock, oneshot},
    tracing::{debug, info, warn},
};

use {
    gridway_caps::{CapabilityEntry, CapabilityRegistry, HandlerKind, random_caps_token},
    gridway_common::{ProxyTransport, RegionDescriptor, SessionContext},
    gridway_comms::{AuthClient, GridClient},
    gridway_events::{EventQueue, QueueBroker, llevents},
    gridway_protocol::packets::Vector3,
};

use crate::session::{Session, SessionState};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("destination region lookup failed: {0}")]
    GridLookup(gridway_comms::CommsError),

    #[error("presence registration failed: {0}")]
    Registration(gridway_comms::CommsError),

    #[error("no active session")]
    NoSession,
}

/// Timeouts for the manager's backend calls.
#[derive(Debug, Clone, Copy)]
pub struct ManagerTimeouts {
    pub grid_lookup: Duration,
    pub region_presence: Duration,
}

impl Default for ManagerTimeouts {
    fn default() -> Self {
        Self {
            grid_lookup: Duration::from_secs(3),
            region_presence: Duration::from_secs(6),
        }
    }
}

/// Owns the avatar's sessions and the teleport handoff state machine. The
/// only component that touches the capability registry and the queue broker
/// as a pair: registering a session always creates both a capability entry
/// and a queue.
pub struct SessionManager {
    ctx: Arc<SessionContext>,
    transport: Arc<dyn ProxyTransport>,
    caps: Arc<CapabilityRegistry>,
    broker: Arc<QueueBroker>,
    grid: GridClient,
    auth: AuthClient,
    timeouts: ManagerTimeouts,
    /// Grid service of the operator currently hosting the avatar.
    grid_server: RwLock<(String, String)>,
    main: RwLock<Option<Arc<Session>>>,
    old: RwLock<Option<Arc<Session>>>,
}

impl SessionManager {
    pub async fn new(
        ctx: Arc<SessionContext>,
        transport: Arc<dyn ProxyTransport>,
        caps: Arc<CapabilityRegistry>,
        broker: Arc<QueueBroker>,
        grid_server_url: String,
        grid_server_key: String,
        timeouts: ManagerTimeouts,
    ) -> Arc<Self> {
        let auth = AuthClient::new(
            ctx.user_server_url.clone(),
            ctx.agent_id().await,
            ctx.auth_token,
            timeouts.region_presence,
        );
        Arc::new(Self {
            ctx,
            transport,
            caps,
            broker,
            grid: GridClient::new(timeouts.grid_lookup),
            auth,
            timeouts,
            grid_server: RwLock::new((grid_server_url, grid_server_key)),
            main: RwLock::new(None),
            old: RwLock::new(None),
        })
    }

    pub async fn main_session(&self) -> Option<Arc<Session>> {
        self.main.read().await.clone()
    }

    pub async fn old_session(&self) -> Option<Arc<Session>> {
        self.old.read().await.clone()
    }

    /// Build a session and register its queue and capability entry.
    async fn create_session(
        &self,
        region: RegionDescriptor,
        caps_seed: String,
        position: Vector3,
        look_at: Vector3,
    ) -> Arc<Session> {
        let queue = Arc::new(EventQueue::new());
        let session = Arc::new(Session::new(
            region,
            caps_seed,
            Arc::clone(&queue),
            position,
            look_at,
            self.timeouts.region_presence,
        ));
        self.broker.register(session.queue_id.clone(), queue);
        self.caps.register(CapabilityEntry {
            token: session.queue_id.clone(),
            region: session.region.external_endpoint(),
            kind: HandlerKind::EventQueue,
            forward_url: None,
        });
        session
    }

    /// First session, from a successful login. The login response's seed
    /// token stays: the region already knows it.
    pub async fn login(
        &self,
        region: RegionDescriptor,
        caps_seed: String,
    ) -> Result<Arc<Session>, SessionError> {
        self.ctx.set_home_if_unset(region.clone()).await;
        let session = self
            .create_session(region, caps_seed, [128.0, 128.0, 70.0], [0.99, 0.042, 0.0])
            .await;

        let key = self.transfer_key().await;
        session
            .go(&self.ctx, &key)
            .await
            .map_err(SessionError::Registration)?;

        info!(region = %session.region.name, "logged in, session active");
        *self.main.write().await = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Teleport handoff. Returns `Ok(false)` when the destination is the
    /// current region and the packet should be forwarded for the region to
    /// handle natively; `Ok(true)` when the handoff was started and the
    /// packet must be consumed.
    ///
    /// No table lock is held across the network calls here; a concurrent
    /// reader may observe the new session mid-creation, which is accepted
    /// over holding locks through I/O.
    pub async fn teleport(
        &self,
        handle: u64,
        position: Vector3,
        look_at: Vector3,
    ) -> Result<bool, SessionError> {
        let Some(current) = self.main_session().await else {
            return Err(SessionError::NoSession);
        };
        if current.region.handle() == handle {
            // Intra-region teleport; the region deals with it, it's safe.
            return Ok(false);
        }

        // The current region's operator resolves the destination.
        let (lookup_url, send_key) = {
            let guard = self.grid_server.read().await;
            let url = if guard.0.is_empty() {
                format!("{}/", current.region.base_url())
            } else {
                guard.0.clone()
            };
            (url, guard.1.clone())
        };
        let region = self
            .grid
            .region_by_handle(&lookup_url, &send_key, handle)
            .await
            .map_err(SessionError::GridLookup)?;
        info!(name = %region.name, x = region.grid_x, y = region.grid_y, "resolved teleport destination");

        let session = self
            .create_session(region, random_caps_token(), position, look_at)
            .await;
        let key = self.transfer_key().await;
        session
            .go(&self.ctx, &key)
            .await
            .map_err(SessionError::Registration)?;

        // Seed capability of the destination, intercepted like the login one.
        let caps_path = format!(
            "{}/CAPS/{}0000/",
            session.region.base_url(),
            session.caps_seed
        );
        self.caps.register(CapabilityEntry {
            token: caps_path.clone(),
            region: session.region.external_endpoint(),
            kind: HandlerKind::Seed,
            forward_url: None,
        });
        let local_caps_url = format!("{}{}", self.transport.login_uri(), caps_path);

        // Both events go to the *outgoing* session's queue, strictly
        // ordered: the viewer opens the new circuit on the first and needs
        // the seed from the second.
        let proxied = self
            .transport
            .proxy_endpoint(session.region.external_endpoint());
        let agent_id = self.ctx.agent_id().await;
        let enable = llevents::enable_simulator(session.region.handle(), proxied);
        let finish = llevents::teleport_finish(
            session.region.handle(),
            13,
            proxied,
            &local_caps_url,
            agent_id,
        );
        if let Err(e) = current.queue.enqueue_event(enable).await {
            warn!(error = %e, "could not enqueue EnableSimulator");
        }
        if let Err(e) = current.queue.enqueue_event(finish).await {
            warn!(error = %e, "could not enqueue TeleportFinish");
        }

        // Pointer swap: the new session is main immediately; the outgoing
        // one serves trailing requests until the viewer acks the move.
        current.set_state(SessionState::HandoffPending).await;
        let displaced = {
            let mut old = self.old.write().await;
            let mut main = self.main.write().await;
            let displaced = old.replace(Arc::clone(&current));
            *main = Some(Arc::clone(&session));
            displaced
        };
        if let Some(displaced) = displaced {
            // A second teleport landed before the first resolved: last
            // request wins, the never-acked session is retired now.
            debug!(region = %displaced.region.name, "retiring displaced handoff session");
            let _ = self.retire(displaced).await;
        }

        info!(region = %session.region.name, "main session switched");
        Ok(true)
    }

    /// Outbound `CompleteAgentMovement`: pull state from the outgoing
    /// session (best effort) and push it to the new region.
    pub async fn complete_movement(&self) {
        let old = self.old_session().await;
        if let Some(old) = &old {
            old.retrieve(&self.ctx).await;
        }
        if let Some(main) = self.main_session().await {
            if let Some(old) = &old {
                let (position, look_at) = old.position().await;
                main.set_position(position, look_at).await;
            }
            main.update(&self.ctx).await;
        }
    }

    /// Inbound `AgentMovementComplete`: the viewer lives in the new region
    /// now. Push carried attachments, retire the old session.
    pub async fn movement_complete(&self) -> Option<oneshot::Receiver<()>> {
        if let Some(main) = self.main_session().await {
            let circuit = self.ctx.circuit().await;
            for (point, item_id) in &circuit.appearance.attachments {
                debug!(point, %item_id, "pushing attachment to new region");
                main.rez_attachment(circuit.agent_id, *item_id).await;
            }
        }

        let old = self.old.write().await.take()?;
        if let Err(e) = old.queue.enqueue_event(llevents::disable_simulator()).await {
            debug!(error = %e, "old queue already stopped");
        }
        old.set_state(SessionState::Superseded).await;
        Some(self.retire(old).await)
    }

    /// Close a superseded session's region-side presence without blocking
    /// the handler: fire-and-forget with a completion channel. Once the
    /// close call returns, the queue is stopped and the table entries
    /// released.
    async fn retire(&self, session: Arc<Session>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let ctx = Arc::clone(&self.ctx);
        let broker = Arc::clone(&self.broker);
        let caps = Arc::clone(&self.caps);
        tokio::spawn(async move {
            let agent_id = ctx.agent_id().await;
            if let Err(e) = session.close(agent_id).await {
                warn!(region = %session.region.name, error = %e, "close agent failed");
            } else {
                debug!(region = %session.region.name, "close agent completed");
            }
            session.queue.stop().await;
            broker.remove(&session.queue_id);
            caps.remove(&session.queue_id);
            session.set_state(SessionState::Closed).await;
            let _ = tx.send(());
        });
        rx
    }

    /// Update the grid service in use after entering a new operator's grid.
    pub async fn set_grid_server(&self, url: String, key: String) {
        *self.grid_server.write().await = (url, key);
    }

    async fn transfer_key(&self) -> String {
        match self.auth.get_new_key().await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "transfer key request failed, proceeding without one");
                String::new()
            },
        }
    }
}
