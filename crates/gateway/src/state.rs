//! Shared gateway runtime state.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use {
    tokio::sync::{Notify, RwLock},
    tracing::{debug, info},
};

use {
    gridway_caps::CapabilityRegistry,
    gridway_common::{ProxyTransport, SessionContext},
    gridway_config::GridwayConfig,
    gridway_events::QueueBroker,
    gridway_protocol::{Direction, HandlerVerdict, Packet},
    gridway_relay::InventoryRelay,
    gridway_sessions::SessionManager,
};

use crate::dispatcher::Dispatcher;

/// Probe telling the gateway whether the fronted viewer process is gone.
pub type ViewerProbe = Box<dyn Fn() -> bool + Send + Sync>;

/// Everything a login session brings to life.
pub struct SessionRuntime {
    pub ctx: Arc<SessionContext>,
    pub manager: Arc<SessionManager>,
    pub relay: Arc<InventoryRelay>,
    /// Named upload caps served by the home inventory service.
    pub upload_caps: HashMap<String, String>,
}

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    pub transport: Arc<dyn ProxyTransport>,
    pub config: GridwayConfig,
    pub caps: Arc<CapabilityRegistry>,
    pub broker: Arc<QueueBroker>,
    /// Populated by a successful login; None before that.
    pub session: RwLock<Option<Arc<SessionRuntime>>>,
    /// Original avatar name, restored into the login response after the
    /// hypergrid transform mangled it for routing.
    pub login_name: RwLock<Option<(String, String)>>,
    /// Login URI of the remote grid the avatar is logging into.
    pub remote_login_uri: RwLock<Option<String>>,
    viewer_exited: ViewerProbe,
    shutdown: Notify,
}

impl GatewayState {
    pub async fn runtime(&self) -> Option<Arc<SessionRuntime>> {
        self.session.read().await.clone()
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.region_presence_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.grid_lookup_secs)
    }

    /// Begin the logout watchdog: once the viewer process is gone, the
    /// region-side close is moot and the gateway should die.
    pub fn start_exit_watchdog(self: &Arc<Self>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                if (state.viewer_exited)() {
                    info!("viewer exited, shutting down");
                    state.shutdown.notify_waiters();
                    return;
                }
            }
        });
    }

    /// Completes when the gateway decided to terminate.
    pub async fn wait_shutdown(&self) {
        self.shutdown.notified().await;
    }
}

/// The gateway itself: owns the dispatch tables and the shared state. The
/// external proxying engine calls into [`Gateway::handle_packet`] and the
/// caps/login hooks.
pub struct Gateway {
    pub state: Arc<GatewayState>,
    dispatcher: Dispatcher,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn ProxyTransport>,
        config: GridwayConfig,
        viewer_exited: ViewerProbe,
    ) -> Arc<Self> {
        let state = Arc::new(GatewayState {
            transport,
            config,
            caps: Arc::new(CapabilityRegistry::new()),
            broker: Arc::new(QueueBroker::new()),
            session: RwLock::new(None),
            login_name: RwLock::new(None),
            remote_login_uri: RwLock::new(None),
            viewer_exited,
            shutdown: Notify::new(),
        });
        info!("gridway gateway v{} loaded", env!("CARGO_PKG_VERSION"));
        Arc::new(Self {
            state,
            dispatcher: Dispatcher::new(),
        })
    }

    /// Entry point for every decoded packet the engine intercepts.
    pub async fn handle_packet(&self, packet: Packet, direction: Direction) -> HandlerVerdict {
        debug!(kind = ?packet.kind(), ?direction, "dispatching packet");
        self.dispatcher
            .dispatch(Arc::clone(&self.state), packet, direction)
            .await
    }
}
