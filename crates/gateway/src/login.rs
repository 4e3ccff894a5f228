//! Login interception: hypergrid name routing on the way out, session
//! bring-up on the way back.

use std::sync::Arc;

use {
    anyhow::Context,
    serde_json::{Value, json},
    tracing::{info, warn},
    uuid::Uuid,
};

use {
    gridway_caps::{CapabilityEntry, HandlerKind},
    gridway_common::{CircuitData, RegionDescriptor, SessionContext},
    gridway_comms::InventoryService,
    gridway_protocol::region::handle_to_grid,
    gridway_relay::InventoryRelay,
    gridway_sessions::{ManagerTimeouts, SessionManager},
};

use crate::state::{Gateway, SessionRuntime};

/// Keys the gateway consumes from the login response and must not leak to
/// the viewer.
const PRIVATE_LOGIN_KEYS: &[&str] = &[
    "grid_service",
    "grid_service_send_key",
    "inventory_service",
    "asset_service",
    "asset_service_send_key",
    "region_handle",
    "http_port",
    "appearance",
    "auth_token",
    "real_sim_ip",
    "real_sim_port",
];

impl Gateway {
    /// Rewrite an outbound login request.
    ///
    /// A first name of the form `name.grid-host` routes the login to that
    /// grid: the host moves into the returned login URI and the name is
    /// split back into first/last. Returns the remote login URI when the
    /// request was rerouted.
    pub async fn handle_login_request(&self, body: &mut Value) -> Option<String> {
        let first = body.get("first")?.as_str()?.to_string();
        let last = body.get("last")?.as_str()?.to_string();
        if first.is_empty() || last.is_empty() {
            return None;
        }
        *self.state.login_name.write().await = Some((first.clone(), last.clone()));

        let (name_first, name_last) = first.split_once('.')?;
        let mut remote = format!("http://{last}");
        if !last.contains(':') {
            remote.push_str(&format!(":{}", self.state.config.login.default_remote_port));
        }

        body["first"] = json!(name_first);
        body["last"] = json!(name_last);
        *self.state.remote_login_uri.write().await = Some(remote.clone());
        info!(first = name_first, last = name_last, uri = %remote, "rerouting login");
        Some(remote)
    }

    /// Handle a successful login response: bring up the session context,
    /// the relay, and the first session, then scrub the response.
    pub async fn handle_login_response(&self, body: &mut Value) -> anyhow::Result<()> {
        let field_count = body.as_object().map(|o| o.len()).unwrap_or(0);
        if field_count <= 5 {
            warn!("login failed upstream, nothing to do");
            return Ok(());
        }

        // Restore the avatar's typed name.
        if let Some((first, last)) = self.state.login_name.read().await.clone() {
            body["first_name"] = json!(first);
            body["last_name"] = json!(last);
        }

        let remote_login_uri = self
            .state
            .remote_login_uri
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.state.transport.login_uri());

        let seed_url = str_field(body, "seed_capability");
        let seed_token = extract_seed_token(&seed_url);

        // Home-grid services, config overrides winning over the response.
        let services = &self.state.config.services;
        let user_url = services.user.clone().unwrap_or(remote_login_uri.clone());
        let inventory_url = services
            .inventory
            .clone()
            .unwrap_or_else(|| str_field(body, "inventory_service"));
        let asset_url = services
            .asset
            .clone()
            .unwrap_or_else(|| str_field(body, "asset_service"));
        let asset_send_key = str_field(body, "asset_service_send_key");
        let auth_token = uuid_field(body, "auth_token");

        let circuit = CircuitData::from_login_hash(body, seed_token.clone());
        let agent_id = circuit.agent_id;
        let ctx = Arc::new(SessionContext::new(
            circuit,
            user_url,
            inventory_url.clone(),
            asset_url,
            asset_send_key,
            auth_token,
        ));

        let region = region_from_login(body).context("login response names no region")?;

        // The upstream seed capability gets intercepted so its bundle can be
        // rewritten when the viewer queries it.
        if !seed_url.is_empty() {
            let token = seed_url
                .strip_prefix(&self.state.transport.login_uri())
                .unwrap_or(&seed_url)
                .to_string();
            self.state.caps.register(CapabilityEntry {
                token,
                region: region.external_endpoint(),
                kind: HandlerKind::Seed,
                forward_url: None,
            });
        }

        let grid_url = services
            .grid
            .clone()
            .unwrap_or_else(|| str_field(body, "grid_service"));
        let grid_key = str_field(body, "grid_service_send_key");
        let manager = SessionManager::new(
            Arc::clone(&ctx),
            Arc::clone(&self.state.transport),
            Arc::clone(&self.state.caps),
            Arc::clone(&self.state.broker),
            grid_url,
            grid_key,
            ManagerTimeouts {
                grid_lookup: self.state.lookup_timeout(),
                region_presence: self.state.presence_timeout(),
            },
        )
        .await;

        let service = Arc::new(InventoryService::new(
            &inventory_url,
            &auth_token.to_string(),
            self.state.presence_timeout(),
        ));
        let upload_caps = match service.connect_handlers(agent_id).await {
            Ok(caps) => caps,
            Err(e) => {
                warn!(error = %e, "could not connect to inventory service");
                Default::default()
            },
        };
        let relay = Arc::new(InventoryRelay::new(
            Arc::clone(&self.state.transport),
            Arc::clone(&ctx),
            service,
        ));

        // Patch the viewer-visible inventory skeleton to the home grid's.
        if let Some(inventory) = relay.login_inventory(agent_id).await {
            body["inventory-skeleton"] = json!(inventory.skeleton);
            body["inventory-root"] = json!([{ "folder_id": inventory.root_folder_id }]);
        }

        manager
            .login(region, seed_token)
            .await
            .context("session creation failed")?;

        if let Some(message) = body.get("message").and_then(Value::as_str) {
            body["message"] = json!(format!("Gridway: {message}"));
        }

        *self.state.session.write().await = Some(Arc::new(SessionRuntime {
            ctx,
            manager,
            relay,
            upload_caps,
        }));

        // Scrub gateway-internal keys before the response reaches the viewer.
        if let Some(obj) = body.as_object_mut() {
            for key in PRIVATE_LOGIN_KEYS {
                obj.remove(*key);
            }
        }
        Ok(())
    }
}

fn str_field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn uuid_field(body: &Value, key: &str) -> Uuid {
    body.get(key)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_default()
}

/// Strip a seed capability URL down to its token: the last path segment
/// minus the `0000` suffix regions append.
fn extract_seed_token(seed_url: &str) -> String {
    let segment = seed_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    segment.strip_suffix("0000").unwrap_or(segment).to_string()
}

/// Build the login region's descriptor from the response hash.
fn region_from_login(body: &Value) -> Option<RegionDescriptor> {
    let handle: u64 = body
        .get("region_handle")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())?;
    let (grid_x, grid_y) = handle_to_grid(handle);
    let sim_ip = body
        .get("real_sim_ip")
        .and_then(Value::as_str)
        .unwrap_or("127.0.0.1")
        .to_string();
    let sim_port = body
        .get("real_sim_port")
        .and_then(Value::as_u64)
        .unwrap_or(9000) as u16;
    let http_port = body.get("http_port").and_then(Value::as_u64).unwrap_or(9000) as u16;

    Some(RegionDescriptor {
        region_id: Uuid::nil(),
        name: format!("login-region-{grid_x}-{grid_y}"),
        grid_x,
        grid_y,
        external_host: sim_ip,
        sim_port,
        http_port,
    })
}
