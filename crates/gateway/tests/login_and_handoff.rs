//! End-to-end gateway flow against stubbed backends: login bring-up, seed
//! bundle rewrite, teleport handoff, and the long-poll channel.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use {mockito::Matcher, serde_json::json, uuid::Uuid};

use {
    gridway_common::ProxyTransport,
    gridway_config::GridwayConfig,
    gridway_gateway::{CapsOutcome, CapsStage, Gateway},
    gridway_protocol::{Direction, HandlerVerdict, Packet, region::handle_from_grid},
};

struct RecordingTransport {
    injected: Mutex<Vec<(Packet, Direction)>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            injected: Mutex::new(Vec::new()),
        })
    }
}

impl ProxyTransport for RecordingTransport {
    fn inject(&self, packet: Packet, direction: Direction) {
        self.injected.lock().unwrap().push((packet, direction));
    }

    fn proxy_endpoint(&self, _region: SocketAddr) -> SocketAddr {
        "127.0.0.1:23456".parse().unwrap()
    }

    fn login_uri(&self) -> String {
        "http://127.0.0.1:8080/".into()
    }
}

async fn stub_backend(server: &mut mockito::ServerGuard, auth_token: &Uuid) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "hg_new_auth_key"})))
        .with_status(200)
        .with_body(r#"{"key": "transfer-key"}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "expect_hg_user"})))
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("POST", "/agent/")
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("POST", format!("/{auth_token}/GetCapabilities/").as_str())
        .with_status(200)
        .with_body(r#"{"UpdateScriptAgent": "http://inv.example/caps/upd/"}"#)
        .create_async()
        .await;

    let root_folder = Uuid::new_v4();
    server
        .mock("POST", format!("/{auth_token}/GetInventory/").as_str())
        .with_status(200)
        .with_body(
            json!({
                "user_id": Uuid::new_v4(),
                "folders": [
                    { "id": root_folder, "parent_id": Uuid::nil(), "name": "My Inventory",
                      "folder_type": 8, "version": 1 },
                ],
                "items": [
                    { "id": Uuid::new_v4(), "asset_id": Uuid::new_v4(), "name": "shirt" },
                ],
            })
            .to_string(),
        )
        .create_async()
        .await;
}

fn login_body(server_url: &str, seed_url: &str, auth_token: &Uuid) -> serde_json::Value {
    let (_, port) = server_url.rsplit_once(':').unwrap();
    json!({
        "first": "Test",
        "last": "User",
        "agent_id": Uuid::new_v4(),
        "session_id": Uuid::new_v4(),
        "secure_session_id": Uuid::new_v4(),
        "circuit_code": 112233,
        "seed_capability": seed_url,
        "message": "Welcome home",
        "grid_service": server_url,
        "grid_service_send_key": "",
        "inventory_service": server_url,
        "asset_service": server_url,
        "asset_service_send_key": "sendkey",
        "auth_token": auth_token,
        "region_handle": handle_from_grid(1000, 1000).to_string(),
        "real_sim_ip": "127.0.0.1",
        "real_sim_port": 13000,
        "http_port": port.parse::<u16>().unwrap(),
    })
}

async fn gateway_with_login(
    server: &mut mockito::ServerGuard,
) -> (Arc<Gateway>, Arc<RecordingTransport>, String) {
    let auth_token = Uuid::new_v4();
    stub_backend(server, &auth_token).await;

    let transport = RecordingTransport::new();
    let gateway = Gateway::new(
        transport.clone() as Arc<dyn ProxyTransport>,
        GridwayConfig::default(),
        Box::new(|| false),
    );

    let seed_url = format!("{}/CAPS/{}0000/", server.url(), "a".repeat(32));
    let mut body = login_body(&server.url(), &seed_url, &auth_token);
    gateway.handle_login_response(&mut body).await.unwrap();

    // Internal keys never reach the viewer.
    assert!(body.get("inventory_service").is_none());
    assert!(body.get("auth_token").is_none());
    assert_eq!(
        body["message"].as_str().unwrap(),
        "Gridway: Welcome home"
    );
    assert!(body["inventory-root"][0]["folder_id"].is_string());

    (gateway, transport, seed_url)
}

#[tokio::test]
async fn login_request_reroutes_hypergrid_names() {
    let transport = RecordingTransport::new();
    let gateway = Gateway::new(
        transport as Arc<dyn ProxyTransport>,
        GridwayConfig::default(),
        Box::new(|| false),
    );

    let mut body = json!({ "first": "Ann.example", "last": "grid.example.org" });
    let remote = gateway.handle_login_request(&mut body).await;
    assert_eq!(remote.as_deref(), Some("http://grid.example.org:8002"));
    assert_eq!(body["first"], "Ann");
    assert_eq!(body["last"], "example");

    // Plain names stay local.
    let mut body = json!({ "first": "Ann", "last": "Example" });
    assert!(gateway.handle_login_request(&mut body).await.is_none());
}

#[tokio::test]
async fn login_brings_up_a_session_runtime() {
    let mut server = mockito::Server::new_async().await;
    let (gateway, _transport, _seed) = gateway_with_login(&mut server).await;

    let runtime = gateway.state.runtime().await.expect("no runtime after login");
    let main = runtime.manager.main_session().await.expect("no main session");
    assert_eq!(main.region.grid_x, 1000);
    // Login populated the routing cache from the inventory fetch.
    assert!(!runtime.relay.cache().is_empty());
}

#[tokio::test]
async fn seed_response_rewrite_installs_local_caps() {
    let mut server = mockito::Server::new_async().await;
    let (gateway, _transport, seed_url) = gateway_with_login(&mut server).await;

    let mut bundle = json!({
        "EventQueueGet": "http://sim.example/eq/",
        "UpdateScriptAgent": "http://sim.example/usa/",
        "GetTexture": "http://sim.example/tex/",
    });
    let outcome = gateway
        .handle_caps(&seed_url, CapsStage::Response, &mut bundle)
        .await;
    assert!(matches!(outcome, CapsOutcome::Forward));

    let eq_url = bundle["EventQueueGet"].as_str().unwrap();
    assert!(eq_url.starts_with("http://127.0.0.1:8080/"));
    assert_ne!(eq_url, "http://sim.example/eq/");
    // Redirected to the home inventory service.
    assert!(bundle["UpdateScriptAgent"].as_str().unwrap() != "http://sim.example/usa/");
    // Unrecognized caps untouched.
    assert_eq!(bundle["GetTexture"], "http://sim.example/tex/");
}

#[tokio::test]
async fn teleport_handoff_flows_through_the_dispatcher() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    let (host, port) = url
        .strip_prefix("http://")
        .and_then(|r| r.split_once(':'))
        .unwrap();
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "simulator_data_request"})))
        .with_status(200)
        .with_body(
            json!({
                "region_name": "Faraway",
                "region_locx": 2000,
                "region_locy": 2000,
                "sim_ip": host,
                "sim_port": 13002,
                "http_port": port.parse::<u16>().unwrap(),
            })
            .to_string(),
        )
        .create_async()
        .await;

    let (gateway, _transport, _seed) = gateway_with_login(&mut server).await;
    let runtime = gateway.state.runtime().await.unwrap();
    let outgoing = runtime.manager.main_session().await.unwrap();

    let verdict = gateway
        .handle_packet(
            Packet::TeleportLocationRequest {
                region_handle: handle_from_grid(2000, 2000),
                position: [12.0, 20.0, 30.0],
                look_at: [1.0, 0.0, 0.0],
            },
            Direction::Outgoing,
        )
        .await;
    assert!(matches!(verdict, HandlerVerdict::Consumed));

    // The outgoing queue now serves the ordered handoff events through the
    // long-poll capability.
    let mut poll_body = json!({ "ack": 0, "done": false });
    let outcome = gateway
        .handle_caps(&outgoing.queue_id, CapsStage::Request, &mut poll_body)
        .await;
    match outcome {
        CapsOutcome::Respond(resp) => {
            assert_eq!(resp["id"], 1);
            assert_eq!(resp["events"][0]["message"], "EnableSimulator");
            assert_eq!(resp["events"][1]["message"], "TeleportFinish");
        },
        other => panic!("expected a long-poll response, got {other:?}"),
    }

    // The viewer closes the channel; the queue entry is released.
    let mut done_body = json!({ "ack": 1, "done": true });
    let outcome = gateway
        .handle_caps(&outgoing.queue_id, CapsStage::Request, &mut done_body)
        .await;
    assert!(matches!(outcome, CapsOutcome::CloseChannel));
    assert!(gateway.state.caps.lookup(&outgoing.queue_id).is_none());
}

#[tokio::test]
async fn failed_teleport_alerts_the_viewer_and_keeps_main() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "simulator_data_request"})))
        .with_status(200)
        .with_body(r#"{"error": "unknown region"}"#)
        .create_async()
        .await;

    let (gateway, transport, _seed) = gateway_with_login(&mut server).await;
    let runtime = gateway.state.runtime().await.unwrap();
    let before = runtime.manager.main_session().await.unwrap();

    let verdict = gateway
        .handle_packet(
            Packet::TeleportLocationRequest {
                region_handle: handle_from_grid(9000, 9000),
                position: [0.0; 3],
                look_at: [0.0; 3],
            },
            Direction::Outgoing,
        )
        .await;
    assert!(matches!(verdict, HandlerVerdict::Consumed));

    let after = runtime.manager.main_session().await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(
        transport
            .injected
            .lock()
            .unwrap()
            .iter()
            .any(|(p, _)| matches!(p, Packet::AlertMessage { .. }))
    );
}

#[tokio::test]
async fn unknown_packets_and_caps_pass_through() {
    let transport = RecordingTransport::new();
    let gateway = Gateway::new(
        transport as Arc<dyn ProxyTransport>,
        GridwayConfig::default(),
        Box::new(|| false),
    );

    let verdict = gateway
        .handle_packet(
            Packet::AlertMessage {
                message: "hi".into(),
            },
            Direction::Incoming,
        )
        .await;
    assert!(matches!(verdict, HandlerVerdict::Forward));

    let mut body = json!({});
    let outcome = gateway
        .handle_caps("no-such-token", CapsStage::Request, &mut body)
        .await;
    assert!(matches!(outcome, CapsOutcome::Forward));
}
