//! Event constructors.
//!
//! Body shapes follow what viewers expect on the event-queue channel; binary
//! fields (region handles, IP addresses) are byte arrays inside the
//! structured map.

use std::net::SocketAddr;

use {serde_json::json, uuid::Uuid};

use gridway_protocol::{QueuedEvent, packets::Vector3, region::handle_bytes};

fn ip_bytes(addr: &SocketAddr) -> Vec<u8> {
    match addr.ip() {
        std::net::IpAddr::V4(v4) => v4.octets().to_vec(),
        std::net::IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Tells the viewer to open a circuit to a neighbouring/destination
/// simulator. Must reach the viewer before the teleport-finish event of the
/// same handoff.
pub fn enable_simulator(handle: u64, endpoint: SocketAddr) -> QueuedEvent {
    QueuedEvent::new(
        "EnableSimulator",
        json!({
            "SimulatorInfo": [{
                "Handle": handle_bytes(handle).to_vec(),
                "IP": ip_bytes(&endpoint),
                "Port": endpoint.port(),
            }],
        }),
    )
}

pub fn disable_simulator() -> QueuedEvent {
    QueuedEvent::new("DisableSimulator", json!({}))
}

pub fn establish_agent_communication(
    agent_id: Uuid,
    sim_ip_and_port: &str,
    seed_cap: &str,
) -> QueuedEvent {
    QueuedEvent::new(
        "EstablishAgentCommunication",
        json!({
            "agent-id": agent_id,
            "sim-ip-and-port": sim_ip_and_port,
            "seed-capability": seed_cap,
        }),
    )
}

/// Completes a teleport: carries the destination's seed capability and
/// endpoint. The viewer switches its main circuit on receipt.
pub fn teleport_finish(
    region_handle: u64,
    sim_access: u8,
    endpoint: SocketAddr,
    caps_url: &str,
    agent_id: Uuid,
) -> QueuedEvent {
    QueuedEvent::new(
        "TeleportFinish",
        json!({
            "Info": [{
                "AgentID": agent_id,
                "LocationID": 4,
                "RegionHandle": handle_bytes(region_handle).to_vec(),
                "SeedCapability": caps_url,
                "SimAccess": sim_access,
                "SimIP": ip_bytes(&endpoint),
                "SimPort": endpoint.port(),
                // ViaLocation
                "TeleportFlags": (1u32 << 4),
            }],
        }),
    )
}

/// Seamless border crossing into an adjacent region.
pub fn crossed_region(
    region_handle: u64,
    position: Vector3,
    look_at: Vector3,
    endpoint: SocketAddr,
    caps_url: &str,
    agent_id: Uuid,
    session_id: Uuid,
) -> QueuedEvent {
    QueuedEvent::new(
        "CrossedRegion",
        json!({
            "Info": [{
                "LookAt": look_at,
                "Position": position,
            }],
            "AgentData": [{
                "AgentID": agent_id,
                "SessionID": session_id,
            }],
            "RegionData": [{
                "RegionHandle": handle_bytes(region_handle).to_vec(),
                "SeedCapability": caps_url,
                "SimIP": ip_bytes(&endpoint),
                "SimPort": endpoint.port(),
            }],
        }),
    )
}

pub fn script_running_reply(
    object_id: Uuid,
    item_id: Uuid,
    running: bool,
    mono: bool,
) -> QueuedEvent {
    QueuedEvent::new(
        "ScriptRunningReply",
        json!({
            "Script": [{
                "ObjectID": object_id,
                "ItemID": item_id,
                "Running": running,
                "Mono": mono,
            }],
        }),
    )
}

/// Group chat invitation relayed from another grid.
#[allow(clippy::too_many_arguments)]
pub fn chatterbox_invitation(
    chat_session_id: Uuid,
    session_name: &str,
    from_agent: Uuid,
    from_name: &str,
    to_agent: Uuid,
    message: &str,
    dialog: u8,
    timestamp: u32,
) -> QueuedEvent {
    QueuedEvent::new(
        "ChatterBoxInvitation",
        json!({
            "session_id": chat_session_id,
            "session_name": session_name,
            "from_id": from_agent,
            "from_name": from_name,
            "instantmessage": {
                "message_params": {
                    "type": dialog,
                    "position": [0.0, 0.0, 0.0],
                    "region_id": Uuid::nil(),
                    "to_id": to_agent,
                    "source": 0,
                    "message": message,
                    "id": chat_session_id,
                    "from_name": from_name,
                    "timestamp": timestamp,
                    "offline": 0,
                    "ttl": 0,
                    "from_id": from_agent,
                    "from_group": 0,
                },
                "agent_params": {
                    "agent_id": from_agent,
                    "check_estate": 1,
                    "god_level": 0,
                    "limited_to_estate": 1,
                },
            },
        }),
    )
}

/// Synthetic event forcing a round trip on an otherwise idle channel.
pub fn keep_alive() -> QueuedEvent {
    QueuedEvent::new("FAKEEVENT", json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridway_protocol::region::handle_from_grid;

    #[test]
    fn enable_simulator_carries_big_endian_handle() {
        let handle = handle_from_grid(1000, 1000);
        let ev = enable_simulator(handle, "10.0.0.9:13001".parse().unwrap());
        assert_eq!(ev.message, "EnableSimulator");
        let info = &ev.body["SimulatorInfo"][0];
        assert_eq!(info["Port"], 13001);
        let bytes: Vec<u8> = info["Handle"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap() as u8)
            .collect();
        assert_eq!(bytes, handle_bytes(handle).to_vec());
        assert_eq!(info["IP"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn teleport_finish_carries_seed_cap() {
        let ev = teleport_finish(
            handle_from_grid(5, 6),
            13,
            "127.0.0.1:9000".parse().unwrap(),
            "http://localhost:8080/CAPS/abc/",
            Uuid::new_v4(),
        );
        let info = &ev.body["Info"][0];
        assert_eq!(info["SeedCapability"], "http://localhost:8080/CAPS/abc/");
        assert_eq!(info["SimAccess"], 13);
        assert_eq!(info["TeleportFlags"], 16);
    }
}
