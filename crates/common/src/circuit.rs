//! Avatar identity and appearance.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    uuid::Uuid,
};

use gridway_protocol::packets::Vector3;

/// Number of wearable slots a viewer expects in a wearables update.
pub const WEARABLE_SLOTS: usize = 13;

/// One wearable slot: the inventory item worn there and its asset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Wearable {
    pub item_id: Uuid,
    pub asset_id: Uuid,
}

/// Avatar appearance: wearables, attachments, and the update serial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appearance {
    pub serial: u32,
    pub wearables: Vec<Wearable>,
    /// Attachment point → worn inventory item.
    pub attachments: Vec<(u8, Uuid)>,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            serial: 0,
            wearables: vec![Wearable::default(); WEARABLE_SLOTS],
            attachments: Vec::new(),
        }
    }
}

impl Appearance {
    /// Parse the appearance hash a login service returns, if present.
    pub fn from_login_hash(hash: &Value) -> Self {
        let mut appearance = Self::default();
        if let Some(serial) = hash.get("serial").and_then(Value::as_u64) {
            appearance.serial = serial as u32;
        }
        if let Some(wearables) = hash.get("wearables").and_then(Value::as_array) {
            for (i, w) in wearables.iter().take(WEARABLE_SLOTS).enumerate() {
                appearance.wearables[i] = Wearable {
                    item_id: parse_uuid(w.get("item_id")),
                    asset_id: parse_uuid(w.get("asset_id")),
                };
            }
        }
        if let Some(attachments) = hash.get("attachments").and_then(Value::as_array) {
            for a in attachments {
                let point = a.get("point").and_then(Value::as_u64).unwrap_or(0) as u8;
                let item = parse_uuid(a.get("item_id"));
                if !item.is_nil() {
                    appearance.attachments.push((point, item));
                }
            }
        }
        appearance
    }
}

/// The invariant identity of the one avatar this gateway fronts. Sent to
/// every region the viewer connects to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitData {
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    pub circuit_code: u32,
    pub first_name: String,
    pub last_name: String,
    /// Seed capability token currently presented to the region.
    pub caps_path: String,
    pub start_position: Vector3,
    pub appearance: Appearance,
}

impl CircuitData {
    /// Build circuit data from a successful login response hash.
    ///
    /// The seed capability token is freshly generated by the caller; the one
    /// in the hash belongs to the upstream region.
    pub fn from_login_hash(hash: &Value, caps_path: String) -> Self {
        let appearance = hash
            .get("appearance")
            .map(Appearance::from_login_hash)
            .unwrap_or_default();

        Self {
            agent_id: parse_uuid(hash.get("agent_id")),
            session_id: parse_uuid(hash.get("session_id")),
            secure_session_id: parse_uuid(hash.get("secure_session_id")),
            circuit_code: hash
                .get("circuit_code")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            first_name: str_field(hash, "first_name"),
            last_name: str_field(hash, "last_name"),
            caps_path,
            start_position: [128.0, 128.0, 70.0],
            appearance,
        }
    }
}

fn parse_uuid(v: Option<&Value>) -> Uuid {
    v.and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_default()
}

fn str_field(hash: &Value, key: &str) -> String {
    hash.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
