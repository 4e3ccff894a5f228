//! Payload types exchanged with the inventory/asset service.

use {
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// One inventory item as the service stores it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub folder_id: Uuid,
    pub owner_id: Uuid,
    pub creator_id: Uuid,
    pub group_id: Uuid,
    pub group_owned: bool,
    pub name: String,
    pub description: String,
    pub asset_type: i8,
    pub inv_type: i8,
    pub base_permissions: u32,
    pub current_permissions: u32,
    pub group_permissions: u32,
    pub everyone_permissions: u32,
    pub next_permissions: u32,
    pub flags: u32,
    pub sale_type: u8,
    pub sale_price: i32,
    pub creation_date: i32,
}

impl InventoryItem {
    /// A zeroed id signals "operation unsuccessful" from the service.
    pub fn is_unsuccessful(&self) -> bool {
        self.id.is_nil()
    }
}

/// One inventory folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryFolder {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub folder_type: i8,
    pub version: i32,
}

/// A folder fetch result: items and subfolders together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryCollection {
    pub user_id: Uuid,
    pub folders: Vec<InventoryFolder>,
    pub items: Vec<InventoryItem>,
}

/// A raw asset blob with its metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Asset {
    pub id: Uuid,
    pub asset_type: i8,
    pub name: String,
    pub description: String,
    pub local: bool,
    pub temporary: bool,
    #[serde(with = "serde_bytes_b64")]
    pub data: Vec<u8>,
}

/// Asset payloads travel base64-encoded inside JSON bodies.
mod serde_bytes_b64 {
    use {
        base64::{Engine, engine::general_purpose::STANDARD},
        serde::{Deserialize, Deserializer, Serializer, de::Error},
    };

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_item_signals_failure() {
        assert!(InventoryItem::default().is_unsuccessful());
        let item = InventoryItem {
            id: Uuid::new_v4(),
            ..Default::default()
        };
        assert!(!item.is_unsuccessful());
    }

    #[test]
    fn asset_data_round_trips_through_json() {
        let asset = Asset {
            id: Uuid::new_v4(),
            asset_type: 0,
            data: vec![0, 1, 2, 250, 251, 252, 253],
            ..Default::default()
        };
        let json = serde_json::to_string(&asset).unwrap();
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, asset.data);
    }
}
