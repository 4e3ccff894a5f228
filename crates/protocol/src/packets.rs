//! Decoded packet model.
//!
//! Only the packet kinds the gateway actually intercepts are modeled; every
//! other packet stays opaque to us and flows through the proxying engine
//! untouched.

use {
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Which way a packet is traveling through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Viewer → simulator.
    Outgoing,
    /// Simulator → viewer.
    Incoming,
}

/// What the proxying engine should do with the packet it just handed us.
#[derive(Debug, Clone)]
pub enum HandlerVerdict {
    /// The gateway handled it; do not forward.
    Consumed,
    /// Forward the original packet unmodified.
    Forward,
    /// Forward this modified payload instead of the original.
    Replace(Packet),
}

/// A 3-component position/direction vector.
pub type Vector3 = [f32; 3];

// ── Inventory blocks ─────────────────────────────────────────────────────────

/// One inventory item as it appears in descendents/reply packets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryItemBlock {
    pub item_id: Uuid,
    pub folder_id: Uuid,
    pub asset_id: Uuid,
    pub owner_id: Uuid,
    pub creator_id: Uuid,
    pub group_id: Uuid,
    pub group_owned: bool,
    pub base_mask: u32,
    pub owner_mask: u32,
    pub group_mask: u32,
    pub everyone_mask: u32,
    pub next_owner_mask: u32,
    pub asset_type: i8,
    pub inv_type: i8,
    pub flags: u32,
    pub sale_type: u8,
    pub sale_price: i32,
    pub name: String,
    pub description: String,
    pub creation_date: i32,
    pub callback_id: u32,
    pub crc: u32,
}

/// One inventory folder block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryFolderBlock {
    pub folder_id: Uuid,
    pub parent_id: Uuid,
    pub folder_type: i8,
    pub name: String,
}

/// One image request from a `RequestImage` packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequestBlock {
    pub image_id: Uuid,
    /// -1 means the viewer has not decided how much detail it wants yet.
    pub discard_level: i8,
    pub download_priority: f32,
    /// First packet number to send (resume point).
    pub packet: u32,
    pub image_type: u8,
}

/// One wearable slot in an `AgentWearablesUpdate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WearableBlock {
    pub wearable_type: u8,
    pub item_id: Uuid,
    pub asset_id: Uuid,
}

// ── Packets ──────────────────────────────────────────────────────────────────

/// Every packet kind the gateway registers a handler for, plus the ones it
/// synthesizes and injects toward the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    // Movement / teleport
    TeleportLocationRequest {
        region_handle: u64,
        position: Vector3,
        look_at: Vector3,
    },
    CompleteAgentMovement {
        agent_id: Uuid,
        session_id: Uuid,
        circuit_code: u32,
    },
    AgentMovementComplete {
        agent_id: Uuid,
        session_id: Uuid,
        position: Vector3,
        look_at: Vector3,
        region_handle: u64,
    },
    LogoutRequest {
        agent_id: Uuid,
        session_id: Uuid,
    },

    // Inventory, viewer → region
    FetchInventoryDescendents {
        agent_id: Uuid,
        folder_id: Uuid,
        owner_id: Uuid,
        fetch_folders: bool,
        fetch_items: bool,
    },
    FetchInventory {
        agent_id: Uuid,
        items: Vec<(Uuid, Uuid)>, // (owner_id, item_id)
    },
    CreateInventoryFolder {
        agent_id: Uuid,
        folder_id: Uuid,
        parent_id: Uuid,
        folder_type: i8,
        name: String,
    },
    UpdateInventoryFolder {
        agent_id: Uuid,
        folders: Vec<InventoryFolderBlock>,
    },
    MoveInventoryFolder {
        agent_id: Uuid,
        folders: Vec<(Uuid, Uuid)>, // (folder_id, new_parent_id)
    },
    PurgeInventoryDescendents {
        agent_id: Uuid,
        folder_id: Uuid,
    },
    RemoveInventoryFolder {
        agent_id: Uuid,
        folder_ids: Vec<Uuid>,
    },
    CreateInventoryItem {
        agent_id: Uuid,
        callback_id: u32,
        folder_id: Uuid,
        transaction_id: Uuid,
        next_owner_mask: u32,
        inv_type: i8,
        asset_type: i8,
        name: String,
        description: String,
    },
    UpdateInventoryItem {
        agent_id: Uuid,
        items: Vec<UpdateItemBlock>,
    },
    CopyInventoryItem {
        agent_id: Uuid,
        items: Vec<CopyItemBlock>,
    },
    MoveInventoryItem {
        agent_id: Uuid,
        items: Vec<MoveItemBlock>,
    },
    RemoveInventoryItem {
        agent_id: Uuid,
        item_ids: Vec<Uuid>,
    },

    // Inventory, region → viewer (synthesized by the gateway)
    InventoryDescendents {
        agent_id: Uuid,
        owner_id: Uuid,
        folder_id: Uuid,
        version: i32,
        descendents: i32,
        folders: Vec<InventoryFolderBlock>,
        items: Vec<InventoryItemBlock>,
    },
    FetchInventoryReply {
        agent_id: Uuid,
        items: Vec<InventoryItemBlock>,
    },
    UpdateCreateInventoryItem {
        agent_id: Uuid,
        sim_approved: bool,
        items: Vec<InventoryItemBlock>,
    },

    // Wearables
    AgentWearablesRequest {
        agent_id: Uuid,
        session_id: Uuid,
    },
    AgentWearablesUpdate {
        agent_id: Uuid,
        session_id: Uuid,
        serial: u32,
        wearables: Vec<WearableBlock>,
    },

    // Textures
    RequestImage {
        agent_id: Uuid,
        requests: Vec<ImageRequestBlock>,
    },
    ImageData {
        image_id: Uuid,
        codec: u8,
        size: u32,
        packets: u16,
        data: Vec<u8>,
    },
    ImagePacket {
        image_id: Uuid,
        packet: u16,
        data: Vec<u8>,
    },
    ImageNotInDatabase {
        image_id: Uuid,
    },

    // Asset transfer channel (download)
    TransferRequest {
        transfer_id: Uuid,
        channel_type: i32,
        source_type: i32,
        params: Vec<u8>,
    },
    TransferInfo {
        transfer_id: Uuid,
        channel_type: i32,
        target_type: i32,
        status: i32,
        size: i32,
        params: Vec<u8>,
    },
    TransferPacket {
        transfer_id: Uuid,
        channel_type: i32,
        packet: i32,
        status: i32,
        data: Vec<u8>,
    },

    // Asset upload (xfer)
    AssetUploadRequest {
        transaction_id: Uuid,
        asset_type: i8,
        store_local: bool,
        temp_file: bool,
        data: Vec<u8>,
    },
    AssetUploadComplete {
        asset_id: Uuid,
        asset_type: i8,
        success: bool,
    },
    RequestXfer {
        xfer_id: u64,
        vfile_id: Uuid,
        vfile_type: i16,
        file_path: u8,
        filename: String,
    },
    SendXferPacket {
        xfer_id: u64,
        packet: u32,
        data: Vec<u8>,
    },
    ConfirmXferPacket {
        xfer_id: u64,
        packet: u32,
    },

    // Misc
    AlertMessage {
        message: String,
    },
}

/// Item block of an `UpdateInventoryItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItemBlock {
    pub item_id: Uuid,
    pub folder_id: Uuid,
    pub transaction_id: Uuid,
    pub callback_id: u32,
    pub group_id: Uuid,
    pub group_owned: bool,
    pub group_mask: u32,
    pub everyone_mask: u32,
    pub next_owner_mask: u32,
    pub asset_type: i8,
    pub inv_type: i8,
    pub flags: u32,
    pub sale_type: u8,
    pub sale_price: i32,
    pub name: String,
    pub description: String,
    pub creation_date: i32,
}

/// Item block of a `CopyInventoryItem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyItemBlock {
    pub callback_id: u32,
    pub old_agent_id: Uuid,
    pub old_item_id: Uuid,
    pub new_folder_id: Uuid,
    pub new_name: String,
}

/// Item block of a `MoveInventoryItem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveItemBlock {
    pub item_id: Uuid,
    pub folder_id: Uuid,
    pub new_name: String,
}

/// Discriminant used as a dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    TeleportLocationRequest,
    CompleteAgentMovement,
    AgentMovementComplete,
    LogoutRequest,
    FetchInventoryDescendents,
    FetchInventory,
    CreateInventoryFolder,
    UpdateInventoryFolder,
    MoveInventoryFolder,
    PurgeInventoryDescendents,
    RemoveInventoryFolder,
    CreateInventoryItem,
    UpdateInventoryItem,
    CopyInventoryItem,
    MoveInventoryItem,
    RemoveInventoryItem,
    InventoryDescendents,
    FetchInventoryReply,
    UpdateCreateInventoryItem,
    AgentWearablesRequest,
    AgentWearablesUpdate,
    RequestImage,
    ImageData,
    ImagePacket,
    ImageNotInDatabase,
    TransferRequest,
    TransferInfo,
    TransferPacket,
    AssetUploadRequest,
    AssetUploadComplete,
    RequestXfer,
    SendXferPacket,
    ConfirmXferPacket,
    AlertMessage,
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::TeleportLocationRequest { .. } => PacketKind::TeleportLocationRequest,
            Packet::CompleteAgentMovement { .. } => PacketKind::CompleteAgentMovement,
            Packet::AgentMovementComplete { .. } => PacketKind::AgentMovementComplete,
            Packet::LogoutRequest { .. } => PacketKind::LogoutRequest,
            Packet::FetchInventoryDescendents { .. } => PacketKind::FetchInventoryDescendents,
            Packet::FetchInventory { .. } => PacketKind::FetchInventory,
            Packet::CreateInventoryFolder { .. } => PacketKind::CreateInventoryFolder,
            Packet::UpdateInventoryFolder { .. } => PacketKind::UpdateInventoryFolder,
            Packet::MoveInventoryFolder { .. } => PacketKind::MoveInventoryFolder,
            Packet::PurgeInventoryDescendents { .. } => PacketKind::PurgeInventoryDescendents,
            Packet::RemoveInventoryFolder { .. } => PacketKind::RemoveInventoryFolder,
            Packet::CreateInventoryItem { .. } => PacketKind::CreateInventoryItem,
            Packet::UpdateInventoryItem { .. } => PacketKind::UpdateInventoryItem,
            Packet::CopyInventoryItem { .. } => PacketKind::CopyInventoryItem,
            Packet::MoveInventoryItem { .. } => PacketKind::MoveInventoryItem,
            Packet::RemoveInventoryItem { .. } => PacketKind::RemoveInventoryItem,
            Packet::InventoryDescendents { .. } => PacketKind::InventoryDescendents,
            Packet::FetchInventoryReply { .. } => PacketKind::FetchInventoryReply,
            Packet::UpdateCreateInventoryItem { .. } => PacketKind::UpdateCreateInventoryItem,
            Packet::AgentWearablesRequest { .. } => PacketKind::AgentWearablesRequest,
            Packet::AgentWearablesUpdate { .. } => PacketKind::AgentWearablesUpdate,
            Packet::RequestImage { .. } => PacketKind::RequestImage,
            Packet::ImageData { .. } => PacketKind::ImageData,
            Packet::ImagePacket { .. } => PacketKind::ImagePacket,
            Packet::ImageNotInDatabase { .. } => PacketKind::ImageNotInDatabase,
            Packet::TransferRequest { .. } => PacketKind::TransferRequest,
            Packet::TransferInfo { .. } => PacketKind::TransferInfo,
            Packet::TransferPacket { .. } => PacketKind::TransferPacket,
            Packet::AssetUploadRequest { .. } => PacketKind::AssetUploadRequest,
            Packet::AssetUploadComplete { .. } => PacketKind::AssetUploadComplete,
            Packet::RequestXfer { .. } => PacketKind::RequestXfer,
            Packet::SendXferPacket { .. } => PacketKind::SendXferPacket,
            Packet::ConfirmXferPacket { .. } => PacketKind::ConfirmXferPacket,
            Packet::AlertMessage { .. } => PacketKind::AlertMessage,
        }
    }
}

// ── Inventory CRC ────────────────────────────────────────────────────────────

fn uuid_crc(id: &Uuid) -> u32 {
    let b = id.as_bytes();
    let mut crc: u32 = 0;
    for chunk in b.chunks_exact(4) {
        crc = crc.wrapping_add(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    crc
}

/// The additive checksum viewers use to validate inventory blocks.
pub fn inventory_crc(block: &InventoryItemBlock) -> u32 {
    let mut crc: u32 = 0;
    crc = crc.wrapping_add(uuid_crc(&block.asset_id));
    crc = crc.wrapping_add(uuid_crc(&block.folder_id));
    crc = crc.wrapping_add(uuid_crc(&block.item_id));
    crc = crc.wrapping_add(uuid_crc(&block.creator_id));
    crc = crc.wrapping_add(uuid_crc(&block.owner_id));
    crc = crc.wrapping_add(uuid_crc(&block.group_id));
    crc = crc.wrapping_add(block.owner_mask);
    crc = crc.wrapping_add(block.next_owner_mask);
    crc = crc.wrapping_add(block.everyone_mask);
    crc = crc.wrapping_add(block.group_mask);
    crc = crc.wrapping_add(block.flags);
    crc = crc.wrapping_add(block.inv_type as u32);
    crc = crc.wrapping_add(block.asset_type as u32);
    crc = crc.wrapping_add(block.creation_date as u32);
    crc = crc.wrapping_add(block.sale_price as u32);
    crc = crc.wrapping_add(block.sale_type as u32);
    crc
}

/// Truncate a string for a packet field. Anything past 254 bytes makes older
/// viewers choke on the trailing NUL.
pub fn clamp_packet_string(s: &str) -> String {
    if s.len() > 254 {
        let mut end = 254;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    } else {
        s.to_string()
    }
}
