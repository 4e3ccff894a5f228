//! Packet dispatch tables.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use tracing::warn;

use {
    gridway_comms::InventoryFolder,
    gridway_protocol::{Direction, HandlerVerdict, Packet, PacketKind},
};

use crate::state::GatewayState;

/// A boxed async packet handler.
pub type HandlerFn = Box<
    dyn Fn(Arc<GatewayState>, Packet) -> Pin<Box<dyn Future<Output = HandlerVerdict> + Send>>
        + Send
        + Sync,
>;

/// Maps (packet kind, direction) to its handler. Packets without an entry
/// flow through the proxy untouched.
pub struct Dispatcher {
    handlers: HashMap<(PacketKind, Direction), HandlerFn>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! handler {
    ($body:expr) => {
        Box::new(move |state, packet| Box::pin($body(state, packet)))
    };
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };
        dispatcher.register_defaults();
        dispatcher
    }

    pub fn register(&mut self, kind: PacketKind, direction: Direction, handler: HandlerFn) {
        self.handlers.insert((kind, direction), handler);
    }

    pub async fn dispatch(
        &self,
        state: Arc<GatewayState>,
        packet: Packet,
        direction: Direction,
    ) -> HandlerVerdict {
        match self.handlers.get(&(packet.kind(), direction)) {
            Some(handler) => handler(state, packet).await,
            None => HandlerVerdict::Forward,
        }
    }

    fn register_defaults(&mut self) {
        use {Direction::*, PacketKind as K};

        // Movement and teleport.
        self.register(K::TeleportLocationRequest, Outgoing, handler!(teleport));
        self.register(K::CompleteAgentMovement, Outgoing, handler!(complete_movement));
        self.register(K::AgentMovementComplete, Incoming, handler!(movement_complete));
        self.register(K::LogoutRequest, Outgoing, handler!(logout));

        // Inventory.
        self.register(K::FetchInventoryDescendents, Outgoing, handler!(fetch_descendants));
        self.register(K::FetchInventory, Outgoing, handler!(fetch_inventory));
        self.register(K::CreateInventoryFolder, Outgoing, handler!(create_folder));
        self.register(K::UpdateInventoryFolder, Outgoing, handler!(update_folders));
        self.register(K::MoveInventoryFolder, Outgoing, handler!(move_folders));
        self.register(K::PurgeInventoryDescendents, Outgoing, handler!(purge_folder));
        self.register(K::RemoveInventoryFolder, Outgoing, handler!(remove_folders));
        self.register(K::CreateInventoryItem, Outgoing, handler!(create_item));
        self.register(K::UpdateInventoryItem, Outgoing, handler!(update_items));
        self.register(K::CopyInventoryItem, Outgoing, handler!(copy_items));
        self.register(K::MoveInventoryItem, Outgoing, handler!(move_items));
        self.register(K::RemoveInventoryItem, Outgoing, handler!(remove_items));

        // Wearables and assets.
        self.register(K::AgentWearablesRequest, Outgoing, handler!(wearables));
        self.register(K::RequestImage, Outgoing, handler!(request_image));
        self.register(K::TransferRequest, Outgoing, handler!(transfer_request));
        self.register(K::AssetUploadRequest, Outgoing, handler!(asset_upload));
        self.register(K::SendXferPacket, Outgoing, handler!(send_xfer));
    }
}

// ── Movement handlers ────────────────────────────────────────────────────────

async fn teleport(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::TeleportLocationRequest {
        region_handle,
        position,
        look_at,
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let Some(runtime) = state.runtime().await else {
        return HandlerVerdict::Forward;
    };

    match runtime.manager.teleport(region_handle, position, look_at).await {
        Ok(true) => HandlerVerdict::Consumed,
        Ok(false) => HandlerVerdict::Forward,
        Err(e) => {
            warn!(error = %e, "teleport handoff failed");
            state.transport.inject(
                Packet::AlertMessage {
                    message: "Teleport failed: the destination region is unreachable.".into(),
                },
                Direction::Incoming,
            );
            HandlerVerdict::Consumed
        },
    }
}

async fn complete_movement(state: Arc<GatewayState>, _packet: Packet) -> HandlerVerdict {
    if let Some(runtime) = state.runtime().await {
        runtime.manager.complete_movement().await;
    }
    HandlerVerdict::Forward
}

async fn movement_complete(state: Arc<GatewayState>, _packet: Packet) -> HandlerVerdict {
    if let Some(runtime) = state.runtime().await {
        runtime.manager.movement_complete().await;
    }
    HandlerVerdict::Forward
}

async fn logout(state: Arc<GatewayState>, _packet: Packet) -> HandlerVerdict {
    state.start_exit_watchdog();
    HandlerVerdict::Forward
}

// ── Inventory handlers ───────────────────────────────────────────────────────

/// Fall through to the region when no session runtime exists yet.
macro_rules! runtime_or_forward {
    ($state:expr) => {
        match $state.runtime().await {
            Some(runtime) => runtime,
            None => return HandlerVerdict::Forward,
        }
    };
}

async fn fetch_descendants(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::FetchInventoryDescendents {
        agent_id,
        folder_id,
        owner_id,
        fetch_folders,
        fetch_items,
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime
        .relay
        .fetch_descendants(agent_id, owner_id, folder_id, fetch_folders, fetch_items)
        .await
}

async fn fetch_inventory(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::FetchInventory { agent_id, items } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.fetch_items(agent_id, items).await
}

async fn create_folder(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::CreateInventoryFolder {
        agent_id,
        folder_id,
        parent_id,
        folder_type,
        name,
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    let folder = InventoryFolder {
        id: folder_id,
        parent_id,
        owner_id: agent_id,
        name,
        folder_type,
        version: 1,
    };
    runtime
        .relay
        .folder_operation("NewFolder", agent_id, vec![folder])
        .await
}

async fn update_folders(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::UpdateInventoryFolder { agent_id, folders } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    let folders = folders
        .into_iter()
        .map(|f| InventoryFolder {
            id: f.folder_id,
            parent_id: f.parent_id,
            owner_id: agent_id,
            name: f.name,
            folder_type: f.folder_type,
            version: 1,
        })
        .collect();
    runtime
        .relay
        .folder_operation("UpdateFolder", agent_id, folders)
        .await
}

async fn move_folders(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::MoveInventoryFolder { agent_id, folders } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    let folders = folders
        .into_iter()
        .map(|(folder_id, parent_id)| InventoryFolder {
            id: folder_id,
            parent_id,
            owner_id: agent_id,
            ..Default::default()
        })
        .collect();
    runtime
        .relay
        .folder_operation("MoveFolder", agent_id, folders)
        .await
}

async fn purge_folder(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::PurgeInventoryDescendents { agent_id, folder_id } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    let folder = InventoryFolder {
        id: folder_id,
        owner_id: agent_id,
        ..Default::default()
    };
    runtime
        .relay
        .folder_operation("PurgeFolder", agent_id, vec![folder])
        .await
}

async fn remove_folders(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::RemoveInventoryFolder { agent_id, folder_ids } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    let folders = folder_ids
        .into_iter()
        .map(|id| InventoryFolder {
            id,
            owner_id: agent_id,
            ..Default::default()
        })
        .collect();
    runtime
        .relay
        .folder_operation("RemoveFolder", agent_id, folders)
        .await
}

async fn create_item(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::CreateInventoryItem {
        agent_id,
        callback_id,
        folder_id,
        transaction_id,
        next_owner_mask,
        inv_type,
        asset_type,
        name,
        description,
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime
        .relay
        .create_item(
            agent_id,
            callback_id,
            folder_id,
            transaction_id,
            next_owner_mask,
            inv_type,
            asset_type,
            name,
            description,
        )
        .await
}

async fn update_items(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::UpdateInventoryItem { agent_id, items } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.update_items(agent_id, items).await
}

async fn copy_items(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::CopyInventoryItem { agent_id, items } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.copy_items(agent_id, items).await
}

async fn move_items(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::MoveInventoryItem { agent_id, items } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.move_items(agent_id, items).await
}

async fn remove_items(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::RemoveInventoryItem { agent_id, item_ids } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.remove_items(agent_id, item_ids).await
}

// ── Wearables / asset handlers ───────────────────────────────────────────────

async fn wearables(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::AgentWearablesRequest { agent_id, session_id } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.wearables_request(agent_id, session_id).await
}

async fn request_image(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::RequestImage { agent_id, requests } = packet else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.request_image(agent_id, requests).await
}

async fn transfer_request(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::TransferRequest {
        transfer_id,
        source_type,
        params,
        ..
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime
        .relay
        .transfer_request(transfer_id, source_type, params)
        .await
}

async fn asset_upload(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::AssetUploadRequest {
        transaction_id,
        asset_type,
        store_local,
        temp_file,
        data,
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime
        .relay
        .asset_upload_request(transaction_id, asset_type, store_local, temp_file, data)
        .await
}

async fn send_xfer(state: Arc<GatewayState>, packet: Packet) -> HandlerVerdict {
    let Packet::SendXferPacket {
        xfer_id,
        packet: seq,
        data,
    } = packet
    else {
        return HandlerVerdict::Forward;
    };
    let runtime = runtime_or_forward!(state);
    runtime.relay.xfer_chunk(xfer_id, seq, data).await
}
