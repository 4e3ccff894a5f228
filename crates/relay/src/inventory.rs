//! Inventory packet relay: route viewer inventory traffic to the home-grid
//! service and synthesize the replies the viewer expects from a region.

use std::sync::Arc;

use {
    serde_json::{Value, json},
    tracing::{debug, warn},
    uuid::Uuid,
};

use {
    gridway_common::{ProxyTransport, SessionContext},
    gridway_comms::{Asset, InventoryFolder, InventoryItem, InventoryService},
    gridway_protocol::{
        Direction, HandlerVerdict, Packet,
        constants::{LIBRARY_OWNER, MAX_ITEMS_PER_PACKET},
        packets::{
            ImageRequestBlock, InventoryFolderBlock, InventoryItemBlock, WearableBlock,
            clamp_packet_string, inventory_crc,
        },
    },
};

use crate::{
    cache::AssetCache,
    downloader::AssetDownloader,
    receiver::{AssetReceiver, UploadTracker, combine_ids},
    sender::AssetSender,
    texture::TextureSender,
};

/// All permission bits set.
const FULL_MASK: u32 = 0x7fff_ffff;

/// Inventory type of a landmark.
const INV_TYPE_LANDMARK: i8 = 3;

/// Transfer source: inventory item.
const SOURCE_INVENTORY: i32 = 3;

fn now_secs() -> i32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i32
}

fn uuid_at(params: &[u8], offset: usize) -> Option<Uuid> {
    let bytes: [u8; 16] = params.get(offset..offset + 16)?.try_into().ok()?;
    Some(Uuid::from_bytes(bytes))
}

/// Root-folder id plus the folder skeleton for a login response.
pub struct LoginInventory {
    pub root_folder_id: Uuid,
    pub skeleton: Vec<Value>,
}

/// Decides, per inventory/asset operation, whether the home grid serves it;
/// owns the transfer trackers for both directions.
pub struct InventoryRelay {
    transport: Arc<dyn ProxyTransport>,
    ctx: Arc<SessionContext>,
    service: Arc<InventoryService>,
    cache: AssetCache,
    downloader: AssetDownloader,
    uploads: UploadTracker,
}

impl InventoryRelay {
    pub fn new(
        transport: Arc<dyn ProxyTransport>,
        ctx: Arc<SessionContext>,
        service: Arc<InventoryService>,
    ) -> Self {
        Self {
            transport,
            ctx,
            service: Arc::clone(&service),
            cache: AssetCache::new(),
            downloader: AssetDownloader::new(service),
            uploads: UploadTracker::new(),
        }
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    // ── Login-time inventory ─────────────────────────────────────────────

    /// Fetch the whole inventory at login: populates the routing cache and
    /// returns the folder skeleton to patch into the login response.
    pub async fn login_inventory(&self, user_id: Uuid) -> Option<LoginInventory> {
        let collection = match self.service.get_inventory(user_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "could not retrieve inventory at login");
                return None;
            },
        };

        for item in &collection.items {
            self.cache.insert(item.id, item.asset_id);
        }

        let mut root_folder_id = Uuid::nil();
        let mut skeleton = Vec::with_capacity(collection.folders.len());
        for folder in &collection.folders {
            if folder.parent_id.is_nil() {
                root_folder_id = folder.id;
            }
            skeleton.push(json!({
                "name": folder.name,
                "parent_id": folder.parent_id,
                "version": folder.version,
                "type_default": folder.folder_type,
                "folder_id": folder.id,
            }));
        }

        debug!(folders = skeleton.len(), items = collection.items.len(), "inventory retrieved");
        Some(LoginInventory {
            root_folder_id,
            skeleton,
        })
    }

    // ── Folder fetches ───────────────────────────────────────────────────

    pub async fn fetch_descendants(
        &self,
        agent_id: Uuid,
        owner_id: Uuid,
        folder_id: Uuid,
        fetch_folders: bool,
        fetch_items: bool,
    ) -> HandlerVerdict {
        if owner_id == LIBRARY_OWNER {
            // The shared library lives on the region.
            return HandlerVerdict::Forward;
        }

        let (items, folders) = match self.service.fetch_descendants(folder_id, owner_id).await {
            Ok(c) => (c.items, c.folders),
            Err(e) => {
                warn!(%folder_id, error = %e, "descendants fetch failed");
                (Vec::new(), Vec::new())
            },
        };
        self.inject_descendant_pages(agent_id, folder_id, fetch_folders, fetch_items, items, folders);
        HandlerVerdict::Consumed
    }

    fn inject_descendant_pages(
        &self,
        agent_id: Uuid,
        folder_id: Uuid,
        fetch_folders: bool,
        fetch_items: bool,
        items: Vec<InventoryItem>,
        folders: Vec<InventoryFolder>,
    ) {
        // The viewer wants the total count in every page, folders included.
        let descendents = (items.len() + folders.len()) as i32;
        let mut pages_sent = 0usize;

        if fetch_items {
            for chunk in items.chunks(MAX_ITEMS_PER_PACKET) {
                self.transport.inject(
                    Packet::InventoryDescendents {
                        agent_id,
                        owner_id: agent_id,
                        folder_id,
                        version: 1,
                        descendents,
                        folders: Vec::new(),
                        items: chunk.iter().map(item_block).collect(),
                    },
                    Direction::Incoming,
                );
                pages_sent += 1;
            }
        }

        if fetch_folders {
            for chunk in folders.chunks(MAX_ITEMS_PER_PACKET) {
                self.transport.inject(
                    Packet::InventoryDescendents {
                        agent_id,
                        owner_id: agent_id,
                        folder_id,
                        version: 1,
                        descendents,
                        folders: chunk.iter().map(folder_block).collect(),
                        items: Vec::new(),
                    },
                    Direction::Incoming,
                );
                pages_sent += 1;
            }
        }

        if pages_sent == 0 {
            self.transport.inject(
                Packet::InventoryDescendents {
                    agent_id,
                    owner_id: agent_id,
                    folder_id,
                    version: 1,
                    descendents: 0,
                    folders: Vec::new(),
                    items: Vec::new(),
                },
                Direction::Incoming,
            );
        }
    }

    pub async fn fetch_items(&self, agent_id: Uuid, requests: Vec<(Uuid, Uuid)>) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }

        for (owner_id, item_id) in requests {
            match self.service.get_item(item_id, owner_id).await {
                Ok(item) if !item.is_unsuccessful() => {
                    self.cache.insert(item.id, item.asset_id);
                    self.transport.inject(
                        Packet::FetchInventoryReply {
                            agent_id,
                            items: vec![item_block(&item)],
                        },
                        Direction::Incoming,
                    );
                },
                Ok(_) => warn!(%item_id, "item fetch was unsuccessful"),
                Err(e) => warn!(%item_id, error = %e, "item fetch failed"),
            }
        }
        HandlerVerdict::Consumed
    }

    // ── Folder operations ────────────────────────────────────────────────

    pub async fn folder_operation(
        &self,
        op: &'static str,
        agent_id: Uuid,
        folders: Vec<InventoryFolder>,
    ) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }
        for folder in folders {
            if let Err(e) = self.service.folder_operation(op, &folder).await {
                warn!(op, folder = %folder.id, error = %e, "folder operation failed");
            }
        }
        HandlerVerdict::Consumed
    }

    // ── Item operations ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn create_item(
        &self,
        agent_id: Uuid,
        callback_id: u32,
        folder_id: Uuid,
        transaction_id: Uuid,
        next_owner_mask: u32,
        inv_type: i8,
        asset_type: i8,
        name: String,
        description: String,
    ) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }

        let asset = if transaction_id.is_nil() {
            if inv_type == INV_TYPE_LANDMARK {
                // Landmarks need the avatar's region position, which the
                // region owns. Dropped rather than mis-created.
                warn!("landmark creation is not relayed");
                return HandlerVerdict::Consumed;
            }
            // Notecards and scripts are created empty; the data comes later
            // through an update.
            let asset = Asset {
                id: Uuid::new_v4(),
                asset_type,
                name: name.clone(),
                description: description.clone(),
                data: vec![0],
                ..Default::default()
            };
            if let Err(e) = self.service.post_asset(&asset).await {
                warn!(asset = %asset.id, error = %e, "asset post for new item failed");
            }
            asset
        } else {
            // The asset body arrived through an upload keyed by this
            // transaction.
            let Some(receiver) = self.uploads.remove(transaction_id) else {
                warn!(%transaction_id, "create for unknown upload transaction");
                return HandlerVerdict::Consumed;
            };
            receiver.asset()
        };

        let user_id = self.ctx.agent_id().await;
        let item = InventoryItem {
            id: Uuid::new_v4(),
            asset_id: asset.id,
            folder_id,
            owner_id: user_id,
            creator_id: user_id,
            name,
            description,
            asset_type,
            inv_type,
            base_permissions: FULL_MASK,
            current_permissions: FULL_MASK,
            next_permissions: next_owner_mask,
            creation_date: now_secs(),
            ..Default::default()
        };

        match self.service.item_operation("NewItem", &item).await {
            Ok(created) if !created.is_unsuccessful() => {
                self.cache.insert(created.id, created.asset_id);
                self.inject_item_confirmation(agent_id, &created, callback_id);
            },
            Ok(_) => warn!(item = %item.id, "item create was unsuccessful"),
            Err(e) => warn!(item = %item.id, error = %e, "item create failed"),
        }
        HandlerVerdict::Consumed
    }

    pub async fn update_items(
        &self,
        agent_id: Uuid,
        items: Vec<gridway_protocol::packets::UpdateItemBlock>,
    ) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }

        let user_id = self.ctx.agent_id().await;
        for block in items {
            let mut item = InventoryItem {
                id: block.item_id,
                folder_id: block.folder_id,
                owner_id: user_id,
                group_id: block.group_id,
                group_owned: block.group_owned,
                name: block.name.clone(),
                description: block.description.clone(),
                asset_type: block.asset_type,
                inv_type: block.inv_type,
                current_permissions: FULL_MASK,
                group_permissions: block.group_mask,
                everyone_permissions: block.everyone_mask,
                next_permissions: block.next_owner_mask,
                flags: block.flags,
                sale_type: block.sale_type,
                sale_price: block.sale_price,
                creation_date: if block.creation_date == 0 {
                    now_secs()
                } else {
                    block.creation_date
                },
                ..Default::default()
            };

            let confirm = if block.transaction_id.is_nil() {
                false
            } else if let Some(receiver) = self.uploads.remove(block.transaction_id) {
                // Adopt the freshly uploaded asset.
                item.asset_id = receiver.asset().id;
                true
            } else {
                warn!(transaction = %block.transaction_id, "update for unknown upload transaction");
                false
            };

            match self.service.item_operation("UpdateItem", &item).await {
                Ok(updated) if !updated.is_unsuccessful() => {
                    self.cache.insert(updated.id, updated.asset_id);
                    if confirm {
                        self.inject_item_confirmation(agent_id, &updated, block.callback_id);
                    }
                },
                Ok(_) => warn!(item = %item.id, "item update was unsuccessful"),
                Err(e) => warn!(item = %item.id, error = %e, "item update failed"),
            }
        }
        HandlerVerdict::Consumed
    }

    pub async fn remove_items(&self, agent_id: Uuid, item_ids: Vec<Uuid>) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }
        let user_id = self.ctx.agent_id().await;
        for item_id in item_ids {
            let item = InventoryItem {
                id: item_id,
                owner_id: user_id,
                ..Default::default()
            };
            if let Err(e) = self.service.item_operation("DeleteItem", &item).await {
                warn!(%item_id, error = %e, "item delete failed");
            }
            self.cache.remove_item(item_id);
        }
        HandlerVerdict::Consumed
    }

    pub async fn move_items(
        &self,
        agent_id: Uuid,
        moves: Vec<gridway_protocol::packets::MoveItemBlock>,
    ) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }
        let user_id = self.ctx.agent_id().await;
        for mv in moves {
            let item = InventoryItem {
                id: mv.item_id,
                folder_id: mv.folder_id,
                name: mv.new_name,
                owner_id: user_id,
                ..Default::default()
            };
            match self.service.item_operation("MoveItem", &item).await {
                Ok(moved) if !moved.is_unsuccessful() => {
                    self.inject_item_confirmation(agent_id, &moved, 0);
                },
                Ok(_) => warn!(item = %item.id, "item move was unsuccessful"),
                Err(e) => warn!(item = %item.id, error = %e, "item move failed"),
            }
        }
        HandlerVerdict::Consumed
    }

    pub async fn copy_items(
        &self,
        agent_id: Uuid,
        copies: Vec<gridway_protocol::packets::CopyItemBlock>,
    ) -> HandlerVerdict {
        if agent_id == LIBRARY_OWNER {
            return HandlerVerdict::Forward;
        }
        for copy in copies {
            let item = InventoryItem {
                id: copy.old_item_id,
                owner_id: copy.old_agent_id,
                folder_id: copy.new_folder_id,
                name: copy.new_name,
                ..Default::default()
            };
            match self.service.item_operation("CopyItem", &item).await {
                Ok(copied) if !copied.is_unsuccessful() => {
                    self.cache.insert(copied.id, copied.asset_id);
                    self.inject_item_confirmation(agent_id, &copied, copy.callback_id);
                },
                Ok(_) => warn!(item = %item.id, "item copy was unsuccessful"),
                Err(e) => warn!(item = %item.id, error = %e, "item copy failed"),
            }
        }
        HandlerVerdict::Consumed
    }

    fn inject_item_confirmation(&self, agent_id: Uuid, item: &InventoryItem, callback_id: u32) {
        let mut block = item_block(item);
        block.callback_id = callback_id;
        self.transport.inject(
            Packet::UpdateCreateInventoryItem {
                agent_id,
                sim_approved: true,
                items: vec![block],
            },
            Direction::Incoming,
        );
    }

    // ── Wearables ────────────────────────────────────────────────────────

    pub async fn wearables_request(&self, agent_id: Uuid, session_id: Uuid) -> HandlerVerdict {
        let serial = self.ctx.next_appearance_serial().await;
        let circuit = self.ctx.circuit().await;
        let wearables = circuit
            .appearance
            .wearables
            .iter()
            .enumerate()
            .map(|(i, w)| WearableBlock {
                wearable_type: i as u8,
                item_id: w.item_id,
                asset_id: w.asset_id,
            })
            .collect();

        self.transport.inject(
            Packet::AgentWearablesUpdate {
                agent_id,
                session_id,
                serial,
                wearables,
            },
            Direction::Incoming,
        );
        HandlerVerdict::Consumed
    }

    // ── Textures ─────────────────────────────────────────────────────────

    pub async fn request_image(
        &self,
        agent_id: Uuid,
        requests: Vec<ImageRequestBlock>,
    ) -> HandlerVerdict {
        let user_id = self.ctx.agent_id().await;
        let mut region_requests = Vec::new();
        let mut handled = 0usize;
        let total = requests.len();

        for request in requests {
            match self.cache.item_for(request.image_id) {
                Some(item_id) => {
                    handled += 1;
                    let item = InventoryItem {
                        id: item_id,
                        asset_id: request.image_id,
                        owner_id: user_id,
                        ..Default::default()
                    };
                    let sender = TextureSender::new(
                        Arc::clone(&self.transport),
                        request.discard_level,
                        request.packet,
                    );
                    self.downloader.request_texture(item, sender);
                },
                None => region_requests.push(request),
            }
        }

        if handled == 0 {
            HandlerVerdict::Forward
        } else if handled == total {
            HandlerVerdict::Consumed
        } else {
            debug!(handled, total, "image request split between inventory and region");
            HandlerVerdict::Replace(Packet::RequestImage {
                agent_id,
                requests: region_requests,
            })
        }
    }

    // ── Asset transfer channel ───────────────────────────────────────────

    pub async fn transfer_request(
        &self,
        transfer_id: Uuid,
        source_type: i32,
        params: Vec<u8>,
    ) -> HandlerVerdict {
        if source_type != SOURCE_INVENTORY {
            return HandlerVerdict::Forward;
        }
        let (Some(task_id), Some(item_id), Some(asset_id)) = (
            uuid_at(&params, 48),
            uuid_at(&params, 64),
            uuid_at(&params, 80),
        ) else {
            return HandlerVerdict::Forward;
        };
        if !task_id.is_nil() {
            // Task inventory lives on the region.
            return HandlerVerdict::Forward;
        }

        let user_id = self.ctx.agent_id().await;
        let item_id = match self.cache.item_for(asset_id) {
            Some(known) => known,
            None => {
                // Unknown pairing: the item was created out-of-band (e.g. a
                // CAPS upload). Learn it now.
                self.cache.insert(item_id, asset_id);
                item_id
            },
        };

        let item = InventoryItem {
            id: item_id,
            asset_id,
            owner_id: user_id,
            ..Default::default()
        };
        let sender = AssetSender::new(
            Arc::clone(&self.transport),
            asset_id,
            transfer_id,
            SOURCE_INVENTORY,
            params,
        );
        self.downloader.request_asset(item, sender);
        HandlerVerdict::Consumed
    }

    // ── Uploads ──────────────────────────────────────────────────────────

    pub async fn asset_upload_request(
        &self,
        transaction_id: Uuid,
        asset_type: i8,
        store_local: bool,
        temp_file: bool,
        data: Vec<u8>,
    ) -> HandlerVerdict {
        if store_local {
            // Local/temporary uploads belong to the simulator.
            debug!(%transaction_id, "forwarding local asset upload to region");
            return HandlerVerdict::Forward;
        }

        let secure_session = self.ctx.circuit().await.secure_session_id;
        let asset_id = combine_ids(transaction_id, secure_session);
        let receiver = Arc::new(AssetReceiver::new(
            Arc::clone(&self.transport),
            asset_id,
            transaction_id,
            asset_type,
            temp_file,
        ));
        self.uploads.insert(Arc::clone(&receiver));

        if receiver.begin(data, &self.service).await {
            // Completed in one message. Keep the receiver around so an
            // inventory create can still adopt the asset.
            debug!(%transaction_id, "upload completed inline");
        }
        HandlerVerdict::Consumed
    }

    pub async fn xfer_chunk(&self, xfer_id: u64, packet: u32, data: Vec<u8>) -> HandlerVerdict {
        let Some(receiver) = self.uploads.by_xfer(xfer_id) else {
            return HandlerVerdict::Forward;
        };
        receiver.receive_chunk(packet, &data, &self.service).await;
        HandlerVerdict::Consumed
    }
}

// ── Block conversion ─────────────────────────────────────────────────────────

fn item_block(item: &InventoryItem) -> InventoryItemBlock {
    let mut block = InventoryItemBlock {
        item_id: item.id,
        folder_id: item.folder_id,
        asset_id: item.asset_id,
        owner_id: item.owner_id,
        creator_id: item.creator_id,
        group_id: item.group_id,
        group_owned: item.group_owned,
        base_mask: item.base_permissions,
        owner_mask: item.current_permissions,
        group_mask: item.group_permissions,
        everyone_mask: item.everyone_permissions,
        next_owner_mask: item.next_permissions,
        asset_type: item.asset_type,
        inv_type: item.inv_type,
        flags: item.flags,
        sale_type: item.sale_type,
        sale_price: item.sale_price,
        name: clamp_packet_string(&item.name),
        description: clamp_packet_string(&item.description),
        creation_date: item.creation_date,
        callback_id: 0,
        crc: 0,
    };
    block.crc = inventory_crc(&block);
    block
}

fn folder_block(folder: &InventoryFolder) -> InventoryFolderBlock {
    InventoryFolderBlock {
        folder_id: folder.id,
        parent_id: folder.parent_id,
        folder_type: folder.folder_type,
        name: clamp_packet_string(&folder.name),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_util::RecordingTransport;
    use gridway_common::CircuitData;

    fn context() -> Arc<SessionContext> {
        Arc::new(SessionContext::new(
            CircuitData {
                agent_id: Uuid::new_v4(),
                secure_session_id: Uuid::new_v4(),
                ..Default::default()
            },
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            Uuid::nil(),
        ))
    }

    fn relay(server: &mockito::ServerGuard) -> (InventoryRelay, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new();
        let service = Arc::new(InventoryService::new(
            &server.url(),
            "tok",
            Duration::from_secs(5),
        ));
        (
            InventoryRelay::new(transport.clone(), context(), service),
            transport,
        )
    }

    #[tokio::test]
    async fn library_descendants_forward_to_region() {
        let server = mockito::Server::new_async().await;
        let (relay, transport) = relay(&server);
        let verdict = relay
            .fetch_descendants(Uuid::new_v4(), LIBRARY_OWNER, Uuid::new_v4(), true, true)
            .await;
        assert!(matches!(verdict, HandlerVerdict::Forward));
        assert!(transport.injected().is_empty());
    }

    #[tokio::test]
    async fn descendants_page_in_sixes() {
        let mut server = mockito::Server::new_async().await;
        let items: Vec<InventoryItem> = (0..8)
            .map(|i| InventoryItem {
                id: Uuid::new_v4(),
                asset_id: Uuid::new_v4(),
                name: format!("item{i}"),
                ..Default::default()
            })
            .collect();
        server
            .mock("POST", "/tok/FetchDescendants/")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "user_id": Uuid::new_v4(),
                    "folders": [],
                    "items": items,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (relay, transport) = relay(&server);
        let verdict = relay
            .fetch_descendants(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), false, true)
            .await;
        assert!(matches!(verdict, HandlerVerdict::Consumed));

        let injected = transport.injected();
        assert_eq!(injected.len(), 2);
        match (&injected[0].0, &injected[1].0) {
            (
                Packet::InventoryDescendents { items: first, descendents, .. },
                Packet::InventoryDescendents { items: second, .. },
            ) => {
                assert_eq!(first.len(), 6);
                assert_eq!(second.len(), 2);
                assert_eq!(*descendents, 8);
                assert!(first[0].crc != 0);
            },
            other => panic!("unexpected packets {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_descendants_fetch_sends_empty_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tok/FetchDescendants/")
            .with_status(500)
            .create_async()
            .await;

        let (relay, transport) = relay(&server);
        relay
            .fetch_descendants(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), true, true)
            .await;
        let injected = transport.injected();
        assert_eq!(injected.len(), 1);
        assert!(matches!(
            &injected[0].0,
            Packet::InventoryDescendents { descendents: 0, .. }
        ));
    }

    #[tokio::test]
    async fn fetched_item_lands_in_cache_and_reply() {
        let mut server = mockito::Server::new_async().await;
        let item_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        server
            .mock("POST", "/tok/GetItem/")
            .with_status(200)
            .with_body(serde_json::json!({ "id": item_id, "asset_id": asset_id }).to_string())
            .create_async()
            .await;

        let (relay, transport) = relay(&server);
        relay
            .fetch_items(Uuid::new_v4(), vec![(Uuid::new_v4(), item_id)])
            .await;

        assert!(relay.cache().is_managed(asset_id));
        assert!(matches!(
            &transport.injected()[0].0,
            Packet::FetchInventoryReply { items, .. } if items[0].item_id == item_id
        ));
    }

    #[tokio::test]
    async fn remove_deletes_from_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tok/DeleteItem/")
            .with_status(200)
            .with_body(serde_json::json!(InventoryItem::default()).to_string())
            .create_async()
            .await;

        let (relay, _transport) = relay(&server);
        let (item_id, asset_id) = (Uuid::new_v4(), Uuid::new_v4());
        relay.cache().insert(item_id, asset_id);

        relay.remove_items(Uuid::new_v4(), vec![item_id]).await;
        assert!(!relay.cache().is_managed(asset_id));
    }

    #[tokio::test]
    async fn managed_image_requests_are_consumed_mixed_are_rewritten() {
        let server = mockito::Server::new_async().await;
        let (relay, _transport) = relay(&server);
        let managed_asset = Uuid::new_v4();
        relay.cache().insert(Uuid::new_v4(), managed_asset);

        let managed = ImageRequestBlock {
            image_id: managed_asset,
            discard_level: -1,
            download_priority: 0.0,
            packet: 0,
            image_type: 0,
        };
        let unmanaged = ImageRequestBlock {
            image_id: Uuid::new_v4(),
            ..managed.clone()
        };

        let verdict = relay
            .request_image(Uuid::new_v4(), vec![managed.clone()])
            .await;
        assert!(matches!(verdict, HandlerVerdict::Consumed));

        let verdict = relay
            .request_image(Uuid::new_v4(), vec![unmanaged.clone()])
            .await;
        assert!(matches!(verdict, HandlerVerdict::Forward));

        let verdict = relay
            .request_image(Uuid::new_v4(), vec![managed, unmanaged.clone()])
            .await;
        match verdict {
            HandlerVerdict::Replace(Packet::RequestImage { requests, .. }) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].image_id, unmanaged.image_id);
            },
            other => panic!("expected rewritten packet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transfer_request_learns_unknown_pairings() {
        let server = mockito::Server::new_async().await;
        let (relay, _transport) = relay(&server);

        let (item_id, asset_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut params = vec![0u8; 96];
        params[48..64].copy_from_slice(Uuid::nil().as_bytes());
        params[64..80].copy_from_slice(item_id.as_bytes());
        params[80..96].copy_from_slice(asset_id.as_bytes());

        let verdict = relay
            .transfer_request(Uuid::new_v4(), SOURCE_INVENTORY, params)
            .await;
        assert!(matches!(verdict, HandlerVerdict::Consumed));
        assert_eq!(relay.cache().item_for(asset_id), Some(item_id));
    }

    #[tokio::test]
    async fn task_inventory_transfers_forward() {
        let server = mockito::Server::new_async().await;
        let (relay, _transport) = relay(&server);

        let mut params = vec![0u8; 96];
        params[48..64].copy_from_slice(Uuid::new_v4().as_bytes()); // task id set
        let verdict = relay
            .transfer_request(Uuid::new_v4(), SOURCE_INVENTORY, params)
            .await;
        assert!(matches!(verdict, HandlerVerdict::Forward));
    }

    #[tokio::test]
    async fn wearables_request_synthesizes_update() {
        let server = mockito::Server::new_async().await;
        let (relay, transport) = relay(&server);
        let verdict = relay
            .wearables_request(Uuid::new_v4(), Uuid::new_v4())
            .await;
        assert!(matches!(verdict, HandlerVerdict::Consumed));
        match &transport.injected()[0].0 {
            Packet::AgentWearablesUpdate { serial, wearables, .. } => {
                assert_eq!(*serial, 1);
                assert_eq!(wearables.len(), 13);
            },
            other => panic!("expected AgentWearablesUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_local_uploads_forward() {
        let server = mockito::Server::new_async().await;
        let (relay, _transport) = relay(&server);
        let verdict = relay
            .asset_upload_request(Uuid::new_v4(), 0, true, false, vec![1])
            .await;
        assert!(matches!(verdict, HandlerVerdict::Forward));
    }

    #[tokio::test]
    async fn upload_then_create_adopts_the_asset() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tok/PostAsset/")
            .with_status(200)
            .create_async()
            .await;
        let created_id = Uuid::new_v4();
        let transaction_id = Uuid::new_v4();
        server
            .mock("POST", "/tok/NewItem/")
            .with_status(200)
            .with_body(
                serde_json::json!({ "id": created_id, "asset_id": Uuid::new_v4() }).to_string(),
            )
            .create_async()
            .await;

        let (relay, transport) = relay(&server);
        relay
            .asset_upload_request(transaction_id, 0, false, false, vec![1, 2, 3])
            .await;

        let verdict = relay
            .create_item(
                Uuid::new_v4(),
                77,
                Uuid::new_v4(),
                transaction_id,
                0,
                0,
                0,
                "uploaded".into(),
                String::new(),
            )
            .await;
        assert!(matches!(verdict, HandlerVerdict::Consumed));
        // Receiver is consumed by the create.
        assert!(relay.uploads.is_empty());

        let confirmation = transport
            .injected()
            .into_iter()
            .find_map(|(p, _)| match p {
                Packet::UpdateCreateInventoryItem { items, .. } => Some(items),
                _ => None,
            })
            .expect("no item confirmation injected");
        assert_eq!(confirmation[0].callback_id, 77);
        assert_eq!(confirmation[0].item_id, created_id);
    }
}
