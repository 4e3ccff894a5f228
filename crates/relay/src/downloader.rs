//! Backend asset fetches with duplicate-request coalescing.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use {
    async_trait::async_trait,
    tracing::{debug, warn},
    uuid::Uuid,
};

use gridway_comms::{Asset, InventoryItem, InventoryService};

use crate::{sender::AssetSender, texture::TextureSender};

/// Where assets come from. Split out from [`InventoryService`] so tests can
/// count and delay fetches.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, item: &InventoryItem) -> gridway_comms::Result<Asset>;
}

#[async_trait]
impl AssetFetcher for InventoryService {
    async fn fetch(&self, item: &InventoryItem) -> gridway_comms::Result<Asset> {
        self.get_asset(item).await
    }
}

#[derive(Default)]
struct DownloadState {
    /// Asset ids with a backend fetch in flight (value: is_texture).
    pending: HashMap<Uuid, bool>,
    textures: HashMap<Uuid, TextureSender>,
    assets: HashMap<Uuid, AssetSender>,
}

/// Download half of the transfer tracker.
///
/// At most one backend fetch per asset id is in flight at a time: the
/// check-and-insert on the pending map happens in one critical section, so
/// two racing requests cannot both reach the backend.
pub struct AssetDownloader {
    fetcher: Arc<dyn AssetFetcher>,
    state: Arc<Mutex<DownloadState>>,
}

impl AssetDownloader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            state: Arc::new(Mutex::new(DownloadState::default())),
        }
    }

    /// Request a texture for the viewer. A request for an asset already in
    /// flight is absorbed into the existing fetch.
    pub fn request_texture(&self, item: InventoryItem, sender: TextureSender) {
        let asset_id = item.asset_id;
        {
            let mut state = self.state.lock().unwrap();
            if state.textures.contains_key(&asset_id) {
                debug!(%asset_id, "texture fetch already in flight, coalescing");
                return;
            }
            state.textures.insert(asset_id, sender);
            if state.pending.insert(asset_id, true).is_some() {
                return;
            }
        }
        self.spawn_fetch(item, true);
    }

    /// Request a plain asset for the transfer channel.
    pub fn request_asset(&self, item: InventoryItem, sender: AssetSender) {
        let asset_id = item.asset_id;
        {
            let mut state = self.state.lock().unwrap();
            if state.assets.contains_key(&asset_id) {
                debug!(%asset_id, "asset fetch already in flight, coalescing");
                return;
            }
            state.assets.insert(asset_id, sender);
            if state.pending.insert(asset_id, false).is_some() {
                return;
            }
        }
        self.spawn_fetch(item, false);
    }

    fn spawn_fetch(&self, item: InventoryItem, is_texture: bool) {
        let fetcher = Arc::clone(&self.fetcher);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let asset_id = item.asset_id;
            let result = fetcher.fetch(&item).await;

            let (texture, asset_sender) = {
                let mut state = state.lock().unwrap();
                state.pending.remove(&asset_id);
                if is_texture {
                    (state.textures.remove(&asset_id), None)
                } else {
                    (None, state.assets.remove(&asset_id))
                }
            };

            match result {
                Ok(asset) if !asset.data.is_empty() => {
                    debug!(%asset_id, len = asset.data.len(), "asset received");
                    if let Some(sender) = texture {
                        sender.texture_received(&asset);
                    }
                    if let Some(sender) = asset_sender {
                        sender.asset_received(&asset);
                    }
                },
                Ok(_) => {
                    warn!(%asset_id, "backend returned an empty asset");
                    if let Some(sender) = texture {
                        sender.texture_not_found(asset_id);
                    }
                    if let Some(sender) = asset_sender {
                        sender.asset_not_found();
                    }
                },
                Err(e) => {
                    warn!(%asset_id, error = %e, "asset fetch failed");
                    if let Some(sender) = texture {
                        sender.texture_not_found(asset_id);
                    }
                    if let Some(sender) = asset_sender {
                        sender.asset_not_found();
                    }
                },
            }
        });
    }
}
