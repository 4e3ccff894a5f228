//! Routing index: which asset ids belong to the home inventory.

use std::{collections::HashMap, sync::Mutex};

use {tracing::debug, uuid::Uuid};

#[derive(Default)]
struct CacheInner {
    /// asset id → item id (the routing lookup).
    by_asset: HashMap<Uuid, Uuid>,
    /// item id → asset id (removals arrive keyed by item).
    by_item: HashMap<Uuid, Uuid>,
}

/// Pairings of inventory item id and asset id, maintained on every
/// successful fetch/create/update and consulted to decide whether an asset
/// operation is ours or the region's.
#[derive(Default)]
pub struct AssetCache {
    inner: Mutex<CacheInner>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pairing. Idempotent; a later insert for the same item
    /// replaces its asset mapping (assets change on item update).
    pub fn insert(&self, item_id: Uuid, asset_id: Uuid) {
        if asset_id.is_nil() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(previous) = inner.by_item.insert(item_id, asset_id)
            && previous != asset_id
        {
            inner.by_asset.remove(&previous);
        }
        inner.by_asset.insert(asset_id, item_id);
    }

    /// Drop the pairing for a deleted inventory item.
    pub fn remove_item(&self, item_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(asset_id) = inner.by_item.remove(&item_id) {
            inner.by_asset.remove(&asset_id);
            debug!(%item_id, %asset_id, "removed from asset cache");
        }
    }

    /// Point lookup: does this asset belong to the home inventory?
    pub fn is_managed(&self, asset_id: Uuid) -> bool {
        self.inner.lock().unwrap().by_asset.contains_key(&asset_id)
    }

    /// The inventory item an asset id maps to, if any.
    pub fn item_for(&self, asset_id: Uuid) -> Option<Uuid> {
        self.inner.lock().unwrap().by_asset.get(&asset_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_asset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().by_asset.is_empty()
    }
}
