//! Home-grid inventory/asset service client.
//!
//! Endpoints follow the `<service>/<auth-token>/<Operation>/` scheme the
//! inventory service establishes at connect time.

use std::time::Duration;

use {
    serde_json::json,
    tracing::{debug, warn},
    uuid::Uuid,
};

use crate::{
    Result,
    types::{Asset, InventoryCollection, InventoryFolder, InventoryItem},
};

/// Client bound to one user's inventory capability URL.
pub struct InventoryService {
    client: reqwest::Client,
    /// `<inventory-server>/<auth-token>`, no trailing slash.
    base_url: String,
}

impl InventoryService {
    pub fn new(inventory_server_url: &str, auth_token: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: format!(
                "{}/{}",
                inventory_server_url.trim_end_matches('/'),
                auth_token
            ),
        }
    }

    fn op_url(&self, op: &str) -> String {
        format!("{}/{}/", self.base_url, op)
    }

    /// Connect to the service and obtain its per-user capability handlers
    /// (named upload caps like `UpdateScriptAgent`), keyed by name.
    pub async fn connect_handlers(
        &self,
        user_id: Uuid,
    ) -> Result<std::collections::HashMap<String, String>> {
        let resp = self
            .client
            .post(self.op_url("GetCapabilities"))
            .json(&json!({ "user_id": user_id }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    /// Fetch the whole inventory skeleton at login.
    pub async fn get_inventory(&self, user_id: Uuid) -> Result<InventoryCollection> {
        let resp = self
            .client
            .post(self.op_url("GetInventory"))
            .json(&json!({ "user_id": user_id }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    /// Fetch one folder's direct descendants.
    pub async fn fetch_descendants(
        &self,
        folder_id: Uuid,
        owner_id: Uuid,
    ) -> Result<InventoryCollection> {
        let resp = self
            .client
            .post(self.op_url("FetchDescendants"))
            .json(&json!({ "folder_id": folder_id, "owner_id": owner_id }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    pub async fn get_item(&self, item_id: Uuid, owner_id: Uuid) -> Result<InventoryItem> {
        let resp = self
            .client
            .post(self.op_url("GetItem"))
            .json(&json!({ "item_id": item_id, "owner_id": owner_id }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    /// Run one folder operation (`NewFolder`, `UpdateFolder`, `MoveFolder`,
    /// `PurgeFolder`, `RemoveFolder`).
    pub async fn folder_operation(&self, op: &str, folder: &InventoryFolder) -> Result<()> {
        debug!(op, folder = %folder.id, "inventory folder operation");
        self.client
            .post(self.op_url(op))
            .json(folder)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Run one item operation (`NewItem`, `UpdateItem`, `DeleteItem`,
    /// `MoveItem`, `CopyItem`). The service answers with the resulting item;
    /// a zeroed id means the operation was unsuccessful.
    pub async fn item_operation(&self, op: &str, item: &InventoryItem) -> Result<InventoryItem> {
        debug!(op, item = %item.id, "inventory item operation");
        let resp: InventoryItem = self
            .client
            .post(self.op_url(op))
            .json(item)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if resp.is_unsuccessful() {
            warn!(op, item = %item.id, "inventory item operation was unsuccessful");
        }
        Ok(resp)
    }

    /// Fetch the asset behind an inventory item.
    pub async fn get_asset(&self, item: &InventoryItem) -> Result<Asset> {
        let resp = self
            .client
            .get(format!("{}/GetAsset/{}/", self.base_url, item.id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    /// Store a new asset.
    pub async fn post_asset(&self, asset: &Asset) -> Result<()> {
        debug!(asset = %asset.id, len = asset.data.len(), "posting asset");
        self.client
            .post(self.op_url("PostAsset"))
            .json(asset)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
