//! Presence calls against a simulator region's HTTP services.

use std::time::Duration;

use {
    serde::Deserialize,
    serde_json::json,
    tracing::{debug, warn},
    uuid::Uuid,
};

use gridway_common::{Appearance, CircuitData, RegionDescriptor};
use gridway_protocol::packets::Vector3;

use crate::{CommsError, Result};

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RootAgentResponse {
    position: Vector3,
    appearance: Option<Appearance>,
}

/// Client for one region's agent endpoints.
pub struct RegionComms {
    client: reqwest::Client,
    base_url: String,
}

impl RegionComms {
    pub fn new(region: &RegionDescriptor, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: region.base_url(),
        }
    }

    /// Announce the avatar's identity and home services to the region before
    /// any presence is created there.
    pub async fn inform_region_of_user(
        &self,
        circuit: &CircuitData,
        home: &RegionDescriptor,
        user_server: &str,
        inventory_server: &str,
        asset_server: &str,
    ) -> Result<()> {
        let body = json!({
            "method": "expect_hg_user",
            "agent_id": circuit.agent_id,
            "session_id": circuit.session_id,
            "secure_session_id": circuit.secure_session_id,
            "circuit_code": circuit.circuit_code,
            "firstname": circuit.first_name,
            "lastname": circuit.last_name,
            "startpos_x": circuit.start_position[0],
            "startpos_y": circuit.start_position[1],
            "startpos_z": circuit.start_position[2],
            "userserver_id": user_server,
            "inventoryserver_id": inventory_server,
            "assetserver_id": asset_server,
            "regionhandle": home.handle().to_string(),
            "home_address": home.external_host,
            "home_port": home.http_port,
        });

        debug!(url = %self.base_url, "informing region about user");
        let resp: SuccessResponse = self
            .client
            .post(format!("{}/", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if resp.success {
            Ok(())
        } else {
            let reason = resp
                .reason
                .unwrap_or_else(|| "region is not available to receive clients".into());
            warn!(url = %self.base_url, %reason, "region refused user announcement");
            Err(CommsError::Backend(reason))
        }
    }

    /// Create the child presence. `auth_key` is the single-use transfer
    /// credential from the identity-auth service.
    pub async fn create_child_agent(&self, circuit: &CircuitData, auth_key: &str) -> Result<()> {
        let body = json!({
            "agent_id": circuit.agent_id,
            "session_id": circuit.session_id,
            "circuit_code": circuit.circuit_code,
            "caps_path": circuit.caps_path,
            "child": true,
            "auth_key": auth_key,
            "startpos_x": circuit.start_position[0],
            "startpos_y": circuit.start_position[1],
            "startpos_z": circuit.start_position[2],
        });

        let resp: SuccessResponse = self
            .client
            .post(format!("{}/agent/", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(url = %self.base_url, success = resp.success, "posted agent circuit data");
        if resp.success {
            Ok(())
        } else {
            Err(CommsError::Backend(
                resp.reason.unwrap_or_else(|| "agent creation refused".into()),
            ))
        }
    }

    /// Push updated position/orientation (and implicitly appearance) to the
    /// region's presence.
    pub async fn update_child_agent(
        &self,
        circuit: &CircuitData,
        position: Vector3,
        look_at: Vector3,
    ) -> Result<()> {
        let body = json!({
            "agent_id": circuit.agent_id,
            "session_id": circuit.session_id,
            "position": position,
            "look_at": look_at,
        });

        self.client
            .put(format!("{}/agent/{}/", self.base_url, circuit.agent_id))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!(url = %self.base_url, "updated agent");
        Ok(())
    }

    /// Read the root presence back: position and, when the region shares it,
    /// appearance. Used best-effort while completing a handoff.
    pub async fn retrieve_root_agent(
        &self,
        agent_id: Uuid,
    ) -> Result<(Vector3, Option<Appearance>)> {
        let resp: RootAgentResponse = self
            .client
            .get(format!("{}/agent/{}/", self.base_url, agent_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok((resp.position, resp.appearance))
    }

    /// Close the region-side presence.
    pub async fn close_agent(&self, agent_id: Uuid) -> Result<()> {
        self.client
            .delete(format!("{}/agent/{}/", self.base_url, agent_id))
            .send()
            .await?
            .error_for_status()?;
        debug!(url = %self.base_url, %agent_id, "closed agent");
        Ok(())
    }

    /// Rez an attachment from inventory onto the avatar in this region.
    pub async fn create_object(&self, agent_id: Uuid, item_id: Uuid) -> Result<()> {
        let body = json!({ "agent_id": agent_id, "item_id": item_id });
        self.client
            .post(format!("{}/object/", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(url: &str) -> RegionDescriptor {
        let (host, port) = url
            .strip_prefix("http://")
            .and_then(|r| r.split_once(':'))
            .map(|(h, p)| (h.to_string(), p.parse().unwrap()))
            .unwrap();
        RegionDescriptor {
            region_id: Uuid::new_v4(),
            name: "mock".into(),
            grid_x: 1000,
            grid_y: 1000,
            external_host: host,
            sim_port: 13000,
            http_port: port,
        }
    }

    #[tokio::test]
    async fn refused_announcement_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"success": false, "reason": "region full"}"#)
            .create_async()
            .await;

        let region = region(&server.url());
        let comms = RegionComms::new(&region, Duration::from_secs(6));
        let err = comms
            .inform_region_of_user(
                &CircuitData::default(),
                &region,
                "http://user",
                "http://inv",
                "http://asset",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommsError::Backend(r) if r == "region full"));
    }

    #[tokio::test]
    async fn create_child_agent_reports_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agent/")
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let region = region(&server.url());
        let comms = RegionComms::new(&region, Duration::from_secs(6));
        comms
            .create_child_agent(&CircuitData::default(), "transfer-key")
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
