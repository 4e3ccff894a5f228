//! Grid lookup: resolve a region handle to a region descriptor.

use std::time::Duration;

use {
    serde::Deserialize,
    tracing::{debug, warn},
    uuid::Uuid,
};

use gridway_common::RegionDescriptor;
use gridway_protocol::region::handle_to_grid;

use crate::{CommsError, Result};

#[derive(Debug, Deserialize)]
struct RegionLookupResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    region_uuid: Uuid,
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    region_locx: u32,
    #[serde(default)]
    region_locy: u32,
    #[serde(default)]
    sim_ip: String,
    #[serde(default)]
    sim_port: u16,
    #[serde(default)]
    http_port: Option<u16>,
    /// Hypergrid regions smuggle their real handle here; when present it
    /// overrides the advertised grid position.
    #[serde(default)]
    region_secret: Option<String>,
}

/// Client for the grid-lookup service of whichever grid currently hosts the
/// avatar.
pub struct GridClient {
    client: reqwest::Client,
}

impl GridClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Resolve a region descriptor by handle. `server_url` is the grid
    /// service of the current region's operator.
    pub async fn region_by_handle(
        &self,
        server_url: &str,
        send_key: &str,
        handle: u64,
    ) -> Result<RegionDescriptor> {
        let body = serde_json::json!({
            "method": "simulator_data_request",
            "region_handle": handle.to_string(),
            "authkey": send_key,
        });

        let resp: RegionLookupResponse = self
            .client
            .post(server_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp.error {
            warn!(handle, error = %err, "grid server rejected region lookup");
            return Err(CommsError::Backend(err));
        }

        let mut region = RegionDescriptor {
            region_id: resp.region_uuid,
            name: resp.region_name,
            grid_x: resp.region_locx,
            grid_y: resp.region_locy,
            external_host: resp.sim_ip,
            sim_port: resp.sim_port,
            http_port: resp.http_port.unwrap_or(9000),
        };
        adjust_region_handle(&mut region, resp.region_secret.as_deref());
        debug!(name = %region.name, x = region.grid_x, y = region.grid_y, "resolved region");
        Ok(region)
    }
}

/// Hypergrid regions advertise placeholder coordinates; the real handle
/// rides in the region secret. When it parses, it wins.
fn adjust_region_handle(region: &mut RegionDescriptor, secret: Option<&str>) {
    let Some(secret) = secret else { return };
    let Ok(real_handle) = secret.parse::<u64>() else {
        return;
    };
    let (x, y) = handle_to_grid(real_handle);
    if x > 0 || y > 0 {
        region.grid_x = x;
        region.grid_y = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridway_protocol::region::handle_from_grid;

    #[tokio::test]
    async fn resolves_region_from_lookup_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "region_uuid": Uuid::new_v4(),
                    "region_name": "Sandbox",
                    "region_locx": 1000,
                    "region_locy": 1002,
                    "sim_ip": "203.0.113.7",
                    "sim_port": 13005,
                    "http_port": 9003,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GridClient::new(Duration::from_secs(3));
        let region = client
            .region_by_handle(&server.url(), "", handle_from_grid(1000, 1002))
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(region.name, "Sandbox");
        assert_eq!(region.grid_x, 1000);
        assert_eq!(region.http_port, 9003);
        assert_eq!(region.handle(), handle_from_grid(1000, 1002));
    }

    #[tokio::test]
    async fn error_field_fails_the_lookup() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"error": "no such region"}"#)
            .create_async()
            .await;

        let client = GridClient::new(Duration::from_secs(3));
        let err = client
            .region_by_handle(&server.url(), "", 42)
            .await
            .unwrap_err();
        assert!(matches!(err, CommsError::Backend(_)));
    }

    #[test]
    fn region_secret_overrides_advertised_position() {
        let mut region = RegionDescriptor {
            region_id: Uuid::nil(),
            name: "hg".into(),
            grid_x: 1,
            grid_y: 1,
            external_host: "h".into(),
            sim_port: 0,
            http_port: 9000,
        };
        let real = handle_from_grid(4000, 4001);
        adjust_region_handle(&mut region, Some(&real.to_string()));
        assert_eq!((region.grid_x, region.grid_y), (4000, 4001));

        // Garbage secrets are ignored.
        adjust_region_handle(&mut region, Some("not-a-handle"));
        assert_eq!((region.grid_x, region.grid_y), (4000, 4001));
    }
}
