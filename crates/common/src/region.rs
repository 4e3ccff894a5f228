//! Region descriptors.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use {
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use gridway_protocol::region::handle_from_grid;

/// Everything the gateway needs to know about one simulator region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub region_id: Uuid,
    pub name: String,
    /// Grid position in region units.
    pub grid_x: u32,
    pub grid_y: u32,
    /// Externally reachable simulator host.
    pub external_host: String,
    /// UDP circuit port.
    pub sim_port: u16,
    /// HTTP service port.
    pub http_port: u16,
}

impl RegionDescriptor {
    /// The 64-bit handle encoding this region's grid position.
    pub fn handle(&self) -> u64 {
        handle_from_grid(self.grid_x, self.grid_y)
    }

    /// Base URL of the region's HTTP services.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.external_host, self.http_port)
    }

    /// External UDP endpoint of the simulator.
    pub fn external_endpoint(&self) -> SocketAddr {
        let ip: IpAddr = self
            .external_host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        SocketAddr::new(ip, self.sim_port)
    }
}
