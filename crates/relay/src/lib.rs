//! Asset/inventory relay.
//!
//! Decides, per asset-bearing operation, whether to serve it from the
//! home-grid inventory/asset service or let the current region handle it,
//! and owns the chunked-transfer machinery in both directions.

pub mod cache;
pub mod chunks;
pub mod downloader;
pub mod inventory;
pub mod receiver;
pub mod sender;
pub mod texture;

pub use {
    cache::AssetCache,
    downloader::{AssetDownloader, AssetFetcher},
    inventory::InventoryRelay,
    receiver::{AssetReceiver, UploadTracker},
    sender::AssetSender,
    texture::TextureSender,
};

#[cfg(test)]
pub(crate) mod test_util {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use gridway_common::ProxyTransport;
    use gridway_protocol::{Direction, Packet};

    /// Transport double that records every injected packet.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub injected: Mutex<Vec<(Packet, Direction)>>,
    }

    impl RecordingTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn injected(&self) -> Vec<(Packet, Direction)> {
            self.injected.lock().unwrap().clone()
        }
    }

    impl ProxyTransport for RecordingTransport {
        fn inject(&self, packet: Packet, direction: Direction) {
            self.injected.lock().unwrap().push((packet, direction));
        }

        fn proxy_endpoint(&self, region: SocketAddr) -> SocketAddr {
            region
        }

        fn login_uri(&self) -> String {
            "http://127.0.0.1:8080/".into()
        }
    }
}
