//! Chunked asset upload: the xfer handshake.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    tracing::{debug, warn},
    uuid::Uuid,
};

use {
    gridway_common::ProxyTransport,
    gridway_comms::{Asset, InventoryService},
    gridway_protocol::{Direction, Packet, constants::XFER_FINAL_FLAG},
};

/// Process-wide xfer id allocator.
static NEXT_XFER_ID: AtomicU64 = AtomicU64::new(1);

fn next_xfer_id() -> u64 {
    NEXT_XFER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Derive the asset id a viewer upload will be stored under from its
/// transaction id and the avatar's secure session id.
pub fn combine_ids(transaction_id: Uuid, secure_session_id: Uuid) -> Uuid {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(transaction_id.as_bytes());
    hasher.update(secure_session_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

struct ReceiverState {
    data: Vec<u8>,
    completed: bool,
}

/// Accumulates one upload, chunk by chunk, and posts the finished asset to
/// the backend.
pub struct AssetReceiver {
    transport: Arc<dyn ProxyTransport>,
    pub asset_id: Uuid,
    pub transaction_id: Uuid,
    pub xfer_id: u64,
    asset_type: i8,
    temporary: bool,
    state: Mutex<ReceiverState>,
}

impl AssetReceiver {
    pub fn new(
        transport: Arc<dyn ProxyTransport>,
        asset_id: Uuid,
        transaction_id: Uuid,
        asset_type: i8,
        temporary: bool,
    ) -> Self {
        Self {
            transport,
            asset_id,
            transaction_id,
            xfer_id: next_xfer_id(),
            asset_type,
            temporary,
            state: Mutex::new(ReceiverState {
                data: Vec::new(),
                completed: false,
            }),
        }
    }

    /// Start the upload. A non-empty payload fits in the request itself and
    /// completes immediately; an empty one kicks off the xfer handshake.
    /// Returns whether the upload is already complete.
    pub async fn begin(&self, data: Vec<u8>, service: &InventoryService) -> bool {
        if !data.is_empty() {
            self.state.lock().unwrap().data = data;
            self.complete_upload(service).await;
            true
        } else {
            debug!(transaction = %self.transaction_id, xfer = self.xfer_id, "requesting xfer");
            self.transport.inject(
                Packet::RequestXfer {
                    xfer_id: self.xfer_id,
                    vfile_id: self.asset_id,
                    vfile_type: self.asset_type as i16,
                    file_path: 0,
                    filename: String::new(),
                },
                Direction::Incoming,
            );
            false
        }
    }

    /// Append one xfer chunk, confirm it, and finalize on the terminal bit.
    /// Returns true when the upload completed.
    pub async fn receive_chunk(&self, packet_id: u32, data: &[u8], service: &InventoryService) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.data.is_empty() && data.len() >= 4 {
                // The first chunk leads with a 4-byte total-length prefix.
                state.data.extend_from_slice(&data[4..]);
            } else {
                state.data.extend_from_slice(data);
            }
        }

        self.transport.inject(
            Packet::ConfirmXferPacket {
                xfer_id: self.xfer_id,
                packet: packet_id,
            },
            Direction::Incoming,
        );

        if packet_id & XFER_FINAL_FLAG != 0 {
            self.complete_upload(service).await;
            true
        } else {
            false
        }
    }

    /// The asset accumulated so far. Used when a later inventory create
    /// adopts the uploaded data.
    pub fn asset(&self) -> Asset {
        let state = self.state.lock().unwrap();
        Asset {
            id: self.asset_id,
            asset_type: self.asset_type,
            name: "blank".into(),
            description: "empty".into(),
            local: false,
            temporary: self.temporary,
            data: state.data.clone(),
        }
    }

    async fn complete_upload(&self, service: &InventoryService) {
        {
            let mut state = self.state.lock().unwrap();
            if state.completed {
                return;
            }
            state.completed = true;
        }

        let asset = self.asset();
        debug!(asset = %asset.id, len = asset.data.len(), "upload complete, posting to backend");
        let success = match service.post_asset(&asset).await {
            Ok(()) => true,
            Err(e) => {
                warn!(asset = %asset.id, error = %e, "asset post failed");
                false
            },
        };

        self.transport.inject(
            Packet::AssetUploadComplete {
                asset_id: self.asset_id,
                asset_type: self.asset_type,
                success,
            },
            Direction::Incoming,
        );
    }
}

/// In-flight uploads, looked up by transaction id (inventory create/update)
/// or by xfer id (chunk arrival).
#[derive(Default)]
pub struct UploadTracker {
    by_transaction: Mutex<HashMap<Uuid, Arc<AssetReceiver>>>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, receiver: Arc<AssetReceiver>) {
        self.by_transaction
            .lock()
            .unwrap()
            .insert(receiver.transaction_id, receiver);
    }

    pub fn by_transaction(&self, transaction_id: Uuid) -> Option<Arc<AssetReceiver>> {
        self.by_transaction
            .lock()
            .unwrap()
            .get(&transaction_id)
            .cloned()
    }

    pub fn by_xfer(&self, xfer_id: u64) -> Option<Arc<AssetReceiver>> {
        self.by_transaction
            .lock()
            .unwrap()
            .values()
            .find(|r| r.xfer_id == xfer_id)
            .cloned()
    }

    /// Remove a finished upload. Returns the receiver so the caller can
    /// still adopt its asset.
    pub fn remove(&self, transaction_id: Uuid) -> Option<Arc<AssetReceiver>> {
        self.by_transaction.lock().unwrap().remove(&transaction_id)
    }

    pub fn len(&self) -> usize {
        self.by_transaction.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_transaction.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingTransport;

    async fn service(server: &mockito::ServerGuard) -> InventoryService {
        InventoryService::new(&server.url(), "tok", std::time::Duration::from_secs(5))
    }

    #[tokio::test]
    async fn scenario_a_tiny_payload_completes_immediately() {
        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/tok/PostAsset/")
            .with_status(200)
            .create_async()
            .await;

        let transport = RecordingTransport::new();
        let recv = AssetReceiver::new(transport.clone(), Uuid::new_v4(), Uuid::new_v4(), 0, false);
        let done = recv.begin(vec![1, 2], &service(&server).await).await;

        assert!(done);
        post.assert_async().await;
        let injected = transport.injected();
        // No RequestXfer, straight to completion.
        assert_eq!(injected.len(), 1);
        assert!(matches!(
            &injected[0].0,
            Packet::AssetUploadComplete { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn empty_payload_starts_the_handshake() {
        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/tok/PostAsset/")
            .with_status(200)
            .create_async()
            .await;

        let transport = RecordingTransport::new();
        let recv = AssetReceiver::new(transport.clone(), Uuid::new_v4(), Uuid::new_v4(), 0, false);
        assert!(!recv.begin(Vec::new(), &service(&server).await).await);
        assert!(matches!(&transport.injected()[0].0, Packet::RequestXfer { .. }));

        // First chunk: 4-byte length prefix then payload; final bit set on
        // the second chunk.
        let svc = service(&server).await;
        let mut first = 8u32.to_le_bytes().to_vec();
        first.extend_from_slice(&[1, 2, 3, 4]);
        assert!(!recv.receive_chunk(0, &first, &svc).await);
        assert!(recv.receive_chunk(1 | XFER_FINAL_FLAG, &[5, 6, 7, 8], &svc).await);

        post.assert_async().await;
        assert_eq!(recv.asset().data, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let injected = transport.injected();
        let confirms = injected
            .iter()
            .filter(|(p, _)| matches!(p, Packet::ConfirmXferPacket { .. }))
            .count();
        assert_eq!(confirms, 2);
        assert!(matches!(
            injected.last().unwrap().0,
            Packet::AssetUploadComplete { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn failed_post_reports_failure_to_viewer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tok/PostAsset/")
            .with_status(500)
            .create_async()
            .await;

        let transport = RecordingTransport::new();
        let recv = AssetReceiver::new(transport.clone(), Uuid::new_v4(), Uuid::new_v4(), 0, false);
        recv.begin(vec![9], &service(&server).await).await;

        assert!(matches!(
            &transport.injected()[0].0,
            Packet::AssetUploadComplete { success: false, .. }
        ));
    }

    #[test]
    fn tracker_finds_by_both_keys() {
        let transport = RecordingTransport::new();
        let tracker = UploadTracker::new();
        let recv = Arc::new(AssetReceiver::new(
            transport,
            Uuid::new_v4(),
            Uuid::new_v4(),
            0,
            false,
        ));
        tracker.insert(Arc::clone(&recv));

        assert!(tracker.by_transaction(recv.transaction_id).is_some());
        assert!(tracker.by_xfer(recv.xfer_id).is_some());
        assert!(tracker.by_xfer(recv.xfer_id + 10_000).is_none());

        tracker.remove(recv.transaction_id);
        assert!(tracker.is_empty());
    }

    #[test]
    fn combine_is_deterministic_and_keyed() {
        let (t, s) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(combine_ids(t, s), combine_ids(t, s));
        assert_ne!(combine_ids(t, s), combine_ids(s, t));
    }
}
