//! Asset delivery to the viewer over the transfer channel.

use std::sync::Arc;

use {tracing::debug, uuid::Uuid};

use {
    gridway_common::ProxyTransport,
    gridway_comms::Asset,
    gridway_protocol::{Direction, Packet},
};

use crate::chunks::{chunk_range, total_packets};

/// Asset transfer channel id used by viewers.
const CHANNEL_ASSET: i32 = 2;

/// Transfer source kinds we relay: 2 = direct asset, 3 = inventory item.
const SOURCE_ASSET: i32 = 2;

/// Answers one `TransferRequest` with a `TransferInfo` header followed by
/// sequence-numbered `TransferPacket` chunks.
pub struct AssetSender {
    transport: Arc<dyn ProxyTransport>,
    asset_id: Uuid,
    transfer_id: Uuid,
    source_type: i32,
    /// Request params, echoed back verbatim for inventory-sourced requests.
    params: Vec<u8>,
}

impl AssetSender {
    pub fn new(
        transport: Arc<dyn ProxyTransport>,
        asset_id: Uuid,
        transfer_id: Uuid,
        source_type: i32,
        params: Vec<u8>,
    ) -> Self {
        Self {
            transport,
            asset_id,
            transfer_id,
            source_type,
            params,
        }
    }

    /// The backend has no such asset; abort the transfer instead of letting
    /// the viewer's request time out.
    pub fn asset_not_found(&self) {
        self.transport.inject(
            Packet::TransferInfo {
                transfer_id: self.transfer_id,
                channel_type: CHANNEL_ASSET,
                target_type: 0,
                // -2 is the abort status viewers understand.
                status: -2,
                size: 0,
                params: self.params.clone(),
            },
            Direction::Incoming,
        );
    }

    pub fn asset_received(&self, asset: &Asset) {
        let params = if self.source_type == SOURCE_ASSET {
            // Direct requests get the canonical 20-byte params: asset id
            // plus the asset type.
            let mut p = Vec::with_capacity(20);
            p.extend_from_slice(self.asset_id.as_bytes());
            p.extend_from_slice(&(asset.asset_type as i32).to_le_bytes());
            p
        } else {
            self.params.clone()
        };

        self.transport.inject(
            Packet::TransferInfo {
                transfer_id: self.transfer_id,
                channel_type: CHANNEL_ASSET,
                target_type: 0,
                status: 0,
                size: asset.data.len() as i32,
                params,
            },
            Direction::Incoming,
        );

        let total = total_packets(asset.data.len());
        debug!(asset = %asset.id, len = asset.data.len(), total, "sending asset transfer");
        for n in 0..total {
            let range = match chunk_range(asset.data.len(), n) {
                Some(r) => r,
                None => break,
            };
            self.transport.inject(
                Packet::TransferPacket {
                    transfer_id: self.transfer_id,
                    channel_type: CHANNEL_ASSET,
                    packet: n as i32,
                    // 0 = more to come, 1 = final chunk.
                    status: if n + 1 == total { 1 } else { 0 },
                    data: asset.data[range].to_vec(),
                },
                Direction::Incoming,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingTransport;

    fn asset(len: usize) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            asset_type: 10,
            data: vec![7; len],
            ..Default::default()
        }
    }

    #[test]
    fn small_asset_is_one_final_packet() {
        let transport = RecordingTransport::new();
        let a = asset(2);
        let sender = AssetSender::new(transport.clone(), a.id, Uuid::new_v4(), 3, vec![1, 2]);
        sender.asset_received(&a);

        let injected = transport.injected();
        assert_eq!(injected.len(), 2);
        match &injected[0].0 {
            Packet::TransferInfo { size, status, params, .. } => {
                assert_eq!(*size, 2);
                assert_eq!(*status, 0);
                assert_eq!(params, &[1, 2]);
            },
            other => panic!("expected TransferInfo, got {other:?}"),
        }
        assert!(matches!(
            &injected[1].0,
            Packet::TransferPacket { packet: 0, status: 1, data, .. } if data.len() == 2
        ));
    }

    #[test]
    fn large_asset_chunks_with_final_flag_last() {
        let transport = RecordingTransport::new();
        let a = asset(1400);
        let sender = AssetSender::new(transport.clone(), a.id, Uuid::new_v4(), 3, vec![]);
        sender.asset_received(&a);

        let injected = transport.injected();
        // Info + 2 chunks.
        assert_eq!(injected.len(), 3);
        let statuses: Vec<i32> = injected[1..]
            .iter()
            .map(|(p, _)| match p {
                Packet::TransferPacket { status, .. } => *status,
                _ => panic!("expected TransferPacket"),
            })
            .collect();
        assert_eq!(statuses, [0, 1]);

        let bytes: usize = injected[1..]
            .iter()
            .map(|(p, _)| match p {
                Packet::TransferPacket { data, .. } => data.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(bytes, 1400);
    }

    #[test]
    fn direct_source_rebuilds_params() {
        let transport = RecordingTransport::new();
        let a = asset(10);
        let sender = AssetSender::new(transport.clone(), a.id, Uuid::new_v4(), 2, vec![]);
        sender.asset_received(&a);

        match &transport.injected()[0].0 {
            Packet::TransferInfo { params, .. } => {
                assert_eq!(params.len(), 20);
                assert_eq!(&params[..16], a.id.as_bytes());
            },
            other => panic!("expected TransferInfo, got {other:?}"),
        }
    }
}
