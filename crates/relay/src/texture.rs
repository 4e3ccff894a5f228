//! Texture delivery to the viewer over the image channel.

use std::sync::Arc;

use {tracing::debug, uuid::Uuid};

use {
    gridway_common::ProxyTransport,
    gridway_comms::Asset,
    gridway_protocol::{Direction, Packet},
};

use crate::chunks::{chunk_range, extra_packets};

/// JPEG2000, the only codec textures travel as.
const CODEC_J2C: u8 = 2;

/// Streams one requested texture back to the viewer.
///
/// The viewer's discard level bounds eagerness: `-1` means it has not asked
/// for detail yet, so nothing is emitted until a later request names a
/// level; levels above zero cap the packet budget.
pub struct TextureSender {
    transport: Arc<dyn ProxyTransport>,
    discard_level: i8,
    start_packet: u32,
}

impl TextureSender {
    pub fn new(transport: Arc<dyn ProxyTransport>, discard_level: i8, start_packet: u32) -> Self {
        Self {
            transport,
            discard_level,
            start_packet,
        }
    }

    /// Number of packets this sender may emit for a payload of `len` bytes.
    fn packet_budget(&self, len: usize) -> usize {
        let total = 1 + extra_packets(len);
        match self.discard_level {
            -1 => 0,
            d if d > 0 => total.min(50 + extra_packets(len) / (d as usize + 1)),
            _ => total,
        }
    }

    /// The asset arrived; emit image packets.
    pub fn texture_received(&self, asset: &Asset) {
        let len = asset.data.len();
        let extra = extra_packets(len);
        let budget = self.packet_budget(len);
        debug!(asset = %asset.id, len, extra, budget, discard = self.discard_level, "sending texture");

        let mut sent = 0usize;
        let mut packet = self.start_packet as usize;
        while sent < budget {
            let Some(range) = chunk_range(len, packet) else {
                break;
            };
            let data = asset.data[range].to_vec();
            if packet == 0 {
                self.transport.inject(
                    Packet::ImageData {
                        image_id: asset.id,
                        codec: CODEC_J2C,
                        size: len as u32,
                        packets: extra as u16,
                        data,
                    },
                    Direction::Incoming,
                );
            } else {
                self.transport.inject(
                    Packet::ImagePacket {
                        image_id: asset.id,
                        packet: packet as u16,
                        data,
                    },
                    Direction::Incoming,
                );
            }
            packet += 1;
            sent += 1;
        }
    }

    /// The backend has no such texture; tell the viewer instead of letting
    /// the request time out silently.
    pub fn texture_not_found(&self, image_id: Uuid) {
        self.transport
            .inject(Packet::ImageNotInDatabase { image_id }, Direction::Incoming);
    }
}
