//! Protocol constants.

use std::time::Duration;

/// How long a long-poll round waits for the first event, and how long it
/// keeps collecting once one has arrived.
pub const BATCH_WAIT_INTERVAL: Duration = Duration::from_millis(200);

/// Total idle time before a long-poll round answers with a synthetic
/// keep-alive event instead of holding the connection open any longer.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(55);

/// Maximum events delivered in a single long-poll response.
pub const MAX_EVENTS_PER_RESPONSE: usize = 5;

/// Size of the first chunk of a chunked asset/texture download.
pub const FIRST_CHUNK_BYTES: usize = 600;

/// Size of every subsequent chunk.
pub const NEXT_CHUNK_BYTES: usize = 1000;

/// Top bit of an xfer sequence number, set on the final chunk.
pub const XFER_FINAL_FLAG: u32 = 0x8000_0000;

/// Inventory-descendents replies carry at most this many blocks per packet.
/// The reference grid servers send 6-7; firewalls choke on more.
pub const MAX_ITEMS_PER_PACKET: usize = 6;

/// Prefix of the locally served event-queue capability path.
pub const LOCAL_EQ_PREFIX: &str = "http://localEQG/";

/// Items in the shared library are owned by this well-known id and must be
/// served by the region, not the home inventory service.
pub const LIBRARY_OWNER: uuid::Uuid = uuid::Uuid::from_u128(0x11111111_1111_0000_0000_000100bba000);

/// Side length of one region in meters.
pub const REGION_SIZE: u32 = 256;
