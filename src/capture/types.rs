use chrono::{DateTime, Utc};

/// One captured frame, in flight from a capture handle through the merge
/// point to the encoder. Never persisted; dropped once encoded.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Capture timestamp as reported by the interface.
    pub timestamp: DateTime<Utc>,
    /// Frame length on the wire, before snapshot truncation.
    pub original_len: u32,
    /// Captured bytes, at most the snapshot length.
    pub data: Vec<u8>,
}
