use crate::capture::types::Packet;

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const LINKTYPE_ETHERNET: u32 = 1;

/// Serializes the merged packet sequence into the classic pcap format.
///
/// Exactly one 24-byte global header precedes all packet records of a
/// session. Each record carries the capture timestamp, the captured length
/// and the original length ahead of the frame bytes.
#[derive(Debug, Clone)]
pub struct PcapEncoder {
    snaplen: u32,
}

impl PcapEncoder {
    pub fn new(snaplen: u32) -> Self {
        Self { snaplen }
    }

    /// The global header, written once before any packet record.
    pub fn file_header(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(24);
        header.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
        header.extend_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
        header.extend_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
        header.extend_from_slice(&0i32.to_le_bytes()); // thiszone
        header.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        header.extend_from_slice(&self.snaplen.to_le_bytes());
        header.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
        header
    }

    /// One record per packet. Frames longer than the snapshot length are
    /// truncated; the original length is kept.
    pub fn packet_record(&self, packet: &Packet) -> Vec<u8> {
        let captured = packet.data.len().min(self.snaplen as usize);
        let mut record = Vec::with_capacity(16 + captured);
        record.extend_from_slice(&(packet.timestamp.timestamp() as u32).to_le_bytes());
        record.extend_from_slice(&packet.timestamp.timestamp_subsec_micros().to_le_bytes());
        record.extend_from_slice(&(captured as u32).to_le_bytes());
        record.extend_from_slice(&packet.original_len.to_le_bytes());
        record.extend_from_slice(&packet.data[..captured]);
        record
    }
}
