use crate::capture::types::Packet;
use crate::error_handling::types::CaptureError;
use chrono::DateTime;

/// Read timeout on live handles, in milliseconds.
///
/// Reads wake up at this interval even on an idle interface, so a producer
/// observes cancellation within a bounded delay instead of blocking on the
/// next frame indefinitely.
const READ_TIMEOUT_MS: i32 = 500;

/// An open tap on one network interface, readable until dropped. Dropping
/// the source releases the underlying handle.
pub trait CaptureSource: Send {
    /// Blocks for the next frame. `Ok(None)` is a read timeout tick; the
    /// caller re-checks for cancellation and calls again.
    fn next_packet(&mut self) -> Result<Option<Packet>, CaptureError>;
}

/// Opens capture handles. The orchestrator only goes through this seam,
/// which keeps the fan-in and teardown logic testable with scripted sources.
pub trait SourceFactory: Send + Sync {
    /// Opens `interface` with the given snapshot length and the filter
    /// expression attached.
    fn open(
        &self,
        interface: &str,
        snaplen: u32,
        filter: &str,
    ) -> Result<Box<dyn CaptureSource>, CaptureError>;
}

/// Live factory backed by libpcap.
pub struct PcapSourceFactory;

impl SourceFactory for PcapSourceFactory {
    fn open(
        &self,
        interface: &str,
        snaplen: u32,
        filter: &str,
    ) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let open_err = |source| CaptureError::OpenFailed {
            interface: interface.to_string(),
            source,
        };
        let mut capture = pcap::Capture::from_device(interface)
            .map_err(open_err)?
            .promisc(false)
            .snaplen(snaplen as i32)
            .timeout(READ_TIMEOUT_MS)
            .open()
            .map_err(open_err)?;
        capture
            .filter(filter, true)
            .map_err(|source| CaptureError::FilterFailed {
                interface: interface.to_string(),
                source,
            })?;
        Ok(Box::new(PcapSource {
            interface: interface.to_string(),
            capture,
        }))
    }
}

struct PcapSource {
    interface: String,
    capture: pcap::Capture<pcap::Active>,
}

impl CaptureSource for PcapSource {
    fn next_packet(&mut self) -> Result<Option<Packet>, CaptureError> {
        match self.capture.next_packet() {
            Ok(frame) => {
                let header = *frame.header;
                let timestamp = DateTime::from_timestamp(
                    header.ts.tv_sec as i64,
                    (header.ts.tv_usec as u32) * 1000,
                )
                .unwrap_or(DateTime::UNIX_EPOCH);
                Ok(Some(Packet {
                    timestamp,
                    original_len: header.len,
                    data: frame.data.to_vec(),
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(source) => Err(CaptureError::ReadFailed {
                interface: self.interface.clone(),
                source,
            }),
        }
    }
}
