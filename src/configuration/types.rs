use serde::Deserialize;

/// Capture parameters shared by every session.
///
/// These are deployment configuration, never client-supplied: each accepted
/// exec request captures from all of `interfaces` with the same `filter`
/// attached, regardless of the command text the client sent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptureConfig {
    /// Interfaces to tap. Opening is all-or-nothing; capturing from a subset
    /// is never offered.
    pub interfaces: Vec<String>,

    /// Packet filter expression, compiled and attached identically to every
    /// interface.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Maximum bytes captured per frame; longer frames are truncated.
    #[serde(default = "default_snaplen")]
    pub snaplen: u32,
}

pub(crate) fn default_filter() -> String {
    // DHCP(v6) and ICMPv6, the traffic the appliance is deployed to observe.
    "icmp6 or (udp and (port 67 or port 68 or port 546 or port 547))".to_string()
}

pub(crate) fn default_snaplen() -> u32 {
    1600
}

pub(crate) fn default_port() -> u16 {
    5022
}
