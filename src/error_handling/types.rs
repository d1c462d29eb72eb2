use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(toml::de::Error),
    NoInterfaces,
    NoListenAddresses,
    SnaplenZero,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NoInterfaces => write!(f, "capture.interfaces must not be empty"),
            ConfigError::NoListenAddresses => write!(f, "listen_addresses must not be empty"),
            ConfigError::SnaplenZero => write!(f, "capture.snaplen must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Errors raised by capture handles and the orchestrator. Each names the
/// interface it occurred on since a session spans several.
#[derive(Debug)]
pub enum CaptureError {
    OpenFailed { interface: String, source: pcap::Error },
    FilterFailed { interface: String, source: pcap::Error },
    ReadFailed { interface: String, source: pcap::Error },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::OpenFailed { interface, source } => {
                write!(f, "failed to open {}: {}", interface, source)
            }
            CaptureError::FilterFailed { interface, source } => {
                write!(f, "failed to attach filter on {}: {}", interface, source)
            }
            CaptureError::ReadFailed { interface, source } => {
                write!(f, "read error on {}: {}", interface, source)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Session-terminating errors. Their `Display` text is what the client sees,
/// normalized to exactly one trailing newline before delivery.
#[derive(Debug)]
pub enum SessionError {
    UnknownRequestType(String),
    PayloadTooShort { got: usize, want: usize },
    AlreadyActive,
    Capture(CaptureError),
    ChannelClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::UnknownRequestType(kind) => {
                write!(f, "unknown request type: {:?}", kind)
            }
            SessionError::PayloadTooShort { got, want } => {
                write!(f, "exec request payload too short: got {}, want >= {}", got, want)
            }
            SessionError::AlreadyActive => write!(f, "session already active"),
            SessionError::Capture(e) => write!(f, "capture error: {}", e),
            SessionError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        SessionError::Capture(err)
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    UnknownChannelType(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownChannelType(kind) => {
                write!(f, "unknown channel type: {:?}", kind)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Startup failures. These are the only process-fatal errors; everything
/// else stays scoped to one connection or one session.
#[derive(Debug)]
pub enum ServerError {
    HostKey(russh_keys::Error),
    Bind(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::HostKey(e) => write!(f, "host key error: {}", e),
            ServerError::Bind(e) => write!(f, "bind error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}
