/// Custom error types for the PDM radio conversation engine
///
/// Provides comprehensive error handling with minimal overhead,
/// designed for production reliability and debugging clarity.
use std::fmt;
use std::io;

/// Result type alias for radio link operations
pub type Result<T> = std::result::Result<T, RadioError>;

/// Radio link error enumeration
///
/// Covers all failure modes in the conversation pipeline:
/// - Bridge I/O failures
/// - Packet/message codec failures
/// - Protocol-level violations
/// - Timeouts
#[derive(Debug, Clone)]
pub enum RadioError {
    /// The radio bridge adapter reported an I/O failure
    BridgeError(String),

    /// Reconnecting to the bridge failed after the allotted retries
    ReconnectFailed(String),

    /// A received buffer could not be parsed as a radio packet
    ParseFailed(String),

    /// A received packet matched neither a resync nor a duplicate-ACK
    /// pattern while the engine was mid-ACK/CON — the conversation is
    /// aborted per the protocol's resync-or-abort policy
    ProtocolAbort(String),

    /// The overall exchange timeout (default 10s) elapsed without a
    /// satisfying reply
    ExchangeTimeout,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BridgeError(msg) => write!(f, "radio bridge error: {}", msg),
            Self::ReconnectFailed(msg) => write!(f, "radio bridge reconnect failed: {}", msg),
            Self::ParseFailed(msg) => write!(f, "packet parse failed: {}", msg),
            Self::ProtocolAbort(msg) => write!(f, "protocol error: {}", msg),
            Self::ExchangeTimeout => write!(f, "exceeded timeout while send and receive"),
        }
    }
}

impl std::error::Error for RadioError {}

/// Convert from io::Error to RadioError
impl From<io::Error> for RadioError {
    fn from(err: io::Error) -> Self {
        Self::BridgeError(err.to_string())
    }
}
