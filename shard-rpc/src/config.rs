//! Tunables for the multiplexer, the service, and the client.

use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

/// Protocol header byte that routes a multiplexed connection to this service.
///
/// Must differ from every other protocol registered on the same port.
pub const MUX_HEADER: u8 = 2;

/// How long the multiplexer waits for a new connection's header byte.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Bound on each of the client's write and read phases.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MuxConfig {
    pub header_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            header_timeout: DEFAULT_HEADER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest request payload a session will read before closing.
    pub max_frame_size: u64,
    /// Optional deadline for a single storage call. `None` waits indefinitely.
    pub handler_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            handler_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub header: u8,
    pub dial_timeout: Duration,
    pub timeout: Duration,
    pub max_frame_size: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            header: MUX_HEADER,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
