//! Session configuration.

use std::time::Duration;

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

/// Default transport read chunk (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of attempts when a tracker connects to its client.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Default pause between connection attempts.
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Default time a client waits for a tracker to connect.
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables shared by both roles.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest accepted line, excluding the newline.
    pub max_line_length: usize,
    /// Size of each transport read.
    pub read_buffer_size: usize,
    /// Skip lines without the protocol prefix instead of failing.
    ///
    /// Trackers on stdio often print diagnostics to stdout.
    pub skip_foreign_lines: bool,
    /// Connection attempts for socket transports.
    pub connect_attempts: u32,
    /// Pause between connection attempts.
    pub connect_interval: Duration,
    /// How long to wait for an incoming tracker connection.
    pub accept_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            skip_foreign_lines: true,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
        }
    }
}
