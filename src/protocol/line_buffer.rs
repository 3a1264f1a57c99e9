//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Bytes are appended as they
//! arrive from the transport; complete `\n`-terminated lines are split off the
//! front one at a time, and any trailing partial line stays buffered for the
//! next read.
//!
//! # Example
//!
//! ```
//! use trax_protocol::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! buffer.push(b"@@TRAX:hello\n@@TRAX:sta").unwrap();
//! assert_eq!(buffer.next_line().unwrap().as_deref(), Some("@@TRAX:hello"));
//! assert_eq!(buffer.next_line().unwrap(), None);
//!
//! buffer.push(b"tus 1,2,3,4\n").unwrap();
//! assert_eq!(buffer.next_line().unwrap().as_deref(), Some("@@TRAX:status 1,2,3,4"));
//! ```

use bytes::BytesMut;

use crate::error::{Result, TraxError};

/// Default maximum line length (64 MiB). In-memory images travel inline.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

/// Initial buffer capacity.
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Number of leading bytes already known to contain no newline.
    scanned: usize,
    /// Length of the trailing partial line.
    partial: usize,
    /// Maximum allowed line length, excluding the newline.
    max_line_length: usize,
}

impl LineBuffer {
    /// Create a new line buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line buffer with a custom maximum line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY.min(max_line_length + 1)),
            scanned: 0,
            partial: 0,
            max_line_length,
        }
    }

    /// Append bytes read from the transport.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the pending partial line grows past the
    /// maximum line length.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.partial = match data.iter().rposition(|&b| b == b'\n') {
            Some(index) => data.len() - index - 1,
            None => self.partial + data.len(),
        };

        if self.partial > self.max_line_length {
            return Err(line_too_long(self.partial, self.max_line_length));
        }
        Ok(())
    }

    /// Split off the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` if no complete line is buffered yet. A trailing
    /// `\r` is stripped.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buffer.len();
            return Ok(None);
        };

        let end = self.scanned + offset;
        let line = self.buffer.split_to(end + 1);
        self.scanned = 0;

        if end > self.max_line_length {
            return Err(line_too_long(end, self.max_line_length));
        }

        decode_line(&line[..end]).map(Some)
    }

    /// Take whatever partial line remains once the transport has ended.
    ///
    /// Returns `Ok(None)` if the buffer is empty.
    pub fn take_remainder(&mut self) -> Result<Option<String>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let rest = self.buffer.split();
        self.scanned = 0;
        self.partial = 0;
        decode_line(&rest).map(Some)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.partial = 0;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| TraxError::malformed("line is not valid UTF-8"))
}

fn line_too_long(length: usize, max: usize) -> TraxError {
    TraxError::malformed(format!(
        "line length {} exceeds maximum {}",
        length, max
    ))
}
