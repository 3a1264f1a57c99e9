//! Message stream over a byte transport.
//!
//! Pairs a reader and a writer with a [`LineBuffer`]. Reading suspends only
//! while no complete line is buffered; writing loops until the whole encoded
//! line is accepted, then flushes.
//!
//! # Example
//!
//! ```
//! use trax_protocol::protocol::{Message, MessageKind};
//! use trax_protocol::transport::MessageStream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> trax_protocol::Result<()> {
//! let (a, b) = tokio::io::duplex(1024);
//! let (a_read, a_write) = tokio::io::split(a);
//! let (b_read, b_write) = tokio::io::split(b);
//! let mut left = MessageStream::new(a_read, a_write);
//! let mut right = MessageStream::new(b_read, b_write);
//!
//! left.write_message(&Message::new(MessageKind::Hello)).await?;
//! assert_eq!(right.read_message().await?.kind(), MessageKind::Hello);
//! # Ok(())
//! # }
//! ```

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TraxError};
use crate::protocol::{encode_message, is_protocol_line, parse_message, LineBuffer, Message};
use crate::session::SessionConfig;

/// Longest prefix of a line shown in log output.
const LOG_PREVIEW: usize = 200;

/// Reads and writes whole protocol messages.
pub struct MessageStream<R, W> {
    reader: R,
    writer: W,
    buffer: LineBuffer,
    chunk: Vec<u8>,
    skip_foreign_lines: bool,
    eof: bool,
}

impl<R, W> MessageStream<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a stream with default configuration.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, &SessionConfig::default())
    }

    /// Create a stream with the given configuration.
    pub fn with_config(reader: R, writer: W, config: &SessionConfig) -> Self {
        Self {
            reader,
            writer,
            buffer: LineBuffer::with_max_line_length(config.max_line_length),
            chunk: vec![0u8; config.read_buffer_size.max(1)],
            skip_foreign_lines: config.skip_foreign_lines,
            eof: false,
        }
    }

    /// Read the next message.
    ///
    /// # Errors
    ///
    /// - `TransportClosed` if the stream ends with nothing buffered
    /// - `MalformedMessage` for lines that do not parse
    /// - `Io` for transport failures
    pub async fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(line) = self.buffer.next_line()? {
                match self.accept_line(&line)? {
                    Some(message) => return Ok(message),
                    None => continue,
                }
            }

            if self.eof {
                return match self.buffer.take_remainder()? {
                    Some(line) => self.accept_line(&line)?.ok_or(TraxError::TransportClosed),
                    None => Err(TraxError::TransportClosed),
                };
            }

            let n = self.reader.read(&mut self.chunk).await.map_err(map_io)?;
            if n == 0 {
                self.eof = true;
                continue;
            }
            self.buffer.push(&self.chunk[..n])?;
        }
    }

    /// Write one message and flush it.
    ///
    /// Partial writes are retried until the whole line is written.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let line = encode_message(message);
        tracing::trace!(target: "trax::wire", ">> {}", preview(line.trim_end_matches('\n')));

        let bytes = line.as_bytes();
        let mut written = 0;
        while written < bytes.len() {
            let n = self.writer.write(&bytes[written..]).await.map_err(map_io)?;
            if n == 0 {
                return Err(TraxError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned 0",
                )));
            }
            written += n;
        }

        self.writer.flush().await.map_err(map_io)?;
        Ok(())
    }

    /// Shut down the writing half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(map_io)
    }

    /// Recover the transport halves.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn accept_line(&self, line: &str) -> Result<Option<Message>> {
        tracing::trace!(target: "trax::wire", "<< {}", preview(line));

        if is_protocol_line(line) {
            return parse_message(line).map(Some);
        }
        if !self.skip_foreign_lines {
            return Err(TraxError::malformed(format!(
                "line without protocol prefix: '{}'",
                preview(line)
            )));
        }
        if !line.trim().is_empty() {
            tracing::warn!("Skipping non-protocol line: {}", preview(line));
        }
        Ok(None)
    }
}

/// A vanished peer surfaces as `TransportClosed` rather than a raw I/O error.
fn map_io(error: io::Error) -> TraxError {
    match error.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => TraxError::TransportClosed,
        _ => TraxError::Io(error),
    }
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(LOG_PREVIEW) {
        Some((index, _)) => &line[..index],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    type HalfStream = MessageStream<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair(config: &SessionConfig) -> (HalfStream, DuplexStream) {
        let (local, remote) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        (MessageStream::with_config(reader, writer, config), remote)
    }

    /// Writer that accepts at most `limit` bytes per call.
    struct TrickleWriter {
        written: Vec<u8>,
        limit: usize,
        flushed: bool,
    }

    impl AsyncWrite for TrickleWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.flushed = true;
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_fragmented_message() {
        let (mut stream, mut remote) = pair(&SessionConfig::default());

        let writer = tokio::spawn(async move {
            for piece in [&b"@@TRAX:sta"[..], b"tus \"10,10", b",5,5\" \"trax.confidence=0.9\"\n"] {
                remote.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
            remote
        });

        let message = stream.read_message().await.unwrap();
        assert_eq!(message.kind(), MessageKind::Status);
        assert_eq!(message.arguments(), ["10,10,5,5"]);
        assert_eq!(message.properties().get("trax.confidence"), Some("0.9"));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_two_messages_in_one_read() {
        let (mut stream, mut remote) = pair(&SessionConfig::default());
        remote
            .write_all(b"@@TRAX:hello\n@@TRAX:quit \"trax.reason=bye\"\n")
            .await
            .unwrap();

        assert_eq!(stream.read_message().await.unwrap().kind(), MessageKind::Hello);
        let quit = stream.read_message().await.unwrap();
        assert_eq!(quit.kind(), MessageKind::Quit);
        assert_eq!(quit.properties().get("trax.reason"), Some("bye"));
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (mut stream, remote) = pair(&SessionConfig::default());
        drop(remote);
        assert!(matches!(
            stream.read_message().await,
            Err(TraxError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_unterminated_final_line() {
        let (mut stream, mut remote) = pair(&SessionConfig::default());
        remote.write_all(b"@@TRAX:quit").await.unwrap();
        drop(remote);

        assert_eq!(stream.read_message().await.unwrap().kind(), MessageKind::Quit);
        assert!(matches!(
            stream.read_message().await,
            Err(TraxError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_foreign_lines_skipped() {
        let (mut stream, mut remote) = pair(&SessionConfig::default());
        remote
            .write_all(b"Loading model...\n\n@@TRAX:hello\n")
            .await
            .unwrap();

        assert_eq!(stream.read_message().await.unwrap().kind(), MessageKind::Hello);
    }

    #[tokio::test]
    async fn test_foreign_lines_rejected() {
        let config = SessionConfig {
            skip_foreign_lines: false,
            ..SessionConfig::default()
        };
        let (mut stream, mut remote) = pair(&config);
        remote.write_all(b"Loading model...\n").await.unwrap();

        assert!(matches!(
            stream.read_message().await,
            Err(TraxError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_malformed() {
        let (mut stream, mut remote) = pair(&SessionConfig::default());
        remote.write_all(b"@@TRAX:launch\n").await.unwrap();

        assert!(matches!(
            stream.read_message().await,
            Err(TraxError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_small_read_buffer() {
        let config = SessionConfig {
            read_buffer_size: 3,
            ..SessionConfig::default()
        };
        let (mut stream, mut remote) = pair(&config);
        remote
            .write_all(b"@@TRAX:frame \"file:///a b.jpg\"\n")
            .await
            .unwrap();

        let message = stream.read_message().await.unwrap();
        assert_eq!(message.arguments(), ["file:///a b.jpg"]);
    }

    #[tokio::test]
    async fn test_partial_writes_are_completed() {
        let writer = TrickleWriter {
            written: Vec::new(),
            limit: 5,
            flushed: false,
        };
        let mut stream = MessageStream::new(tokio::io::empty(), writer);

        let message = Message::new(MessageKind::Quit)
            .with_property("trax.reason", "evaluation complete")
            .unwrap();
        stream.write_message(&message).await.unwrap();

        let (_, writer) = stream.into_inner();
        assert!(writer.flushed);
        assert_eq!(
            writer.written,
            b"@@TRAX:quit \"trax.reason=evaluation complete\"\n"
        );
    }

    #[tokio::test]
    async fn test_zero_write_is_an_error() {
        let writer = TrickleWriter {
            written: Vec::new(),
            limit: 0,
            flushed: false,
        };
        let mut stream = MessageStream::new(tokio::io::empty(), writer);

        let err = stream
            .write_message(&Message::new(MessageKind::Hello))
            .await
            .unwrap_err();
        assert!(matches!(err, TraxError::Io(ref e) if e.kind() == io::ErrorKind::WriteZero));
    }

    #[tokio::test]
    async fn test_write_to_closed_peer() {
        let (mut stream, remote) = pair(&SessionConfig::default());
        drop(remote);

        let result = stream.write_message(&Message::new(MessageKind::Hello)).await;
        assert!(matches!(result, Err(TraxError::TransportClosed)));
    }
}
