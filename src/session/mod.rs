//! Session state machine shared by both roles.
//!
//! A session owns one [`MessageStream`], the negotiated [`Metadata`] and the
//! current [`SessionState`]. The client and server drivers wrap it and add
//! their role-specific message handling.
//!
//! ```text
//! AwaitingHandshake ──hello──▶ Ready ──initialize──▶ InitializeTurn ──status──▶ Ready
//!                                │   ──frame───────▶ FrameTurn ──────status──▶ Ready
//!                                └──quit──▶ Terminated
//! ```
//!
//! Any error moves the session to `Failed`; from there only `quit` is
//! accepted.

mod capabilities;
mod config;
mod exchange;
mod metadata;
mod objects;

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, TraxError};
use crate::protocol::{Message, MessageKind, REASON_KEY};
use crate::transport::MessageStream;

pub use capabilities::{
    Capability, CapabilitySet, Channels, ImageFormats, RegionFormats, LIST_SEPARATOR,
};
pub use config::{
    SessionConfig, DEFAULT_ACCEPT_TIMEOUT, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_INTERVAL,
    DEFAULT_READ_BUFFER_SIZE,
};
pub use metadata::{
    Metadata, CHANNELS_KEY, DESCRIPTION_KEY, FAMILY_KEY, IMAGE_KEY, LEGACY_VERSION,
    MULTI_OBJECT_KEY, NAME_KEY, PROTOCOL_VERSION, REGION_KEY, RESERVED_PREFIX, VERSION_KEY,
};
pub use objects::{ObjectList, TrackedObject, OBJECT_PROPERTY_PREFIX};

pub(crate) use exchange::{
    check_regions, decode_images, encode_images, object_count_problem, prepare_objects,
    split_arguments,
};
pub(crate) use objects::{decode_objects, encode_objects};

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for the `hello` handshake.
    AwaitingHandshake,
    /// Idle between turns.
    Ready,
    /// An `initialize` request awaits its reply.
    InitializeTurn,
    /// A `frame` request awaits its reply.
    FrameTurn,
    /// `quit` was sent or received.
    Terminated,
    /// An error ended the session.
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AwaitingHandshake => "awaiting handshake",
            SessionState::Ready => "ready",
            SessionState::InitializeTurn => "initialize turn",
            SessionState::FrameTurn => "frame turn",
            SessionState::Terminated => "terminated",
            SessionState::Failed => "failed",
        }
    }

    /// No further requests or replies are possible.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Failed)
    }

    /// A request has been exchanged and its reply is outstanding.
    #[inline]
    pub fn in_turn(&self) -> bool {
        matches!(self, SessionState::InitializeTurn | SessionState::FrameTurn)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State, metadata and stream of one protocol session.
pub(crate) struct Session<R, W> {
    stream: MessageStream<R, W>,
    state: SessionState,
    metadata: Metadata,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: MessageStream<R, W>) -> Self {
        Self {
            stream,
            state: SessionState::AwaitingHandshake,
            metadata: Metadata::default(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub(crate) fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Store the negotiated metadata and become ready.
    pub(crate) fn establish(&mut self, metadata: Metadata) {
        tracing::debug!(
            name = %metadata.name,
            version = metadata.version,
            regions = %metadata.region_formats,
            images = %metadata.image_formats,
            channels = %metadata.channels,
            multi_object = metadata.multi_object,
            "Handshake complete"
        );
        self.metadata = metadata;
        self.state = SessionState::Ready;
    }

    pub(crate) fn transition(&mut self, state: SessionState) {
        tracing::trace!(from = %self.state, to = %state, "Session transition");
        self.state = state;
    }

    /// Fail with `ProtocolViolation` unless the state is one of `allowed`.
    pub(crate) fn ensure(&self, allowed: &[SessionState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(TraxError::violation(format!(
            "{} is not allowed in state '{}'",
            operation, self.state
        )))
    }

    pub(crate) async fn send(&mut self, message: &Message) -> Result<()> {
        self.stream.write_message(message).await
    }

    pub(crate) async fn receive(&mut self) -> Result<Message> {
        self.stream.read_message().await
    }

    /// Pass `result` through, failing the session on error.
    pub(crate) fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if !self.state.is_terminal() {
                tracing::error!(state = %self.state, "Session failed: {}", e);
                self.state = SessionState::Failed;
            }
        }
        result
    }

    /// Mark the session terminated after the peer sent `quit`.
    pub(crate) async fn close(&mut self) {
        self.state = SessionState::Terminated;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Shutdown after peer quit failed: {}", e);
        }
    }

    /// Send `quit` and release the writer.
    ///
    /// Does nothing if the session is already terminated. A failed session
    /// is terminated on a best-effort basis and never reports an error.
    pub(crate) async fn terminate(&mut self, reason: Option<&str>) -> Result<()> {
        let previous = self.state;
        if previous == SessionState::Terminated {
            return Ok(());
        }
        self.state = SessionState::Terminated;

        let mut message = Message::new(MessageKind::Quit);
        if let Some(reason) = reason {
            message = message.with_property(REASON_KEY, reason)?;
        }

        let sent = match self.stream.write_message(&message).await {
            Ok(()) => self.stream.shutdown().await,
            Err(e) => Err(e),
        };
        tracing::debug!(reason = reason.unwrap_or(""), "Session terminated");

        match sent {
            Err(e) if previous == SessionState::Failed => {
                tracing::debug!("Ignoring quit failure on a failed session: {}", e);
                Ok(())
            }
            other => other,
        }
    }
}
