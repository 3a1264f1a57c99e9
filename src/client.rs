//! Client role: the evaluation harness side of a session.
//!
//! The [`ClientBuilder`] configures the stream and performs the handshake.
//! The [`Client`] then drives the request/reply cycle:
//! 1. Read `hello` and store the tracker metadata
//! 2. Send `initialize`, wait for `status` or `quit`
//! 3. Send `frame` for every following image, wait for `status` or `quit`
//! 4. Send `quit`
//!
//! # Example
//!
//! ```no_run
//! use trax_protocol::codec::{Image, ImageList, Properties, Region};
//! use trax_protocol::session::ObjectList;
//! use trax_protocol::{transport, Client, Response};
//!
//! #[tokio::main]
//! async fn main() -> trax_protocol::Result<()> {
//!     let listener = transport::listen(9090).await?;
//!     let mut client = Client::builder().accept(&listener).await?;
//!
//!     let images = ImageList::from(Image::path("/data/00000001.jpg"));
//!     let objects = ObjectList::from(Region::rectangle(10.0, 10.0, 50.0, 50.0));
//!     if let Response::Status { objects, elapsed, .. } =
//!         client.initialize(&images, &objects, &Properties::new()).await?
//!     {
//!         println!("{:?} after {:?}", objects.first_region(), elapsed);
//!     }
//!
//!     client.quit(Some("evaluation complete")).await
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use crate::codec::{ImageList, Properties};
use crate::error::{Result, TraxError};
use crate::protocol::{Message, MessageKind, REASON_KEY};
use crate::session::{
    decode_objects, encode_images, encode_objects, object_count_problem, prepare_objects,
    Metadata, ObjectList, Session, SessionConfig, SessionState,
};
use crate::transport::{self, MessageStream};

/// Builder for configuring and connecting a client.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: SessionConfig,
}

impl ClientBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the longest accepted line.
    ///
    /// Default: 64 MiB
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// Set the size of each transport read.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Skip tracker output that is not a protocol line.
    ///
    /// Default: true
    pub fn skip_foreign_lines(mut self, skip: bool) -> Self {
        self.config.skip_foreign_lines = skip;
        self
    }

    /// Set how long [`accept`](Self::accept) waits for a tracker.
    ///
    /// Default: 30 seconds
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.config.accept_timeout = timeout;
        self
    }

    /// Perform the handshake over an established transport.
    ///
    /// Waits for the tracker's `hello` and stores its metadata.
    pub async fn connect<R, W>(self, reader: R, writer: W) -> Result<Client<R, W>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = Session::new(MessageStream::with_config(reader, writer, &self.config));
        let result = handshake(&mut session).await;
        session.settle(result)?;
        Ok(Client { session })
    }

    /// Accept a tracker connection on `listener`, then perform the handshake.
    pub async fn accept(
        self,
        listener: &TcpListener,
    ) -> Result<Client<OwnedReadHalf, OwnedWriteHalf>> {
        let stream = transport::accept(listener, self.config.accept_timeout).await?;
        let (reader, writer) = stream.into_split();
        self.connect(reader, writer).await
    }
}

async fn handshake<R, W>(session: &mut Session<R, W>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (kind, arguments, properties) = session.receive().await?.into_parts();
    if kind != MessageKind::Hello {
        return Err(TraxError::violation(format!(
            "expected hello, received '{}'",
            kind
        )));
    }
    if !arguments.is_empty() {
        tracing::debug!(count = arguments.len(), "Ignoring positional arguments on hello");
    }

    let metadata = Metadata::from_properties(&properties)?;
    session.establish(metadata);
    Ok(())
}

/// Reply to an `initialize` or `frame` request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The tracker reported its state.
    Status {
        objects: ObjectList,
        properties: Properties,
        /// Time from sending the request to decoding this reply.
        elapsed: Duration,
    },
    /// The tracker ended the session.
    Quit {
        reason: Option<String>,
        properties: Properties,
    },
}

impl Response {
    /// Objects of a status reply.
    pub fn objects(&self) -> Option<&ObjectList> {
        match self {
            Response::Status { objects, .. } => Some(objects),
            Response::Quit { .. } => None,
        }
    }

    #[inline]
    pub fn is_quit(&self) -> bool {
        matches!(self, Response::Quit { .. })
    }
}

/// A connected client session.
pub struct Client<R, W> {
    session: Session<R, W>,
}

impl Client<OwnedReadHalf, OwnedWriteHalf> {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Perform the handshake with default configuration.
    pub async fn connect(reader: R, writer: W) -> Result<Self> {
        ClientBuilder::new().connect(reader, writer).await
    }

    /// Metadata the tracker advertised.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        self.session.metadata()
    }

    /// Whether the tracker accepts several objects per message.
    #[inline]
    pub fn supports_multi_object(&self) -> bool {
        self.session.metadata().supports_multi_object()
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Start tracking `objects` in `images`.
    ///
    /// Object regions of kinds the tracker does not accept are converted
    /// first.
    ///
    /// # Errors
    ///
    /// - `UnsupportedValue` if an image or region cannot be expressed in
    ///   the negotiated formats, or the object count does not fit the session
    /// - `ProtocolViolation` outside the ready state or for an unexpected reply
    /// - framing and transport errors while waiting for the reply
    pub async fn initialize(
        &mut self,
        images: &ImageList,
        objects: &ObjectList,
        properties: &Properties,
    ) -> Result<Response> {
        let result = self
            .request(MessageKind::Initialize, images, Some(objects), properties)
            .await;
        self.session.settle(result)
    }

    /// Send the next frame.
    ///
    /// `objects` adds new objects and needs a multi-object session.
    pub async fn frame(
        &mut self,
        images: &ImageList,
        properties: &Properties,
        objects: Option<&ObjectList>,
    ) -> Result<Response> {
        let result = self
            .request(MessageKind::Frame, images, objects, properties)
            .await;
        self.session.settle(result)
    }

    /// End the session.
    ///
    /// Calling this on a terminated session does nothing.
    pub async fn quit(&mut self, reason: Option<&str>) -> Result<()> {
        self.session.terminate(reason).await
    }

    async fn request(
        &mut self,
        kind: MessageKind,
        images: &ImageList,
        objects: Option<&ObjectList>,
        properties: &Properties,
    ) -> Result<Response> {
        self.session.ensure(&[SessionState::Ready], kind.as_str())?;

        let metadata = self.session.metadata();
        let count = objects.map_or(0, ObjectList::len);
        if let Some(problem) = object_count_problem(kind, count, metadata.multi_object) {
            return Err(TraxError::unsupported(problem));
        }

        let mut arguments = Vec::new();
        let mut message_properties = properties.clone();
        encode_images(images, metadata, &mut arguments)?;
        if let Some(objects) = objects {
            let prepared = prepare_objects(objects, &metadata.region_formats)?;
            encode_objects(&prepared, &mut arguments, &mut message_properties)?;
        }

        let message = Message::from_parts(kind, arguments, message_properties);
        self.session.send(&message).await?;
        let started = Instant::now();
        self.session.transition(match kind {
            MessageKind::Initialize => SessionState::InitializeTurn,
            _ => SessionState::FrameTurn,
        });
        tracing::debug!(%kind, objects = count, "Request sent");

        let reply = self.session.receive().await?;
        self.reply(reply, started).await
    }

    async fn reply(&mut self, message: Message, started: Instant) -> Result<Response> {
        let (kind, arguments, mut properties) = message.into_parts();
        match kind {
            MessageKind::Status => {
                let objects = decode_objects(&arguments, &mut properties)?;
                let multi_object = self.session.metadata().multi_object;
                if let Some(problem) = object_count_problem(kind, objects.len(), multi_object) {
                    return Err(TraxError::malformed(problem));
                }
                let elapsed = started.elapsed();

                self.session.transition(SessionState::Ready);
                tracing::debug!(objects = objects.len(), ?elapsed, "Status received");
                Ok(Response::Status {
                    objects,
                    properties,
                    elapsed,
                })
            }
            MessageKind::Quit => {
                let reason = properties.get(REASON_KEY).map(str::to_string);
                tracing::debug!(reason = reason.as_deref().unwrap_or(""), "Tracker quit");
                self.session.close().await;
                Ok(Response::Quit { reason, properties })
            }
            other => Err(TraxError::violation(format!(
                "unexpected '{}' reply to a request",
                other
            ))),
        }
    }
}
