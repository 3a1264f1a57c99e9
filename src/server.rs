//! Server role: the tracker side of a session.
//!
//! The [`ServerBuilder`] carries the tracker [`Metadata`]. Starting it sends
//! `hello` and leaves the [`Server`] ready. The tracker then loops:
//! [`wait`](Server::wait) for a request, compute, and answer with
//! [`status`](Server::status) until a [`Request::Quit`] arrives.
//!
//! # Example
//!
//! ```no_run
//! use trax_protocol::codec::{ImageKind, Properties, RegionKind};
//! use trax_protocol::session::{ImageFormats, Metadata, ObjectList, RegionFormats};
//! use trax_protocol::{Request, Server};
//!
//! #[tokio::main]
//! async fn main() -> trax_protocol::Result<()> {
//!     let metadata = Metadata::new(
//!         RegionFormats::of(&[RegionKind::Rectangle]),
//!         ImageFormats::of(&[ImageKind::Path]),
//!     );
//!     let mut server = Server::builder(metadata).start_from_env().await?;
//!
//!     let mut current = ObjectList::new();
//!     loop {
//!         match server.wait().await? {
//!             Request::Initialize { objects, .. } => current = objects,
//!             Request::Frame { .. } => {}
//!             Request::Quit { .. } => break,
//!         }
//!         server.status(&current, &Properties::new()).await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{ImageList, Properties};
use crate::error::{Result, TraxError};
use crate::protocol::{Message, MessageKind, REASON_KEY};
use crate::session::{
    check_regions, decode_images, decode_objects, encode_objects, object_count_problem,
    split_arguments, Metadata, ObjectList, Session, SessionConfig, SessionState,
};
use crate::transport::{BoxedReader, BoxedWriter, Endpoint, MessageStream};

/// Builder for configuring and starting a server.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    metadata: Metadata,
    config: SessionConfig,
}

impl ServerBuilder {
    /// Create a builder advertising `metadata`.
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            config: SessionConfig::default(),
        }
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

    /// Skip input that is not a protocol line.
    ///
    /// Default: true
    pub fn skip_foreign_lines(mut self, skip: bool) -> Self {
        self.config.skip_foreign_lines = skip;
        self
    }

    /// Set the number of attempts to connect to a socket client.
    ///
    /// Default: 10
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.config.connect_attempts = attempts;
        self
    }

    /// Set the pause between connection attempts.
    ///
    /// Default: 1 second
    pub fn connect_interval(mut self, interval: Duration) -> Self {
        self.config.connect_interval = interval;
        self
    }

    /// Send `hello` over an established transport.
    pub async fn start<R, W>(self, reader: R, writer: W) -> Result<Server<R, W>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = Session::new(MessageStream::with_config(reader, writer, &self.config));
        let result = announce(&mut session, self.metadata).await;
        session.settle(result)?;
        Ok(Server { session })
    }

    /// Open the transport named by the environment, then send `hello`.
    ///
    /// See [`Endpoint::from_env`] for the variables consulted.
    pub async fn start_from_env(self) -> Result<Server<BoxedReader, BoxedWriter>> {
        let endpoint = Endpoint::from_env()?;
        tracing::debug!(?endpoint, "Opening tracker transport");
        let (reader, writer) = endpoint.open(&self.config).await?;
        self.start(reader, writer).await
    }
}

async fn announce<R, W>(session: &mut Session<R, W>, metadata: Metadata) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = Message::from_parts(MessageKind::Hello, Vec::new(), metadata.to_properties()?);
    session.send(&hello).await?;
    session.establish(metadata);
    Ok(())
}

/// A request received by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Start tracking `objects`.
    Initialize {
        images: ImageList,
        objects: ObjectList,
        properties: Properties,
    },
    /// Next frame. `objects` holds objects added in a multi-object session.
    Frame {
        images: ImageList,
        objects: ObjectList,
        properties: Properties,
    },
    /// The client ended the session.
    Quit { properties: Properties },
}

impl Request {
    /// Termination reason of a quit request.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Request::Quit { properties } => properties.get(REASON_KEY),
            _ => None,
        }
    }
}

/// A started server session.
pub struct Server<R, W> {
    session: Session<R, W>,
}

impl Server<BoxedReader, BoxedWriter> {
    /// Create a new server builder.
    pub fn builder(metadata: Metadata) -> ServerBuilder {
        ServerBuilder::new(metadata)
    }
}

impl<R, W> Server<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Send `hello` with default configuration.
    pub async fn start(metadata: Metadata, reader: R, writer: W) -> Result<Self> {
        ServerBuilder::new(metadata).start(reader, writer).await
    }

    /// Metadata advertised in `hello`.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        self.session.metadata()
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Wait for the next request.
    ///
    /// # Errors
    ///
    /// - `ProtocolViolation` if a previous request is still unanswered, or the
    ///   client sent `hello` or `status`
    /// - `UnsupportedValue` for images or regions outside the advertised formats
    /// - framing and transport errors
    pub async fn wait(&mut self) -> Result<Request> {
        let result = self.next_request().await;
        self.session.settle(result)
    }

    /// Answer the current request.
    ///
    /// Per-object properties are sent along with each region.
    pub async fn status(&mut self, objects: &ObjectList, properties: &Properties) -> Result<()> {
        let result = self.reply(objects, properties).await;
        self.session.settle(result)
    }

    /// End the session.
    ///
    /// Calling this on a terminated session does nothing.
    pub async fn quit(&mut self, reason: Option<&str>) -> Result<()> {
        self.session.terminate(reason).await
    }

    async fn next_request(&mut self) -> Result<Request> {
        self.session.ensure(&[SessionState::Ready], "wait")?;

        let (kind, arguments, mut properties) = self.session.receive().await?.into_parts();
        match kind {
            MessageKind::Initialize | MessageKind::Frame => {
                let metadata = self.session.metadata();
                let (image_tokens, region_tokens) = split_arguments(&arguments, metadata)?;
                let images = decode_images(image_tokens, metadata)?;
                let objects = decode_objects(region_tokens, &mut properties)?;
                check_regions(&objects, &metadata.region_formats)?;
                if let Some(problem) =
                    object_count_problem(kind, objects.len(), metadata.multi_object)
                {
                    return Err(TraxError::malformed(problem));
                }

                tracing::debug!(%kind, objects = objects.len(), "Request received");
                if kind == MessageKind::Initialize {
                    self.session.transition(SessionState::InitializeTurn);
                    Ok(Request::Initialize {
                        images,
                        objects,
                        properties,
                    })
                } else {
                    self.session.transition(SessionState::FrameTurn);
                    Ok(Request::Frame {
                        images,
                        objects,
                        properties,
                    })
                }
            }
            MessageKind::Quit => {
                if !arguments.is_empty() {
                    return Err(TraxError::malformed(format!(
                        "quit carries {} positional arguments",
                        arguments.len()
                    )));
                }
                tracing::debug!(
                    reason = properties.get(REASON_KEY).unwrap_or(""),
                    "Client quit"
                );
                self.session.close().await;
                Ok(Request::Quit { properties })
            }
            MessageKind::Hello | MessageKind::Status => Err(TraxError::violation(format!(
                "client sent '{}'",
                kind
            ))),
        }
    }

    async fn reply(&mut self, objects: &ObjectList, properties: &Properties) -> Result<()> {
        self.session.ensure(
            &[SessionState::InitializeTurn, SessionState::FrameTurn],
            "status",
        )?;
        let multi_object = self.session.metadata().multi_object;
        if let Some(problem) = object_count_problem(MessageKind::Status, objects.len(), multi_object)
        {
            return Err(TraxError::unsupported(problem));
        }

        let mut arguments = Vec::with_capacity(objects.len());
        let mut message_properties = properties.clone();
        encode_objects(objects, &mut arguments, &mut message_properties)?;

        let message = Message::from_parts(MessageKind::Status, arguments, message_properties);
        self.session.send(&message).await?;
        self.session.transition(SessionState::Ready);
        tracing::debug!(objects = objects.len(), "Status sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Channel, Image, ImageKind, Region, RegionKind};
    use crate::session::{ImageFormats, RegionFormats};
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::io::{ReadHalf, WriteHalf};

    type TestServer = Server<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    /// Scripted harness: writes raw lines and reads the tracker's lines.
    struct Harness {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Harness {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }
    }

    async fn start(metadata: Metadata) -> (TestServer, Harness) {
        let (local, remote) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let (remote_reader, remote_writer) = tokio::io::split(remote);
        let server = Server::start(metadata, reader, writer).await.unwrap();
        let harness = Harness {
            reader: BufReader::new(remote_reader),
            writer: remote_writer,
        };
        (server, harness)
    }

    #[tokio::test]
    async fn test_hello_is_sent_first() {
        let metadata = Metadata::default().with_name("dummy");
        let (server, mut harness) = start(metadata).await;

        assert_eq!(server.state(), SessionState::Ready);
        assert_eq!(
            harness.line().await,
            "@@TRAX:hello \"trax.channels=color\" \"trax.description=\" \"trax.family=\" \
             \"trax.image=path\" \"trax.multiobject=false\" \"trax.name=dummy\" \
             \"trax.region=rectangle\" \"trax.version=3\"\n"
        );
    }

    #[tokio::test]
    async fn test_initialize_status_frame() {
        let (mut server, mut harness) = start(Metadata::default()).await;
        harness.line().await;

        harness
            .send("@@TRAX:initialize \"file:///seq 1/1.jpg\" 10,10,50,50 \"tracker.mode=fast\"\n")
            .await;
        let Request::Initialize {
            images,
            objects,
            properties,
        } = server.wait().await.unwrap()
        else {
            panic!("expected initialize");
        };
        assert_eq!(images.get(Channel::Color), Some(&Image::path("/seq 1/1.jpg")));
        assert_eq!(
            objects.first_region(),
            Some(&Region::rectangle(10.0, 10.0, 50.0, 50.0))
        );
        assert_eq!(properties.get("tracker.mode"), Some("fast"));
        assert_eq!(server.state(), SessionState::InitializeTurn);

        server
            .status(
                &ObjectList::from(Region::rectangle(12.0, 11.0, 50.0, 50.0)),
                &Properties::new(),
            )
            .await
            .unwrap();
        assert_eq!(harness.line().await, "@@TRAX:status 12,11,50,50\n");

        harness.send("@@TRAX:frame file:///seq/2.jpg\n").await;
        let request = server.wait().await.unwrap();
        assert!(matches!(request, Request::Frame { ref objects, .. } if objects.is_empty()));
        assert_eq!(server.state(), SessionState::FrameTurn);
    }

    #[tokio::test]
    async fn test_status_outside_turn() {
        let (mut server, _harness) = start(Metadata::default()).await;
        let err = server
            .status(&ObjectList::from(Region::special(0)), &Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TraxError::ProtocolViolation(_)));
        assert_eq!(server.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_wait_inside_turn() {
        let (mut server, mut harness) = start(Metadata::default()).await;
        harness.send("@@TRAX:frame file:///a.jpg\n").await;
        server.wait().await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(matches!(err, TraxError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_client_status_is_violation() {
        let (mut server, mut harness) = start(Metadata::default()).await;
        harness.send("@@TRAX:status 1,2,3,4\n").await;

        let err = server.wait().await.unwrap_err();
        assert!(matches!(err, TraxError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_unsupported_region() {
        let (mut server, mut harness) = start(Metadata::default()).await;
        harness
            .send("@@TRAX:initialize file:///a.jpg 1,1,5,1,3,4\n")
            .await;

        let err = server.wait().await.unwrap_err();
        assert!(matches!(err, TraxError::UnsupportedValue(_)));
    }

    #[tokio::test]
    async fn test_missing_image_argument() {
        let metadata = Metadata::new(
            RegionFormats::of(&[RegionKind::Rectangle]),
            ImageFormats::of(&[ImageKind::Path]),
        )
        .with_channels([Channel::Color, Channel::Depth].into_iter().collect());
        let (mut server, mut harness) = start(metadata).await;
        harness.send("@@TRAX:frame file:///a.jpg\n").await;

        let err = server.wait().await.unwrap_err();
        assert!(matches!(err, TraxError::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn test_multi_object_status() {
        let metadata = Metadata::default().with_multi_object(true);
        let (mut server, mut harness) = start(metadata).await;
        harness.line().await;

        harness
            .send("@@TRAX:initialize file:///a.jpg 1,1,2,2 5,5,2,2 \"trax.object.1.label=dog\"\n")
            .await;
        let Request::Initialize { objects, .. } = server.wait().await.unwrap() else {
            panic!("expected initialize");
        };
        assert_eq!(objects.len(), 2);
        assert_eq!(objects.get(1).unwrap().properties.get("label"), Some("dog"));

        server.status(&objects, &Properties::new()).await.unwrap();
        assert_eq!(
            harness.line().await,
            "@@TRAX:status 1,1,2,2 5,5,2,2 \"trax.object.1.label=dog\"\n"
        );
    }

    #[tokio::test]
    async fn test_client_quit() {
        let (mut server, mut harness) = start(Metadata::default()).await;
        harness
            .send("@@TRAX:quit \"trax.reason=evaluation complete\"\n")
            .await;

        let request = server.wait().await.unwrap();
        assert_eq!(request.reason(), Some("evaluation complete"));
        assert_eq!(server.state(), SessionState::Terminated);

        assert!(server.wait().await.is_err());
        server.quit(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_quit_with_arguments_is_malformed() {
        let (mut server, mut harness) = start(Metadata::default()).await;
        harness.send("@@TRAX:quit 1,2,3,4\n").await;

        let err = server.wait().await.unwrap_err();
        assert!(matches!(err, TraxError::MalformedMessage(_)));
    }
}
