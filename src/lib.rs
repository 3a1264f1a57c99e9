//! # trax-protocol
//!
//! Rust implementation of the TraX (Tracking eXchange) protocol.
//!
//! The protocol connects an evaluation harness (the client) with a visual
//! object tracker (the server) over a byte stream: inherited pipes, stdio or
//! a TCP socket. Every message is one line of text:
//!
//! ```text
//! @@TRAX:<kind> [argument ...] ["key=value" ...]
//! ```
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): line framing, quoting and message grammar
//! - **Codec** ([`codec`]): regions, image references and property maps
//! - **Session** ([`session`]): negotiated metadata and the legal message order
//! - **Transport** ([`transport`]): async message streams and endpoint bootstrap
//!
//! ## Platform support
//!
//! Inherited pipe descriptors (`TRAX_IN`/`TRAX_OUT`) are only available on
//! Unix, where [`transport::Endpoint::open`] adopts them with
//! `File::from_raw_fd`. That is the only `unsafe` code in the crate. On other
//! platforms such an endpoint fails with [`TraxError::Config`]; sockets and
//! stdio work everywhere.
//!
//! ## Example
//!
//! ```
//! use trax_protocol::codec::{Image, ImageList, Properties, Region};
//! use trax_protocol::session::{Metadata, ObjectList};
//! use trax_protocol::{Client, Request, Response, Server};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> trax_protocol::Result<()> {
//! let (harness, tracker) = tokio::io::duplex(4096);
//! let (harness_read, harness_write) = tokio::io::split(harness);
//! let (tracker_read, tracker_write) = tokio::io::split(tracker);
//!
//! let mut server = Server::start(Metadata::default(), tracker_read, tracker_write).await?;
//! let mut client = Client::connect(harness_read, harness_write).await?;
//!
//! let images = ImageList::from(Image::path("/data/00000001.jpg"));
//! let objects = ObjectList::from(Region::rectangle(10.0, 10.0, 50.0, 50.0));
//!
//! let properties = Properties::new();
//! let (response, request) = tokio::join!(
//!     client.initialize(&images, &objects, &properties),
//!     async {
//!         let request = server.wait().await?;
//!         if let Request::Initialize { objects, .. } = &request {
//!             server.status(objects, &Properties::new()).await?;
//!         }
//!         Ok::<_, trax_protocol::TraxError>(request)
//!     },
//! );
//! request?;
//! assert!(matches!(response?, Response::Status { .. }));
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

mod client;
mod server;

pub use client::{Client, ClientBuilder, Response};
pub use error::{Result, TraxError};
pub use server::{Request, Server, ServerBuilder};
