//! Transport module - message streams and endpoint bootstrap.
//!
//! Provides:
//! - [`MessageStream`]: whole-message I/O over any `AsyncRead`/`AsyncWrite` pair
//! - [`Endpoint`]: TCP socket, inherited pipes or stdio, chosen from the environment
//! - [`listen`]/[`accept`]: the client side of a socket connection

mod bootstrap;
mod stream;

pub use bootstrap::{
    accept, connect, listen, BoxedReader, BoxedWriter, Endpoint, DEFAULT_HOST, IN_VAR, OUT_VAR,
    SOCKET_VAR,
};
pub use stream::MessageStream;
