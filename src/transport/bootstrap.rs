//! Environment-selected transports.
//!
//! A tracker is launched by its client with the transport described in the
//! process environment:
//!
//! - `TRAX_SOCKET=<port>` or `<host>:<port>`: connect to the client over TCP
//! - `TRAX_IN=<fd>` and `TRAX_OUT=<fd>`: inherited pipe descriptors (Unix)
//! - neither: stdin/stdout
//!
//! The client side listens with [`listen`] and waits for the tracker with
//! [`accept`].
//!
//! # Example
//!
//! ```
//! use trax_protocol::transport::Endpoint;
//!
//! let endpoint = Endpoint::from_vars(Some("9090".into()), None, None).unwrap();
//! assert_eq!(
//!     endpoint,
//!     Endpoint::Socket { host: "127.0.0.1".into(), port: 9090 }
//! );
//! ```

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Result, TraxError};
use crate::session::SessionConfig;

/// Port (or `host:port`) of the client to connect to.
pub const SOCKET_VAR: &str = "TRAX_SOCKET";
/// Inherited descriptor to read requests from.
pub const IN_VAR: &str = "TRAX_IN";
/// Inherited descriptor to write replies to.
pub const OUT_VAR: &str = "TRAX_OUT";
/// Host used when `TRAX_SOCKET` names only a port.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Type-erased reading half.
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
/// Type-erased writing half.
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Where a tracker finds its client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Standard input and output.
    Stdio,
    /// A pair of inherited file descriptors.
    Pipes { input: i32, output: i32 },
    /// A TCP connection to the client.
    Socket { host: String, port: u16 },
}

impl Endpoint {
    /// Read the endpoint from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(SOCKET_VAR).ok(),
            std::env::var(IN_VAR).ok(),
            std::env::var(OUT_VAR).ok(),
        )
    }

    /// Build the endpoint from raw variable values.
    ///
    /// # Errors
    ///
    /// Returns `Config` for unparsable values or when only one of the pipe
    /// descriptors is given.
    pub fn from_vars(
        socket: Option<String>,
        input: Option<String>,
        output: Option<String>,
    ) -> Result<Self> {
        if let Some(socket) = socket.filter(|value| !value.trim().is_empty()) {
            return parse_socket(socket.trim());
        }

        match (input, output) {
            (Some(input), Some(output)) => Ok(Endpoint::Pipes {
                input: parse_fd(IN_VAR, &input)?,
                output: parse_fd(OUT_VAR, &output)?,
            }),
            (None, None) => Ok(Endpoint::Stdio),
            _ => Err(TraxError::Config(format!(
                "{} and {} must be set together",
                IN_VAR, OUT_VAR
            ))),
        }
    }

    /// Open the transport.
    pub async fn open(&self, config: &SessionConfig) -> Result<(BoxedReader, BoxedWriter)> {
        match self {
            Endpoint::Stdio => {
                tracing::debug!("Using stdin/stdout transport");
                Ok((Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout())))
            }
            Endpoint::Pipes { input, output } => open_pipes(*input, *output),
            Endpoint::Socket { host, port } => {
                let stream = connect(
                    host,
                    *port,
                    config.connect_attempts,
                    config.connect_interval,
                )
                .await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }
}

fn parse_socket(value: &str) -> Result<Endpoint> {
    let (host, port) = match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => (host.to_string(), port),
        Some((_, port)) => (DEFAULT_HOST.to_string(), port),
        None => (DEFAULT_HOST.to_string(), value),
    };
    let port = port
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| TraxError::Config(format!("invalid {} value '{}'", SOCKET_VAR, value)))?;
    Ok(Endpoint::Socket { host, port })
}

fn parse_fd(name: &str, value: &str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|fd| *fd >= 0)
        .ok_or_else(|| TraxError::Config(format!("invalid {} descriptor '{}'", name, value)))
}

#[cfg(unix)]
fn open_pipes(input: i32, output: i32) -> Result<(BoxedReader, BoxedWriter)> {
    use std::os::fd::FromRawFd;

    tracing::debug!(input, output, "Using inherited pipe transport");
    // SAFETY: the descriptors were passed to this process by its parent for
    // exclusive use as the protocol channel; nothing else here owns them.
    let (reader, writer) = unsafe {
        (
            std::fs::File::from_raw_fd(input),
            std::fs::File::from_raw_fd(output),
        )
    };
    Ok((
        Box::new(tokio::fs::File::from_std(reader)),
        Box::new(tokio::fs::File::from_std(writer)),
    ))
}

#[cfg(not(unix))]
fn open_pipes(_input: i32, _output: i32) -> Result<(BoxedReader, BoxedWriter)> {
    Err(TraxError::Config(format!(
        "{}/{} descriptors are only supported on Unix",
        IN_VAR, OUT_VAR
    )))
}

/// Connect to a client, retrying while it is not yet listening.
pub async fn connect(host: &str, port: u16, attempts: u32, interval: Duration) -> Result<TcpStream> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                tracing::debug!(host, port, attempt, "Connected to client");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(host, port, attempt, "Connection attempt failed: {}", e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    Err(TraxError::Io(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotConnected, "no connection attempt made")
    })))
}

/// Listen for a tracker on the loopback interface.
///
/// Port 0 picks a free port; read it back with `local_addr`.
pub async fn listen(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((DEFAULT_HOST, port)).await?;
    tracing::debug!(addr = ?listener.local_addr().ok(), "Listening for tracker");
    Ok(listener)
}

/// Accept one tracker connection.
///
/// # Errors
///
/// Returns an `Io` error of kind `TimedOut` if no tracker connects in time.
pub async fn accept(listener: &TcpListener, timeout: Duration) -> Result<TcpStream> {
    let (stream, peer) = tokio::time::timeout(timeout, listener.accept())
        .await
        .map_err(|_| {
            TraxError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "no tracker connected in time",
            ))
        })??;
    stream.set_nodelay(true)?;
    tracing::debug!(%peer, "Tracker connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection() {
        assert_eq!(Endpoint::from_vars(None, None, None).unwrap(), Endpoint::Stdio);
        assert_eq!(
            Endpoint::from_vars(None, Some("3".into()), Some("4".into())).unwrap(),
            Endpoint::Pipes { input: 3, output: 4 }
        );
        assert_eq!(
            Endpoint::from_vars(Some("example.org:7000".into()), Some("3".into()), None).unwrap(),
            Endpoint::Socket {
                host: "example.org".into(),
                port: 7000
            }
        );
        assert_eq!(
            Endpoint::from_vars(Some(":7000".into()), None, None).unwrap(),
            Endpoint::Socket {
                host: DEFAULT_HOST.into(),
                port: 7000
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        for (socket, input, output) in [
            (Some("port"), None, None),
            (Some("0"), None, None),
            (Some("host:99999"), None, None),
            (None, Some("3"), None),
            (None, Some("-1"), Some("4")),
            (None, Some("three"), Some("4")),
        ] {
            let result = Endpoint::from_vars(
                socket.map(String::from),
                input.map(String::from),
                output.map(String::from),
            );
            assert!(
                matches!(result, Err(TraxError::Config(_))),
                "{:?} {:?} {:?}",
                socket,
                input,
                output
            );
        }
    }

    #[tokio::test]
    async fn test_listen_connect_accept() {
        let listener = listen(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (connected, accepted) = tokio::join!(
            connect(DEFAULT_HOST, port, 3, Duration::from_millis(10)),
            accept(&listener, Duration::from_secs(5)),
        );
        assert!(connected.unwrap().nodelay().unwrap());
        accepted.unwrap();
    }

    #[tokio::test]
    async fn test_accept_timeout() {
        let listener = listen(0).await.unwrap();
        let err = accept(&listener, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TraxError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn test_connect_gives_up() {
        let listener = listen(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect(DEFAULT_HOST, port, 2, Duration::from_millis(5)).await;
        assert!(matches!(result, Err(TraxError::Io(_))));
    }
}
