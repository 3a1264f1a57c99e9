//! Message struct with typed accessors.
//!
//! A message is one protocol line: a kind, ordered positional arguments and a
//! property map. Values are raw tokens here; the codec turns them into regions
//! and images.
//!
//! # Example
//!
//! ```
//! use trax_protocol::protocol::{Message, MessageKind};
//!
//! let message = Message::new(MessageKind::Status)
//!     .with_argument("10,10,5,5")
//!     .with_property("trax.confidence", "0.9")
//!     .unwrap();
//!
//! assert_eq!(message.kind(), MessageKind::Status);
//! assert_eq!(message.arguments(), ["10,10,5,5"]);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::codec::Properties;
use crate::error::{Result, TraxError};

/// Message kinds defined by the protocol.
///
/// Errors are not a kind here: a failed read or parse is reported as
/// `Err(TraxError)` and never reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Server handshake carrying tracker metadata.
    Hello,
    /// Client request starting a tracking sequence.
    Initialize,
    /// Client request carrying the next frame.
    Frame,
    /// Terminal message from either side.
    Quit,
    /// Server reply with the current object state.
    Status,
}

impl MessageKind {
    /// Wire literal of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Hello => "hello",
            MessageKind::Initialize => "initialize",
            MessageKind::Frame => "frame",
            MessageKind::Quit => "quit",
            MessageKind::Status => "status",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = TraxError;

    fn from_str(literal: &str) -> Result<Self> {
        match literal {
            "hello" => Ok(MessageKind::Hello),
            "initialize" => Ok(MessageKind::Initialize),
            "frame" => Ok(MessageKind::Frame),
            "quit" => Ok(MessageKind::Quit),
            // older trackers reply with `state`
            "status" | "state" => Ok(MessageKind::Status),
            other => Err(TraxError::malformed(format!(
                "unknown message kind '{}'",
                other
            ))),
        }
    }
}

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    kind: MessageKind,
    arguments: Vec<String>,
    properties: Properties,
}

impl Message {
    /// Create a message with no arguments and no properties.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            arguments: Vec::new(),
            properties: Properties::new(),
        }
    }

    /// Create a message from already assembled parts.
    pub fn from_parts(kind: MessageKind, arguments: Vec<String>, properties: Properties) -> Self {
        Self {
            kind,
            arguments,
            properties,
        }
    }

    /// Append a positional argument.
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Set a property.
    pub fn with_property(mut self, key: &str, value: impl ToString) -> Result<Self> {
        self.properties.set(key, value)?;
        Ok(self)
    }

    /// Get the message kind.
    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Get the positional arguments.
    #[inline]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Get the properties.
    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Split the message into its parts.
    pub fn into_parts(self) -> (MessageKind, Vec<String>, Properties) {
        (self.kind, self.arguments, self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_literals() {
        for kind in [
            MessageKind::Hello,
            MessageKind::Initialize,
            MessageKind::Frame,
            MessageKind::Quit,
            MessageKind::Status,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_state_alias() {
        assert_eq!("state".parse::<MessageKind>().unwrap(), MessageKind::Status);
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let err = "error".parse::<MessageKind>().unwrap_err();
        assert!(matches!(err, TraxError::MalformedMessage(_)));
        assert!("STATUS".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let message = Message::new(MessageKind::Quit)
            .with_property("trax.reason", "done")
            .unwrap();

        let (kind, arguments, properties) = message.into_parts();
        assert_eq!(kind, MessageKind::Quit);
        assert!(arguments.is_empty());
        assert_eq!(properties.get("trax.reason"), Some("done"));
    }
}
