//! Protocol module - line framing, message types and the wire grammar.
//!
//! This module implements the textual message layer:
//! - Line buffer for accumulating partial reads
//! - Message struct with kind, positional arguments and properties
//! - Tokenizer and writer for quoted/escaped arguments

mod line_buffer;
mod message;
mod wire_format;

pub use line_buffer::{LineBuffer, DEFAULT_MAX_LINE_LENGTH};
pub use message::{Message, MessageKind};
pub use wire_format::{encode_message, is_protocol_line, parse_message, PREFIX, REASON_KEY};
