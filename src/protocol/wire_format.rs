//! Wire format encoding and decoding.
//!
//! Every message is a single line:
//! ```text
//! @@TRAX:<kind> [arg] [arg] ... ["key=value"] ...\n
//! ```
//!
//! - Arguments are separated by single spaces. An argument containing a space
//!   or a carriage return (or an empty one) is wrapped in double quotes;
//!   others are written bare.
//! - Properties are always written quoted as `"key=value"`.
//! - Inside any token `\` escapes the next character: `\\`, `\"`, `\n` (newline).
//! - A token is a property when an unescaped `=` follows a valid key
//!   (see [`is_valid_key`](crate::codec::is_valid_key)). The writer escapes the
//!   first `=` of arguments that would otherwise read back as properties.

use crate::codec::{is_valid_key, Properties};
use crate::error::{Result, TraxError};

use super::{Message, MessageKind};

/// Prefix that starts every protocol line.
pub const PREFIX: &str = "@@TRAX:";

/// Property key carrying the termination reason on `quit`.
pub const REASON_KEY: &str = "trax.reason";

/// Check whether a line belongs to the protocol at all.
#[inline]
pub fn is_protocol_line(line: &str) -> bool {
    line.starts_with(PREFIX)
}

/// Encode a message as one newline-terminated line.
pub fn encode_message(message: &Message) -> String {
    let mut line = String::with_capacity(64);
    line.push_str(PREFIX);
    line.push_str(message.kind().as_str());

    for argument in message.arguments() {
        line.push(' ');
        push_argument(&mut line, argument);
    }

    for (key, value) in message.properties().iter() {
        line.push_str(" \"");
        line.push_str(key);
        line.push('=');
        push_escaped(&mut line, value);
        line.push('"');
    }

    line.push('\n');
    line
}

fn push_argument(line: &mut String, argument: &str) {
    let quoted = argument.is_empty() || argument.contains([' ', '\r']);
    let guarded = argument
        .find('=')
        .filter(|&index| is_valid_key(&argument[..index]));

    if quoted {
        line.push('"');
    }
    for (index, c) in argument.char_indices() {
        match c {
            '=' if Some(index) == guarded => line.push_str("\\="),
            c => push_escaped_char(line, c),
        }
    }
    if quoted {
        line.push('"');
    }
}

fn push_escaped(line: &mut String, text: &str) {
    for c in text.chars() {
        push_escaped_char(line, c);
    }
}

#[inline]
fn push_escaped_char(line: &mut String, c: char) {
    match c {
        '\\' => line.push_str("\\\\"),
        '"' => line.push_str("\\\""),
        '\n' => line.push_str("\\n"),
        c => line.push(c),
    }
}

/// Parse one line (without its trailing newline) into a message.
///
/// # Errors
///
/// Returns `MalformedMessage` for a missing prefix, an unknown kind literal,
/// an unterminated quote or a dangling escape.
pub fn parse_message(line: &str) -> Result<Message> {
    let body = line
        .strip_prefix(PREFIX)
        .ok_or_else(|| TraxError::malformed("line does not start with @@TRAX:"))?;

    let (literal, rest) = body.split_once(' ').unwrap_or((body, ""));
    let kind: MessageKind = literal.parse()?;

    let (arguments, properties) = tokenize(rest)?;
    Ok(Message::from_parts(kind, arguments, properties))
}

fn tokenize(input: &str) -> Result<(Vec<String>, Properties)> {
    let mut arguments = Vec::new();
    let mut properties = Properties::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek() == Some(&' ') {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let quoted = first == '"';
        if quoted {
            chars.next();
        }

        let mut key = String::new();
        let mut value: Option<String> = None;
        let mut closed = false;

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| TraxError::malformed("dangling escape at end of line"))?;
                    let escaped = if escaped == 'n' { '\n' } else { escaped };
                    value.as_mut().unwrap_or(&mut key).push(escaped);
                }
                '"' if quoted => {
                    closed = true;
                    break;
                }
                ' ' if !quoted => break,
                '=' if value.is_none() && is_valid_key(&key) => value = Some(String::new()),
                c => value.as_mut().unwrap_or(&mut key).push(c),
            }
        }

        if quoted {
            if !closed {
                return Err(TraxError::malformed("unterminated quoted argument"));
            }
            if matches!(chars.peek(), Some(c) if *c != ' ') {
                return Err(TraxError::malformed("unexpected character after closing quote"));
            }
        }

        match value {
            Some(value) => properties.insert_decoded(key, value),
            None => arguments.push(key),
        }
    }

    Ok((arguments, properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(message: &Message) -> Message {
        let line = encode_message(message);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        parse_message(line.trim_end_matches('\n')).unwrap()
    }

    #[test]
    fn test_status_with_quoted_tokens() {
        let message =
            parse_message(r#"@@TRAX:status "10,10,5,5" "trax.confidence=0.9""#).unwrap();

        assert_eq!(message.kind(), MessageKind::Status);
        assert_eq!(message.arguments(), ["10,10,5,5"]);
        assert_eq!(message.properties().get("trax.confidence"), Some("0.9"));
        assert_eq!(message.properties().len(), 1);
    }

    #[test]
    fn test_encode_exact_bytes() {
        let message = Message::new(MessageKind::Initialize)
            .with_argument("file:///data/seq 1/00000001.jpg")
            .with_argument("10,10,50,50")
            .with_property("trax.reason", "a \"quoted\" word")
            .unwrap();

        assert_eq!(
            encode_message(&message),
            "@@TRAX:initialize \"file:///data/seq 1/00000001.jpg\" 10,10,50,50 \
             \"trax.reason=a \\\"quoted\\\" word\"\n"
        );
    }

    #[test]
    fn test_hello_without_arguments() {
        let message = parse_message("@@TRAX:hello").unwrap();
        assert_eq!(message.kind(), MessageKind::Hello);
        assert!(message.arguments().is_empty());
        assert!(message.properties().is_empty());
        assert_eq!(encode_message(&message), "@@TRAX:hello\n");
    }

    #[test]
    fn test_missing_prefix() {
        let err = parse_message("TRAX:hello").unwrap_err();
        assert!(matches!(err, TraxError::MalformedMessage(_)));
    }

    #[test]
    fn test_unknown_kind() {
        let err = parse_message("@@TRAX:launch 1,2,3,4").unwrap_err();
        assert!(err.to_string().contains("unknown message kind"));
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(parse_message(r#"@@TRAX:frame "file:///a b"#).is_err());
    }

    #[test]
    fn test_dangling_escape() {
        assert!(parse_message(r"@@TRAX:frame abc\").is_err());
    }

    #[test]
    fn test_garbage_after_closing_quote() {
        assert!(parse_message(r#"@@TRAX:frame "abc"def"#).is_err());
    }

    #[test]
    fn test_extra_spaces_between_tokens() {
        let message = parse_message("@@TRAX:status   1,2,3,4    \"k=v\"  ").unwrap();
        assert_eq!(message.arguments(), ["1,2,3,4"]);
        assert_eq!(message.properties().get("k"), Some("v"));
    }

    #[test]
    fn test_unquoted_property_is_accepted() {
        let message = parse_message("@@TRAX:quit trax.reason=done").unwrap();
        assert!(message.arguments().is_empty());
        assert_eq!(message.properties().get("trax.reason"), Some("done"));
    }

    #[test]
    fn test_property_splits_on_first_equals() {
        let message = parse_message(r#"@@TRAX:status 1 "data=a=b==" "trax.name=""#).unwrap();
        assert_eq!(message.arguments(), ["1"]);
        assert_eq!(message.properties().get("data"), Some("a=b=="));
        assert_eq!(message.properties().get("trax.name"), Some(""));
    }

    #[test]
    fn test_invalid_key_is_an_argument() {
        let message = parse_message(r#"@@TRAX:status novalue "=value" "bad key=value""#).unwrap();
        assert_eq!(message.arguments(), ["novalue", "=value", "bad key=value"]);
        assert!(message.properties().is_empty());
    }

    #[test]
    fn test_base64_argument_is_not_a_property() {
        let message = parse_message("@@TRAX:frame image:1;1;gray8;AA==").unwrap();
        assert_eq!(message.arguments(), ["image:1;1;gray8;AA=="]);
        assert!(message.properties().is_empty());
    }

    #[test]
    fn test_argument_that_looks_like_property() {
        let message = Message::new(MessageKind::Frame).with_argument("x=1.png");
        let line = encode_message(&message);
        assert_eq!(line, "@@TRAX:frame x\\=1.png\n");

        let parsed = round_trip(&message);
        assert_eq!(parsed.arguments(), ["x=1.png"]);
        assert!(parsed.properties().is_empty());
    }

    #[test]
    fn test_property_value_with_newline_and_equals() {
        let message = Message::new(MessageKind::Status)
            .with_argument("1")
            .with_property("note", "a=b\nsecond line")
            .unwrap();

        let parsed = round_trip(&message);
        assert_eq!(parsed.properties().get("note"), Some("a=b\nsecond line"));
    }

    #[test]
    fn test_empty_argument_is_quoted() {
        let message = Message::new(MessageKind::Frame).with_argument("");
        assert_eq!(encode_message(&message), "@@TRAX:frame \"\"\n");
        assert_eq!(round_trip(&message).arguments(), [""]);
    }

    #[test]
    fn test_carriage_return_survives_framing() {
        use crate::protocol::LineBuffer;

        let message = Message::new(MessageKind::Frame)
            .with_argument("a.png\r")
            .with_argument("b\rc");
        let line = encode_message(&message);
        assert_eq!(line, "@@TRAX:frame \"a.png\r\" \"b\rc\"\n");

        let mut buffer = LineBuffer::new();
        buffer.push(line.as_bytes()).unwrap();
        let parsed = parse_message(&buffer.next_line().unwrap().unwrap()).unwrap();
        assert_eq!(parsed.arguments(), ["a.png\r", "b\rc"]);
    }

    #[test]
    fn test_properties_after_arguments_in_key_order() {
        let message = Message::new(MessageKind::Status)
            .with_argument("1,2,3,4")
            .with_property("b", 2)
            .unwrap()
            .with_property("a", 1)
            .unwrap();

        assert_eq!(
            encode_message(&message),
            "@@TRAX:status 1,2,3,4 \"a=1\" \"b=2\"\n"
        );
    }

    proptest! {
        #[test]
        fn test_quoting_law(argument in "(\\PC|\r){0,40}") {
            let message = Message::new(MessageKind::Frame).with_argument(argument.clone());
            let line = encode_message(&message);
            let written = &line[PREFIX.len() + "frame ".len()..line.len() - 1];

            if !argument.is_empty() && !argument.contains([' ', '\r']) {
                prop_assert!(!written.starts_with('"'));
            }
            let mut buffer = crate::protocol::LineBuffer::new();
            buffer.push(line.as_bytes()).unwrap();
            let parsed = parse_message(&buffer.next_line().unwrap().unwrap()).unwrap();
            prop_assert_eq!(parsed.arguments(), [argument]);
        }

        #[test]
        fn test_property_map_round_trip(
            entries in proptest::collection::btree_map("[A-Za-z0-9._]{1,16}", "\\PC{0,24}", 0..8)
        ) {
            let mut message = Message::new(MessageKind::Status).with_argument("1,2,3,4");
            for (key, value) in &entries {
                message = message.with_property(key, value).unwrap();
            }
            let parsed = round_trip(&message);
            prop_assert_eq!(parsed.arguments(), ["1,2,3,4"]);
            prop_assert_eq!(parsed.properties(), message.properties());
        }

        #[test]
        fn test_arguments_with_spaces_survive(
            arguments in proptest::collection::vec("[a-z ]{1,12}", 1..5)
        ) {
            let mut message = Message::new(MessageKind::Initialize);
            for argument in &arguments {
                message = message.with_argument(argument.clone());
            }
            let parsed = round_trip(&message);
            prop_assert_eq!(parsed.arguments(), &arguments[..]);
        }
    }
}
