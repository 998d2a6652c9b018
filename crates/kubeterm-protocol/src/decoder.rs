use kubeterm_common::error::{BridgeError, Result};
use kubeterm_common::types::TerminalSize;
use serde_json::{Map, Value};
use tracing::trace;

/// Discriminator for keystroke payloads
pub const TYPE_INPUT: &str = "input";
/// Discriminator for terminal size changes
pub const TYPE_RESIZE: &str = "resize";

/// One decoded client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Bytes to feed to the remote process's stdin
    Input(Vec<u8>),
    /// The client terminal changed size
    Resize(TerminalSize),
    /// Unknown type or missing/garbled fields; callers skip these
    Unrecognized,
}

/// Decode a single transport message.
///
/// Only payloads that are not a JSON object at all are errors. A well-formed
/// object with an unknown `type`, or with the wrong fields for its `type`,
/// decodes to [`InboundEvent::Unrecognized`].
pub fn decode(raw: &[u8]) -> Result<InboundEvent> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| BridgeError::Decode(e.to_string()))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(BridgeError::Decode(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            )))
        }
    };

    let event = match fields.get("type").and_then(Value::as_str) {
        Some(TYPE_INPUT) => decode_input(&fields),
        Some(TYPE_RESIZE) => decode_resize(&fields),
        _ => InboundEvent::Unrecognized,
    };

    trace!("Decoded client message: {:?}", event);
    Ok(event)
}

fn decode_input(fields: &Map<String, Value>) -> InboundEvent {
    match fields.get("input").and_then(Value::as_str) {
        Some(text) => InboundEvent::Input(text.as_bytes().to_vec()),
        None => InboundEvent::Unrecognized,
    }
}

fn decode_resize(fields: &Map<String, Value>) -> InboundEvent {
    match (dimension(fields.get("rows")), dimension(fields.get("cols"))) {
        (Some(rows), Some(cols)) => InboundEvent::Resize(TerminalSize::new(rows, cols)),
        _ => InboundEvent::Unrecognized,
    }
}

/// An integer that fits in a u16
fn dimension(value: Option<&Value>) -> Option<u16> {
    value?.as_u64().and_then(|n| u16::try_from(n).ok())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_message() {
        let event = decode(br#"{"type":"input","input":"ls\n"}"#).unwrap();
        assert_eq!(event, InboundEvent::Input(b"ls\n".to_vec()));
    }

    #[test]
    fn test_input_keeps_multibyte_text() {
        let event = decode(r#"{"type":"input","input":"héllo"}"#.as_bytes()).unwrap();
        assert_eq!(event, InboundEvent::Input("héllo".as_bytes().to_vec()));
    }

    #[test]
    fn test_resize_message() {
        let event = decode(br#"{"type":"resize","rows":40,"cols":120}"#).unwrap();
        assert_eq!(event, InboundEvent::Resize(TerminalSize::new(40, 120)));
    }

    #[test]
    fn test_zero_size_is_still_a_resize() {
        let event = decode(br#"{"type":"resize","rows":0,"cols":0}"#).unwrap();
        assert_eq!(event, InboundEvent::Resize(TerminalSize::new(0, 0)));

        let event = decode(br#"{"type":"resize","rows":0,"cols":120}"#).unwrap();
        assert_eq!(event, InboundEvent::Resize(TerminalSize::new(0, 120)));
    }

    #[test]
    fn test_unused_fields_are_ignored() {
        let event = decode(br#"{"type":"resize","rows":24,"cols":80,"input":"x"}"#).unwrap();
        assert_eq!(event, InboundEvent::Resize(TerminalSize::new(24, 80)));
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let event = decode(br#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(event, InboundEvent::Unrecognized);

        let event = decode(br#"{"input":"ls"}"#).unwrap();
        assert_eq!(event, InboundEvent::Unrecognized);
    }

    #[test]
    fn test_garbled_fields_are_unrecognized() {
        let cases: [&[u8]; 5] = [
            br#"{"type":"resize","rows":-1,"cols":80}"#,
            br#"{"type":"input"}"#,
            br#"{"type":"input","input":42}"#,
            br#"{"type":"resize","rows":"40","cols":120}"#,
            br#"{"type":"resize","rows":70000,"cols":120}"#,
        ];
        for raw in cases {
            assert_eq!(decode(raw).unwrap(), InboundEvent::Unrecognized);
        }
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(matches!(decode(b"{not json"), Err(BridgeError::Decode(_))));
        assert!(matches!(decode(b"[1,2]"), Err(BridgeError::Decode(_))));
        assert!(matches!(decode(b""), Err(BridgeError::Decode(_))));
    }
}
