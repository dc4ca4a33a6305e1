//! Upstream frame decoding.
//!
//! Turns one raw text frame into zero or more `(topic, value)` pairs. Two
//! wire shapes are accepted: the incremental delta form (a list of hub
//! messages, each carrying a topic name and one value argument) and the
//! snapshot form (a single topic-to-value mapping sent once per connection
//! in reply to the subscribe request). Topics carrying the compression
//! marker suffix hold base64-encoded, raw-deflate-compressed JSON and are
//! inflated transparently; the suffix is stripped from the emitted name.

use std::io::Read;

use base64::{engine::general_purpose, Engine as _};
use flate2::read::DeflateDecoder;
use serde_json::Value;

use crate::errors::DecodeError;

/// Topic suffix marking a base64 + raw-deflate compressed value.
pub const COMPRESSED_SUFFIX: &str = ".z";

/// Request identifier echoed back on the snapshot reply. Must match the
/// `I` field of the subscribe control message.
pub const SNAPSHOT_REQUEST_ID: u64 = 1;

/// Decodes one raw frame. An empty result means the frame carried no
/// fields (the keepalive case) and counts against session liveness.
///
/// Any malformed field fails the whole frame: callers drop it and keep the
/// connection alive, so a bad frame can never corrupt accumulated state.
pub fn decode_frame(raw: &str) -> Result<Vec<(String, Value)>, DecodeError> {
    let frame: Value = serde_json::from_str(raw)?;
    let Some(envelope) = frame.as_object() else {
        return Err(DecodeError::Shape("frame is not a JSON object".into()));
    };

    let mut fields = Vec::new();

    // Incremental form: {"M": [{"H": hub, "M": method, "A": [topic, value, ..]}, ..]}
    if let Some(messages) = envelope.get("M").and_then(Value::as_array) {
        for message in messages {
            let args = message
                .get("A")
                .and_then(Value::as_array)
                .ok_or_else(|| DecodeError::Shape("hub message without argument list".into()))?;
            let topic = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError::Shape("hub message without topic name".into()))?;
            let value = args.get(1).cloned().ok_or_else(|| {
                DecodeError::Shape(format!("hub message for '{topic}' without value"))
            })?;
            fields.push(decode_field(topic, value)?);
        }
    }

    // Snapshot form: {"R": {topic: value, ..}, "I": "1"}
    if snapshot_id_matches(envelope.get("I")) {
        if let Some(snapshot) = envelope.get("R").and_then(Value::as_object) {
            for (topic, value) in snapshot {
                fields.push(decode_field(topic, value.clone())?);
            }
        }
    }

    Ok(fields)
}

// The upstream echoes the request id back as a string, but tolerate the
// numeric spelling as well.
fn snapshot_id_matches(id: Option<&Value>) -> bool {
    match id {
        Some(Value::String(s)) => s.parse::<u64>().ok() == Some(SNAPSHOT_REQUEST_ID),
        Some(Value::Number(n)) => n.as_u64() == Some(SNAPSHOT_REQUEST_ID),
        _ => false,
    }
}

fn decode_field(topic: &str, value: Value) -> Result<(String, Value), DecodeError> {
    match topic.strip_suffix(COMPRESSED_SUFFIX) {
        Some(plain) => {
            let encoded = value.as_str().ok_or_else(|| {
                DecodeError::Shape(format!("compressed field '{topic}' is not a string"))
            })?;
            Ok((plain.to_string(), inflate_value(encoded)?))
        }
        None => Ok((topic.to_string(), value)),
    }
}

/// Inflates one base64 + raw-deflate compressed JSON value.
fn inflate_value(encoded: &str) -> Result<Value, DecodeError> {
    let compressed = general_purpose::STANDARD.decode(encoded)?;
    let mut inflated = String::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_string(&mut inflated)?;
    Ok(serde_json::from_str(&inflated)?)
}
