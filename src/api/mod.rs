//! Wire payloads exchanged with the conversation service.
//!
//! Frames on the persistent channel are JSON objects tagged by `type`. Plain
//! text frames and untagged objects are read as replies so older servers that
//! only push message bodies still work.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::DecodeError;

/// Frame sent by the client for a user-authored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message { client_id: String, text: String },
}

impl OutboundFrame {
    pub fn message(client_id: impl Into<String>, text: impl Into<String>) -> Self {
        OutboundFrame::Message {
            client_id: client_id.into(),
            text: text.into(),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a plain enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A message produced by the service. When `client_id` names a local
    /// entry the frame is an echo of that entry.
    Reply {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "message")]
        text: String,
        #[serde(default)]
        client_id: Option<String>,
    },
    /// Explicit acknowledgement of a client message.
    Ack { client_id: String },
    /// Service-side failure report.
    Error { message: String },
}

impl InboundFrame {
    pub fn reply(text: impl Into<String>) -> Self {
        InboundFrame::Reply {
            id: None,
            text: text.into(),
            client_id: None,
        }
    }
}

/// Decodes one text frame from the channel.
pub fn decode_inbound(raw: &str) -> Result<InboundFrame, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Ok(InboundFrame::reply(raw));
    };

    match value {
        Value::Object(mut map) => {
            map.entry("type")
                .or_insert_with(|| Value::String("reply".to_string()));
            serde_json::from_value(Value::Object(map)).map_err(|source| DecodeError::Invalid {
                frame: truncate_for_log(trimmed),
                source,
            })
        }
        // Bare JSON scalars such as `"hello"` carry just a body.
        Value::String(text) => Ok(InboundFrame::reply(text)),
        Value::Number(_) | Value::Bool(_) => Ok(InboundFrame::reply(trimmed)),
        Value::Array(_) | Value::Null => Err(DecodeError::Unsupported(truncate_for_log(trimmed))),
    }
}

pub(crate) fn truncate_for_log(raw: &str) -> String {
    const MAX: usize = 200;
    if raw.len() <= MAX {
        return raw.to_string();
    }
    let mut end = MAX;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &raw[..end])
}

/// Body of the one-shot bootstrap request.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapRequest<'a> {
    pub context: &'a Value,
}

/// Acknowledgement returned by the bootstrap endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BootstrapAck {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_message_is_tagged() {
        let frame = OutboundFrame::message("local-1", "hello");
        let value: Value = serde_json::from_str(&frame.encode()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["client_id"], "local-1");
        assert_eq!(value["text"], "hello");
    }

    #[test]
    fn tagged_reply_and_ack_decode() {
        let reply = decode_inbound(r#"{"type":"reply","id":"12","text":"hi"}"#).unwrap();
        assert_eq!(
            reply,
            InboundFrame::Reply {
                id: Some("12".to_string()),
                text: "hi".to_string(),
                client_id: None,
            }
        );

        let ack = decode_inbound(r#"{"type":"ack","client_id":"local-1"}"#).unwrap();
        assert_eq!(
            ack,
            InboundFrame::Ack {
                client_id: "local-1".to_string()
            }
        );
    }

    #[test]
    fn untagged_object_is_a_reply() {
        let frame = decode_inbound(r#"{"text":"hi there"}"#).unwrap();
        assert_eq!(frame, InboundFrame::reply("hi there"));
    }

    #[test]
    fn message_field_is_read_as_reply_text() {
        let frame =
            decode_inbound(r#"{"id":"0","message":"Welcome! How can I help?"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Reply {
                id: Some("0".to_string()),
                text: "Welcome! How can I help?".to_string(),
                client_id: None,
            }
        );

        let frame =
            decode_inbound(r#"{"type":"reply","id":"7","message":"Next question"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Reply { text, .. } if text == "Next question"));
    }

    #[test]
    fn plain_text_frame_is_a_reply() {
        let frame = decode_inbound("welcome aboard").unwrap();
        assert_eq!(frame, InboundFrame::reply("welcome aboard"));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(decode_inbound("   "), Err(DecodeError::Empty)));
        assert!(matches!(
            decode_inbound(r#"{"type":"reply"}"#),
            Err(DecodeError::Invalid { .. })
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"bogus","text":"x"}"#),
            Err(DecodeError::Invalid { .. })
        ));
        assert!(matches!(
            decode_inbound("[1,2,3]"),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn bootstrap_ack_keeps_unknown_fields() {
        let ack: BootstrapAck =
            serde_json::from_str(r#"{"summary":"ready","user_input":"seed"}"#).unwrap();
        assert_eq!(ack.summary.as_deref(), Some("ready"));
        assert!(ack.error.is_none());
        assert_eq!(ack.extra["user_input"], "seed");
    }
}
