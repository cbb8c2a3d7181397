//! Inbound frames: decoding server pushes into [`InboundTask`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{MessageFragment, MessageId, Placement};
use crate::error::{FeedError, Result};

/// A decoded inbound frame. `tag` is the raw `task` string, kept so that
/// unrecognized tasks can still be named in logs.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub tag: String,
    pub task: InboundTask,
}

/// Every server push this client understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum InboundTask {
    /// Replace the main content container.
    Content { content: String },
    /// Replace a named container.
    SubContent { container: String, content: String },
    Banner { content: String },
    DetailBanner { content: String },
    Dialog { content: String },
    HideDialog,
    /// Open the message editor dialog for `message_id` (0 for a new message).
    EditMessage {
        content: String,
        #[serde(default)]
        message_id: MessageId,
    },
    /// Full feed replace.
    Messages(FeedReplace),
    MoreOldMessages {
        #[serde(default)]
        messages: Vec<MessageFragment>,
    },
    MoreNewMessages {
        #[serde(default)]
        messages: Vec<MessageFragment>,
    },
    NoMoreOldMessages,
    NoMoreNewMessages,
    DeliverMessageTeaser { teaser: String },
    InjectDeliverNewMessage(Injection),
    RemoveMessage { message_id: MessageId },
    InlineReplyBox {
        content: String,
        message_id: MessageId,
        #[serde(default)]
        parent_mid: MessageId,
    },
    RemoveReplyContainer { message_id: MessageId },
    PostCompletedReply {
        content: String,
        message_id: MessageId,
    },
    FilesUploaded {
        content: String,
        message_id: MessageId,
    },
    /// Server asks for a full reload.
    Reload,
    Pong,
    #[serde(other)]
    Unrecognized,
}

/// Payload of the `messages` task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedReplace {
    #[serde(default)]
    pub messages: Vec<MessageFragment>,
    #[serde(default, deserialize_with = "flag")]
    pub scroll_to_bottom: bool,
    #[serde(default)]
    pub filt: Option<String>,
    #[serde(default)]
    pub filter_banner: Option<String>,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub more_older: bool,
    #[serde(default, deserialize_with = "flag")]
    pub more_newer: bool,
}

/// Payload of `inject_deliver_new_message`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Injection {
    pub content: String,
    pub new_mid: MessageId,
    /// `0` on the wire means "no reference".
    #[serde(default)]
    pub reference_mid: MessageId,
    #[serde(default)]
    pub placement: Option<Placement>,
    #[serde(default)]
    pub parent_mid: Option<MessageId>,
}

fn default_true() -> bool {
    true
}

/// The server sends booleans both as JSON bools and as `0`/`1`.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(s) => Ok(matches!(s.as_str(), "1" | "true")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("expected flag, got {other}"))),
    }
}

/// Decode one text frame.
///
/// Unknown tags are not an error: they decode to
/// [`InboundTask::Unrecognized`]. A known tag with bad fields is
/// [`FeedError::Protocol`].
pub fn decode(text: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("task")
        .and_then(Value::as_str)
        .ok_or(FeedError::MissingTask)?
        .to_owned();
    let task = InboundTask::deserialize(value).map_err(|e| FeedError::protocol(&tag, e))?;
    Ok(InboundFrame { tag, task })
}
