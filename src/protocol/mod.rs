//! Wire protocol: the task-tagged JSON envelopes exchanged over the socket
//! and the binary multi-file upload frame.
//!
//! ## Envelope shape
//! Every text frame is a JSON object with a `task` tag and, for outbound
//! frames, an optional `module` naming the server-side handler group:
//!
//! ```text
//! {"module": "app.messages", "task": "save_wip", "message_id": 7, "content": "..."}
//! ```
//!
//! Inbound tags decode into the closed [`InboundTask`] enum; tags this client
//! does not know land in [`InboundTask::Unrecognized`] so new server tasks
//! degrade to a logged no-op. Outbound kinds are the closed [`Outbound`] enum,
//! each with a fixed `(module, task)` route.

pub mod inbound;
pub mod outbound;
pub mod upload_frame;

pub use inbound::{decode, FeedReplace, InboundFrame, InboundTask, Injection};
pub use outbound::{Envelope, Outbound, MAIN_MODULE, MESSAGES_MODULE};
pub use upload_frame::{encode_upload_frame, FileMeta, UploadFrame, UploadHeader};

use serde::{Deserialize, Serialize};

use crate::dom::Position;

/// Prefix of the element id that holds a rendered message.
pub const MESSAGE_ELEMENT_PREFIX: &str = "message_";

/// Prefix of the element id that holds a message's attachment strip.
pub const ATTACHMENTS_ELEMENT_PREFIX: &str = "attachments_";

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Server-assigned message identity. `0` means "not yet created".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    pub const NEW: MessageId = MessageId(0);

    pub fn is_new(self) -> bool {
        self.0 == 0
    }

    /// `None` for the "not yet created" id; the wire uses `0` for "no reference".
    pub fn non_zero(self) -> Option<MessageId> {
        if self.is_new() {
            None
        } else {
            Some(self)
        }
    }

    /// Id of the document element rendering this message.
    pub fn element_id(self) -> String {
        format!("{MESSAGE_ELEMENT_PREFIX}{}", self.0)
    }

    /// Id of the attachment strip inside this message's element.
    pub fn attachments_id(self) -> String {
        format!("{ATTACHMENTS_ELEMENT_PREFIX}{}", self.0)
    }

    /// Inverse of [`MessageId::element_id`]; `None` for non-message elements.
    pub fn from_element_id(id: &str) -> Option<MessageId> {
        id.strip_prefix(MESSAGE_ELEMENT_PREFIX)?
            .parse()
            .ok()
            .map(MessageId)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Fragments and placement
// ---------------------------------------------------------------------------

/// One server-rendered message, keyed by id. `content` is opaque HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFragment {
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    pub content: String,
}

impl MessageFragment {
    pub fn new(message_id: u64, content: impl Into<String>) -> Self {
        Self {
            message_id: MessageId(message_id),
            parent_id: None,
            content: content.into(),
        }
    }

    pub fn reply_to(mut self, parent: u64) -> Self {
        self.parent_id = Some(MessageId(parent));
        self
    }
}

/// Where an injected message goes relative to its reference element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    BeforeBegin,
    AfterBegin,
    BeforeEnd,
    AfterEnd,
    /// End of the feed, ignoring any reference.
    Bottom,
}

impl Placement {
    /// The insert-adjacent position, or `None` for [`Placement::Bottom`].
    pub fn position(self) -> Option<Position> {
        match self {
            Placement::BeforeBegin => Some(Position::BeforeBegin),
            Placement::AfterBegin => Some(Position::AfterBegin),
            Placement::BeforeEnd => Some(Position::BeforeEnd),
            Placement::AfterEnd => Some(Position::AfterEnd),
            Placement::Bottom => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id_round_trip() {
        assert_eq!(MessageId(42).element_id(), "message_42");
        assert_eq!(MessageId::from_element_id("message_42"), Some(MessageId(42)));
    }

    #[test]
    fn test_from_element_id_rejects_other_elements() {
        assert_eq!(MessageId::from_element_id("attachments_42"), None);
        assert_eq!(MessageId::from_element_id("message_abc"), None);
        assert_eq!(MessageId::from_element_id("banner_container"), None);
    }

    #[test]
    fn test_zero_is_new() {
        assert!(MessageId::NEW.is_new());
        assert_eq!(MessageId(0).non_zero(), None);
        assert_eq!(MessageId(3).non_zero(), Some(MessageId(3)));
    }

    #[test]
    fn test_placement_wire_names() {
        let p: Placement = serde_json::from_str("\"beforebegin\"").unwrap();
        assert_eq!(p, Placement::BeforeBegin);
        let p: Placement = serde_json::from_str("\"bottom\"").unwrap();
        assert_eq!(p.position(), None);
    }

    #[test]
    fn test_fragment_parent_defaults_to_none() {
        let f: MessageFragment =
            serde_json::from_str(r#"{"message_id": 5, "content": "<p>hi</p>"}"#).unwrap();
        assert_eq!(f.parent_id, None);
        assert_eq!(f.message_id, MessageId(5));
    }
}
