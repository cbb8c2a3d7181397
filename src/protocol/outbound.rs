//! Outbound envelopes and the `(module, task)` routing table.

use serde::Serialize;
use serde_json::{Map, Value};

use super::MessageId;

/// Server handler group for everything feed- and editor-related.
pub const MESSAGES_MODULE: &str = "app.messages";

/// Server handler group for task-stack navigation.
pub const MAIN_MODULE: &str = "app.main";

/// The JSON object sent as one text frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub task: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// An envelope without a module (`send(task, fields)` form).
    pub fn task(task: impl Into<String>) -> Self {
        Self {
            module: None,
            task: task.into(),
            fields: Map::new(),
        }
    }

    /// An envelope routed to `module` (`send(module, task, fields)` form).
    pub fn routed(module: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::task(task)
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_owned(), value.into());
        self
    }

    /// Merge arbitrary caller fields; `module` and `task` keys are ignored so
    /// they cannot shadow the routing.
    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        for (key, value) in fields {
            if key != "module" && key != "task" {
                self.fields.insert(key, value);
            }
        }
        self
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Every action this client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Heartbeat; the server may ignore it.
    Ping,
    OpenFeed { filter: Option<String> },
    FetchOlder { before: Option<MessageId> },
    FetchNewer { after: Option<MessageId> },
    /// Ask for newer content because the loaded feed does not fill the viewport.
    FetchNewerForwardOnly,
    /// Acknowledge a live injection so the server skips it in later pages.
    InjectedMessage { message_id: MessageId },
    NewMessage,
    EditMessage { message_id: MessageId },
    SaveWip { message_id: MessageId, content: String },
    SendMessage { message_id: MessageId },
    ComposeReply { message_id: MessageId },
    SendReply {
        message_id: MessageId,
        parent_mid: MessageId,
        to_sender_only: bool,
    },
    DeleteDraft { message_id: MessageId },
    DeleteMessage { message_id: MessageId },
    Stash { message_id: MessageId },
    Pin { message_id: MessageId },
    Unpin { message_id: MessageId },
    /// Finish the current server-side task (leave the editor keeping the draft).
    Finish,
}

impl Outbound {
    /// `(module, task)` for this action.
    pub fn route(&self) -> (Option<&'static str>, &'static str) {
        let m = Some(MESSAGES_MODULE);
        match self {
            Outbound::Ping => (None, "ping"),
            Outbound::OpenFeed { .. } => (m, "messages"),
            Outbound::FetchOlder { .. } => (m, "more_old_messages"),
            Outbound::FetchNewer { .. } => (m, "more_new_messages"),
            Outbound::FetchNewerForwardOnly => (m, "more_new_messages_forward_only"),
            Outbound::InjectedMessage { .. } => (m, "injected_message"),
            Outbound::NewMessage => (m, "new_message"),
            Outbound::EditMessage { .. } => (m, "edit_message"),
            Outbound::SaveWip { .. } => (m, "save_wip"),
            Outbound::SendMessage { .. } => (m, "send_message"),
            Outbound::ComposeReply { .. } => (m, "compose_reply"),
            Outbound::SendReply { .. } => (m, "send_reply"),
            Outbound::DeleteDraft { .. } => (m, "delete_draft"),
            Outbound::DeleteMessage { .. } => (m, "delete_message"),
            Outbound::Stash { .. } => (m, "stash"),
            Outbound::Pin { .. } => (m, "pin"),
            Outbound::Unpin { .. } => (m, "unpin"),
            Outbound::Finish => (Some(MAIN_MODULE), "finish"),
        }
    }

    pub fn envelope(&self) -> Envelope {
        let (module, task) = self.route();
        let env = match module {
            Some(module) => Envelope::routed(module, task),
            None => Envelope::task(task),
        };
        match self {
            Outbound::Ping
            | Outbound::FetchNewerForwardOnly
            | Outbound::NewMessage
            | Outbound::Finish => env,
            Outbound::OpenFeed { filter } => match filter {
                Some(filt) => env.field("filt", filt.as_str()),
                None => env,
            },
            Outbound::FetchOlder { before } => match before {
                Some(id) => env.field("before_mid", id.0),
                None => env,
            },
            Outbound::FetchNewer { after } => match after {
                Some(id) => env.field("after_mid", id.0),
                None => env,
            },
            Outbound::SaveWip {
                message_id,
                content,
            } => env
                .field("message_id", message_id.0)
                .field("content", content.as_str()),
            Outbound::SendReply {
                message_id,
                parent_mid,
                to_sender_only,
            } => env
                .field("message_id", message_id.0)
                .field("parent_mid", parent_mid.0)
                .field("to_sender_only", if *to_sender_only { "1" } else { "0" }),
            Outbound::InjectedMessage { message_id }
            | Outbound::EditMessage { message_id }
            | Outbound::SendMessage { message_id }
            | Outbound::ComposeReply { message_id }
            | Outbound::DeleteDraft { message_id }
            | Outbound::DeleteMessage { message_id }
            | Outbound::Stash { message_id }
            | Outbound::Pin { message_id }
            | Outbound::Unpin { message_id } => env.field("message_id", message_id.0),
        }
    }
}
