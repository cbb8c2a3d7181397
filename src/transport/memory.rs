//! In-memory [`Socket`] that records every frame, for tests and dry runs.

use serde_json::Value;

use super::{BinaryType, ReadyState, Socket};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum SentFrame {
    Text(String),
    Binary {
        bytes: Vec<u8>,
        /// Binary type in effect when the frame went out.
        binary_type: BinaryType,
    },
}

#[derive(Debug, Clone)]
pub struct MemorySocket {
    state: ReadyState,
    binary_type: BinaryType,
    sent: Vec<SentFrame>,
}

impl MemorySocket {
    pub fn open() -> Self {
        Self {
            state: ReadyState::Open,
            binary_type: BinaryType::default(),
            sent: Vec::new(),
        }
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.state = state;
    }

    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    /// Text frames parsed as JSON, in send order. Unparseable text is skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .iter()
            .filter_map(|frame| match frame {
                SentFrame::Text(text) => serde_json::from_str(text).ok(),
                SentFrame::Binary { .. } => None,
            })
            .collect()
    }

    /// `task` of every text frame, in send order.
    pub fn sent_tasks(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|v| v.get("task").and_then(Value::as_str).map(str::to_owned))
            .collect()
    }

    pub fn take_sent(&mut self) -> Vec<SentFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl Socket for MemorySocket {
    fn ready_state(&self) -> ReadyState {
        self.state
    }

    fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.push(SentFrame::Text(text));
        Ok(())
    }

    fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.sent.push(SentFrame::Binary {
            bytes,
            binary_type: self.binary_type,
        });
        Ok(())
    }

    fn binary_type(&self) -> BinaryType {
        self.binary_type
    }

    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.binary_type = binary_type;
    }
}
