//! The single duplex connection.
//!
//! [`Transport`] frames outgoing envelopes and upload frames onto a
//! [`Socket`]. A send on a socket that is not open is fatal: the transport
//! records a reload request and returns [`FeedError::ConnectionLost`]. There
//! is no retry and no buffering; the session loop sees the flag, ends the
//! session and the binary reconnects with fresh state.
//!
//! The heartbeat is fire-and-forget: `ping` goes out only while the socket is
//! open, nobody waits for `pong`, and a closed socket at heartbeat time is
//! skipped without asking for a reload.

pub mod memory;
pub mod ws;

pub use memory::{MemorySocket, SentFrame};
pub use ws::{WireEvent, WsSocket};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{FeedError, Result};
use crate::protocol::{Envelope, Outbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// How the socket surfaces binary payloads. Uploads switch to
/// `ArrayBuffer` for the duration of the send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryType {
    #[default]
    Blob,
    ArrayBuffer,
}

/// What the transport needs from a connection.
pub trait Socket {
    fn ready_state(&self) -> ReadyState;
    fn send_text(&mut self, text: String) -> Result<()>;
    fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()>;
    fn binary_type(&self) -> BinaryType;
    fn set_binary_type(&mut self, binary_type: BinaryType);
}

#[derive(Debug)]
pub struct Transport<S> {
    socket: S,
    reload_reason: Option<String>,
    frames_sent: u64,
}

impl<S: Socket> Transport<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            reload_reason: None,
            frames_sent: 0,
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn is_open(&self) -> bool {
        self.socket.ready_state() == ReadyState::Open
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_reason.is_some()
    }

    pub fn reload_reason(&self) -> Option<&str> {
        self.reload_reason.as_deref()
    }

    /// Ask for a full reload. The first reason wins.
    pub fn request_reload(&mut self, reason: impl Into<String>) {
        if self.reload_reason.is_none() {
            let reason = reason.into();
            warn!(reason = %reason, "reload requested");
            self.reload_reason = Some(reason);
        }
    }

    /// Send one typed action.
    pub fn send_action(&mut self, action: &Outbound) -> Result<()> {
        self.send_envelope(&action.envelope())
    }

    /// `{task, ...fields}` without a module.
    pub fn send(&mut self, task: &str, fields: Map<String, Value>) -> Result<()> {
        self.send_envelope(&Envelope::task(task).with_fields(fields))
    }

    /// `{module, task, ...fields}`.
    pub fn send_task(&mut self, module: &str, task: &str, fields: Map<String, Value>) -> Result<()> {
        self.send_envelope(&Envelope::routed(module, task).with_fields(fields))
    }

    pub fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        self.ensure_open(&envelope.task)?;
        let text = envelope.to_text()?;
        debug!(task = %envelope.task, module = ?envelope.module, "send");
        self.deliver(|socket| socket.send_text(text))
    }

    /// Liveness ping. Returns whether it was sent.
    pub fn heartbeat(&mut self) -> Result<bool> {
        if !self.is_open() {
            debug!(state = ?self.socket.ready_state(), "heartbeat skipped");
            return Ok(false);
        }
        self.send_action(&Outbound::Ping)?;
        Ok(true)
    }

    /// Send a binary upload frame, restoring the socket's binary type after.
    pub fn send_upload(&mut self, frame: Vec<u8>) -> Result<()> {
        self.ensure_open("upload_files")?;
        let prior = self.socket.binary_type();
        self.socket.set_binary_type(BinaryType::ArrayBuffer);
        debug!(bytes = frame.len(), "send upload frame");
        let sent = self.deliver(|socket| socket.send_binary(frame));
        self.socket.set_binary_type(prior);
        sent
    }

    fn ensure_open(&mut self, task: &str) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.request_reload(format!(
            "socket {:?} while sending '{task}'",
            self.socket.ready_state()
        ));
        Err(FeedError::ConnectionLost)
    }

    fn deliver(&mut self, send: impl FnOnce(&mut S) -> Result<()>) -> Result<()> {
        match send(&mut self.socket) {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    self.request_reload(e.to_string());
                }
                Err(e)
            }
        }
    }
}
