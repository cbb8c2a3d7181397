//! Draft autosave.
//!
//! One [`DraftSession`] at a time: the editable scope being watched, the
//! message it belongs to, the last content sent and the repeating autosave
//! timer. Ticks send `save_wip` only when the content differs from the last
//! snapshot; closing does one final compare-and-send, discarding does not.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::dom::Document;
use crate::protocol::{MessageId, Outbound};
use crate::timers::{TimerId, TimerKind, TimerQueue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSession {
    /// Element whose editable content is the draft.
    pub scope: String,
    pub message_id: MessageId,
    last_sent: String,
    timer: TimerId,
}

impl DraftSession {
    pub fn last_sent(&self) -> &str {
        &self.last_sent
    }

    pub fn timer(&self) -> TimerId {
        self.timer
    }

    /// `save_wip` for the current content, if it changed since the last send.
    fn snapshot<D: Document>(&mut self, doc: &D) -> Option<Outbound> {
        let content = doc.editable_content(&self.scope)?;
        if content == self.last_sent {
            return None;
        }
        self.last_sent = content.clone();
        Some(Outbound::SaveWip {
            message_id: self.message_id,
            content,
        })
    }
}

#[derive(Debug)]
pub struct DraftCoordinator {
    interval: Duration,
    active: Option<DraftSession>,
}

impl DraftCoordinator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&DraftSession> {
        self.active.as_ref()
    }

    pub fn is_editing(&self, message_id: MessageId) -> bool {
        self.active.as_ref().is_some_and(|s| s.message_id == message_id)
    }

    /// Start watching `scope`. A session already open is closed first; the
    /// returned `save_wip` (if any) is its final flush.
    pub fn open<D: Document>(
        &mut self,
        doc: &D,
        timers: &mut TimerQueue,
        now: Instant,
        scope: impl Into<String>,
        message_id: MessageId,
    ) -> Option<Outbound> {
        let flush = self.close(doc, timers);
        let timer = timers.schedule_repeating(now, self.interval, TimerKind::Autosave);
        let scope = scope.into();
        debug!(message_id = %message_id, scope = %scope, "draft session opened");
        self.active = Some(DraftSession {
            scope,
            message_id,
            last_sent: String::new(),
            timer,
        });
        flush
    }

    /// Autosave timer fired. Timers that do not belong to the open session
    /// are ignored.
    pub fn tick<D: Document>(&mut self, doc: &D, timer: TimerId) -> Option<Outbound> {
        let session = self.active.as_mut().filter(|s| s.timer == timer)?;
        session.snapshot(doc)
    }

    /// End the session with one last compare-and-send.
    pub fn close<D: Document>(&mut self, doc: &D, timers: &mut TimerQueue) -> Option<Outbound> {
        let mut session = self.active.take()?;
        timers.cancel(session.timer);
        debug!(message_id = %session.message_id, "draft session closed");
        session.snapshot(doc)
    }

    /// End the session without flushing.
    pub fn discard(&mut self, timers: &mut TimerQueue) -> Option<DraftSession> {
        let session = self.active.take()?;
        timers.cancel(session.timer);
        debug!(message_id = %session.message_id, "draft session discarded");
        Some(session)
    }
}
