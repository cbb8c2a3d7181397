//! The client: one owner for the document, the transport and every piece of
//! synchronization state.
//!
//! Everything runs on one task. Inbound frames go through
//! [`Client::handle_text`] (see `dispatch.rs` for the handler table), user
//! actions are the public methods below, and the session loop calls
//! [`Client::fire_due`] whenever [`Client::next_deadline`] passes. No method
//! here awaits; all waiting happens in the loop.

use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::dom::Document;
use crate::draft::DraftCoordinator;
use crate::error::{FeedError, Result};
use crate::protocol::{FileMeta, MessageId, Outbound, MESSAGES_MODULE};
use crate::stream::StreamSynchronizer;
use crate::timers::{TimerId, TimerKind, TimerQueue};
use crate::transport::{Socket, Transport};
use crate::upload::UploadMultiplexer;

/// Answers the "are you sure?" question before a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Confirms everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

pub struct Client<D, S> {
    pub(crate) config: ClientConfig,
    pub(crate) doc: D,
    pub(crate) transport: Transport<S>,
    pub(crate) stream: StreamSynchronizer,
    pub(crate) drafts: DraftCoordinator,
    pub(crate) uploads: UploadMultiplexer,
    pub(crate) timers: TimerQueue,
    pub(crate) filter: Option<String>,
    heartbeat: Option<TimerId>,
}

impl<D: Document, S: Socket> Client<D, S> {
    pub fn new(config: ClientConfig, doc: D, socket: S) -> Self {
        let stream = StreamSynchronizer::new(&config);
        let drafts = DraftCoordinator::new(config.autosave_interval());
        Self {
            filter: config.initial_filter.clone(),
            config,
            doc,
            transport: Transport::new(socket),
            stream,
            drafts,
            uploads: UploadMultiplexer::new(),
            timers: TimerQueue::new(),
            heartbeat: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn doc(&self) -> &D {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    pub fn stream(&self) -> &StreamSynchronizer {
        &self.stream
    }

    pub fn drafts(&self) -> &DraftCoordinator {
        &self.drafts
    }

    pub fn uploads(&self) -> &UploadMultiplexer {
        &self.uploads
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn reload_requested(&self) -> bool {
        self.transport.reload_requested()
    }

    // -----------------------------------------------------------------------
    // Lifecycle and time
    // -----------------------------------------------------------------------

    /// Arm the heartbeat and ask for the feed.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.heartbeat.is_none() {
            let period = self.config.heartbeat_interval();
            self.heartbeat = Some(self.timers.schedule_repeating(now, period, TimerKind::Heartbeat));
        }
        let filter = self.filter.clone();
        self.open_feed(filter)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run every timer due at `now`.
    pub fn fire_due(&mut self, now: Instant) -> Result<()> {
        for (id, kind) in self.timers.pop_due(now) {
            match kind {
                TimerKind::Heartbeat => {
                    self.transport.heartbeat()?;
                }
                TimerKind::Autosave => {
                    if let Some(save) = self.drafts.tick(&self.doc, id) {
                        self.transport.send_action(&save)?;
                    }
                }
                TimerKind::StashRemoval(message_id) => {
                    if self
                        .stream
                        .stash_expired(&mut self.doc, &mut self.timers, message_id)
                    {
                        debug!(message_id = %message_id, "stashed message removed");
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn send(&mut self, action: &Outbound) -> Result<()> {
        self.transport.send_action(action)
    }

    pub(crate) fn send_all(&mut self, actions: impl IntoIterator<Item = Outbound>) -> Result<()> {
        for action in actions {
            self.send(&action)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Feed navigation
    // -----------------------------------------------------------------------

    pub fn open_feed(&mut self, filter: Option<String>) -> Result<()> {
        self.filter = filter.clone();
        self.send(&Outbound::OpenFeed { filter })
    }

    /// The user scrolled the feed to `top`.
    pub fn scroll_to(&mut self, top: f64) -> Result<()> {
        let feed = self.stream.feed_id().to_owned();
        self.doc.set_scroll_top(&feed, top);
        self.on_scroll()
    }

    pub fn scroll_to_bottom(&mut self) -> Result<()> {
        let feed = self.stream.feed_id().to_owned();
        self.doc.scroll_to_bottom(&feed);
        self.on_scroll()
    }

    /// Scroll event: request whatever boundary the position exposes.
    pub fn on_scroll(&mut self) -> Result<()> {
        let fetches = self.stream.on_scroll(&self.doc);
        self.send_all(fetches)
    }

    // -----------------------------------------------------------------------
    // Composing
    // -----------------------------------------------------------------------

    pub fn new_message(&mut self) -> Result<()> {
        self.send(&Outbound::NewMessage)
    }

    pub fn edit_message(&mut self, message_id: MessageId) -> Result<()> {
        self.send(&Outbound::EditMessage { message_id })
    }

    /// Flush the open draft and send it. Returns `false` with no draft open.
    pub fn send_message(&mut self) -> Result<bool> {
        let Some(message_id) = self.active_draft() else {
            warn!("send requested with no draft open");
            return Ok(false);
        };
        self.close_draft()?;
        self.send(&Outbound::SendMessage { message_id })?;
        Ok(true)
    }

    /// Flush the open draft and leave the editor, keeping the draft.
    pub fn save_draft(&mut self) -> Result<bool> {
        if self.active_draft().is_none() {
            warn!("save requested with no draft open");
            return Ok(false);
        }
        self.close_draft()?;
        self.send(&Outbound::Finish)?;
        Ok(true)
    }

    pub fn compose_reply(&mut self, parent: MessageId) -> Result<()> {
        self.send(&Outbound::ComposeReply { message_id: parent })
    }

    /// Flush the open reply draft and send it.
    pub fn send_reply(&mut self, to_sender_only: bool) -> Result<bool> {
        let Some(message_id) = self.active_draft() else {
            warn!("reply requested with no draft open");
            return Ok(false);
        };
        let parent_mid = self.stream.parent_of(message_id).unwrap_or(MessageId::NEW);
        self.close_draft()?;
        self.send(&Outbound::SendReply {
            message_id,
            parent_mid,
            to_sender_only,
        })?;
        Ok(true)
    }

    /// Throw the open draft away. Nothing is sent unless `confirm` agrees.
    pub fn delete_draft(&mut self, confirm: &mut impl Confirm) -> Result<bool> {
        let Some(message_id) = self.active_draft() else {
            return Ok(false);
        };
        if !confirm.confirm("Delete this draft?") {
            debug!(message_id = %message_id, "draft deletion declined");
            return Ok(false);
        }
        self.drafts.discard(&mut self.timers);
        self.send(&Outbound::DeleteDraft { message_id })?;
        Ok(true)
    }

    fn active_draft(&self) -> Option<MessageId> {
        self.drafts.active().map(|s| s.message_id)
    }

    /// Close the draft session, sending its final save if the content changed.
    pub(crate) fn close_draft(&mut self) -> Result<()> {
        if let Some(save) = self.drafts.close(&self.doc, &mut self.timers) {
            self.send(&save)?;
        }
        Ok(())
    }

    /// Open a draft session on `scope`, flushing whichever one was open.
    pub(crate) fn open_draft(&mut self, now: Instant, scope: String, message_id: MessageId) -> Result<()> {
        if let Some(save) = self
            .drafts
            .open(&self.doc, &mut self.timers, now, scope, message_id)
        {
            self.send(&save)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Message actions
    // -----------------------------------------------------------------------

    /// Ask the server to delete a message. The element goes when the server
    /// answers with `remove_message`.
    pub fn delete_message(&mut self, message_id: MessageId, confirm: &mut impl Confirm) -> Result<bool> {
        if !confirm.confirm(&format!("Delete message {message_id}?")) {
            debug!(message_id = %message_id, "message deletion declined");
            return Ok(false);
        }
        self.send(&Outbound::DeleteMessage { message_id })?;
        Ok(true)
    }

    pub fn stash(&mut self, message_id: MessageId, now: Instant) -> Result<()> {
        let action = self
            .stream
            .stash(&mut self.doc, &mut self.timers, now, message_id)?;
        self.send(&action)
    }

    pub fn pin(&mut self, message_id: MessageId) -> Result<()> {
        let action = self.stream.set_pinned(&mut self.doc, message_id, true)?;
        self.send(&action)
    }

    pub fn unpin(&mut self, message_id: MessageId) -> Result<()> {
        let action = self.stream.set_pinned(&mut self.doc, message_id, false)?;
        self.send(&action)
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Start an upload batch for the files (metadata in call order). The
    /// caller reads the files and reports each with [`Client::file_read`].
    pub fn upload(&mut self, partition_id: u64, files: Vec<FileMeta>) -> Option<Uuid> {
        self.uploads.begin(MESSAGES_MODULE, partition_id, files)
    }

    /// One read finished. The frame goes out when the batch is complete; a
    /// failed read aborts the batch and shows an error banner.
    pub fn file_read(
        &mut self,
        batch: Uuid,
        index: usize,
        outcome: std::result::Result<Vec<u8>, String>,
    ) -> Result<()> {
        match self.uploads.read_completed(batch, index, outcome) {
            Ok(Some(frame)) => {
                info!(batch = %batch, bytes = frame.len(), "upload frame sent");
                self.transport.send_upload(frame)
            }
            Ok(None) => Ok(()),
            Err(e @ (FeedError::UploadRead { .. } | FeedError::UploadSizeMismatch { .. })) => {
                self.show_error_banner(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn show_error_banner(&mut self, err: &FeedError) {
        let banner = self.config.layout.banner.clone();
        let html = format!("<div class=\"error\">{err}</div>");
        if let Err(e) = self.doc.set_inner_html(&banner, &html) {
            warn!(error = %e, "could not show error banner");
        }
    }
}
