//! Inbound handler table.
//!
//! [`Client::handle_text`] decodes one text frame and routes it by task.
//! Failure policy:
//! - undecodable frames (bad JSON, no `task`, bad fields) are logged and dropped;
//! - unknown tasks are logged at error level and dropped;
//! - document errors inside a handler (usually a missing element) are logged
//!   at warn level and the frame is skipped;
//! - fatal errors (the socket went away mid-handler) propagate so the
//!   session loop can end the session.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::dom::Document;
use crate::error::Result;
use crate::protocol::{decode, FeedReplace, InboundFrame, InboundTask, MessageFragment, MessageId};
use crate::transport::Socket;

const HIDE_CLASS: &str = "hide";

impl<D: Document, S: Socket> Client<D, S> {
    /// Handle one inbound text frame.
    pub fn handle_text(&mut self, text: &str, now: Instant) -> Result<()> {
        match decode(text) {
            Ok(frame) => self.dispatch(frame, now),
            Err(e) => {
                warn!(error = %e, "inbound frame dropped");
                Ok(())
            }
        }
    }

    /// The server never sends binary frames to this client.
    pub fn handle_binary(&mut self, bytes: &[u8]) {
        debug!(bytes = bytes.len(), "unexpected binary frame ignored");
    }

    pub fn dispatch(&mut self, frame: InboundFrame, now: Instant) -> Result<()> {
        let InboundFrame { tag, task } = frame;
        debug!(task = %tag, "inbound");
        let handled = match task {
            InboundTask::Content { content } => self.on_content(&content),
            InboundTask::SubContent { container, content } => {
                self.set_container(&container, &content)
            }
            InboundTask::Banner { content } => {
                let banner = self.config.layout.banner.clone();
                self.set_container(&banner, &content)
            }
            InboundTask::DetailBanner { content } => {
                let detail = self.config.layout.detail_banner.clone();
                self.set_container(&detail, &content)
            }
            InboundTask::Dialog { content } => self.show_dialog(&content),
            InboundTask::HideDialog => self.hide_dialog(),
            InboundTask::EditMessage {
                content,
                message_id,
            } => self.on_edit_message(&content, message_id, now),
            InboundTask::Messages(feed) => self.on_messages(&feed),
            InboundTask::MoreOldMessages { messages } => self.on_more_old(&messages),
            InboundTask::MoreNewMessages { messages } => self.on_more_new(&messages),
            InboundTask::NoMoreOldMessages => {
                self.stream.older_exhausted();
                Ok(())
            }
            InboundTask::NoMoreNewMessages => {
                self.stream.newer_exhausted();
                Ok(())
            }
            InboundTask::DeliverMessageTeaser { teaser } => self
                .stream
                .deliver_teaser(&mut self.doc, &teaser)
                .map(|_| ()),
            InboundTask::InjectDeliverNewMessage(injection) => {
                match self.stream.inject(&mut self.doc, &injection) {
                    Ok(Some(ack)) => self.send(&ack),
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            InboundTask::RemoveMessage { message_id } => {
                self.on_remove(message_id);
                Ok(())
            }
            InboundTask::InlineReplyBox {
                content,
                message_id,
                parent_mid,
            } => self.on_inline_reply_box(&content, message_id, parent_mid, now),
            InboundTask::RemoveReplyContainer { message_id } => {
                self.on_remove_reply_container(message_id);
                Ok(())
            }
            InboundTask::PostCompletedReply {
                content,
                message_id,
            } => self.on_post_completed_reply(&content, message_id),
            InboundTask::FilesUploaded {
                content,
                message_id,
            } => {
                let dialog = self.config.layout.dialog.clone();
                self.stream
                    .files_uploaded(&mut self.doc, message_id, &content, &dialog)
            }
            InboundTask::Reload => {
                self.transport.request_reload("server requested reload");
                Ok(())
            }
            InboundTask::Pong => {
                debug!("pong");
                Ok(())
            }
            InboundTask::Unrecognized => {
                error!(task = %tag, "unrecognized task ignored");
                Ok(())
            }
        };

        match handled {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(task = %tag, error = %e, "handler skipped");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Containers and dialog
    // -----------------------------------------------------------------------

    /// Replace a named container. One that held the feed takes it along.
    fn set_container(&mut self, container: &str, html: &str) -> Result<()> {
        let feed = self.stream.feed_id().to_owned();
        let had_feed = self.doc.contains(&feed);
        self.doc.set_inner_html(container, html)?;
        if had_feed && !self.doc.contains(&feed) {
            self.stream.detach_feed(&mut self.timers);
        }
        self.prune_draft();
        Ok(())
    }

    /// Main content replaced: the feed (if it was there) is gone with it.
    fn on_content(&mut self, html: &str) -> Result<()> {
        let content = self.config.layout.content.clone();
        self.doc.set_inner_html(&content, html)?;
        self.stream.detach_feed(&mut self.timers);
        self.prune_draft();
        Ok(())
    }

    /// Drop the draft session if its editable scope left the document.
    fn prune_draft(&mut self) {
        let gone = self
            .drafts
            .active()
            .is_some_and(|s| !self.doc.contains(&s.scope));
        if gone {
            self.drafts.discard(&mut self.timers);
        }
    }

    fn show_dialog(&mut self, html: &str) -> Result<()> {
        let layout = &self.config.layout;
        let (dialog, gray) = (layout.dialog.clone(), layout.gray_screen.clone());
        if self.drafts.active().is_some_and(|s| s.scope == dialog) {
            self.close_draft()?;
        }
        self.doc.set_inner_html(&dialog, html)?;
        self.doc.remove_class(&dialog, HIDE_CLASS)?;
        self.doc.remove_class(&gray, HIDE_CLASS)?;
        Ok(())
    }

    fn hide_dialog(&mut self) -> Result<()> {
        let layout = &self.config.layout;
        let (dialog, gray) = (layout.dialog.clone(), layout.gray_screen.clone());
        if self.drafts.active().is_some_and(|s| s.scope == dialog) {
            self.close_draft()?;
        }
        self.doc.add_class(&dialog, HIDE_CLASS)?;
        self.doc.add_class(&gray, HIDE_CLASS)?;
        Ok(())
    }

    fn on_edit_message(&mut self, html: &str, message_id: MessageId, now: Instant) -> Result<()> {
        self.show_dialog(html)?;
        let dialog = self.config.layout.dialog.clone();
        self.doc.focus(&dialog)?;
        self.open_draft(now, dialog, message_id)
    }

    // -----------------------------------------------------------------------
    // Feed
    // -----------------------------------------------------------------------

    fn on_messages(&mut self, feed: &FeedReplace) -> Result<()> {
        let fetches = self
            .stream
            .replace_feed(&mut self.doc, &mut self.timers, feed)?;
        if let Some(filt) = &feed.filt {
            self.filter = Some(filt.clone());
        }
        if let Some(banner) = &feed.filter_banner {
            let filter = self.config.layout.filter.clone();
            self.doc.set_inner_html(&filter, banner)?;
        }
        self.send_all(fetches)
    }

    fn on_more_old(&mut self, messages: &[MessageFragment]) -> Result<()> {
        self.stream.receive_older(&mut self.doc, messages)
    }

    fn on_more_new(&mut self, messages: &[MessageFragment]) -> Result<()> {
        if let Some(fetch) = self.stream.receive_newer(&mut self.doc, messages)? {
            self.send(&fetch)?;
        }
        Ok(())
    }

    /// `remove_message` and `remove_reply_container`: any draft on the
    /// element is discarded unsaved.
    fn on_remove(&mut self, message_id: MessageId) {
        if self.drafts.is_editing(message_id) {
            self.drafts.discard(&mut self.timers);
        }
        if !self.stream.remove(&mut self.doc, &mut self.timers, message_id) {
            debug!(message_id = %message_id, "remove for absent message");
        }
    }

    // -----------------------------------------------------------------------
    // Inline replies
    // -----------------------------------------------------------------------

    fn on_inline_reply_box(
        &mut self,
        html: &str,
        message_id: MessageId,
        parent: MessageId,
        now: Instant,
    ) -> Result<()> {
        let (reply, scope) = self
            .stream
            .inline_reply_box(&mut self.doc, message_id, parent, html)?;
        info!(message_id = %message_id, parent = %parent, scope = %scope, "reply box opened");
        self.open_draft(now, scope, reply)
    }

    fn on_remove_reply_container(&mut self, message_id: MessageId) {
        match self
            .stream
            .remove_reply_box(&mut self.doc, &mut self.timers, message_id)
        {
            Some(reply) => {
                if self.drafts.is_editing(reply) {
                    self.drafts.discard(&mut self.timers);
                }
            }
            None => self.on_remove(message_id),
        }
    }

    fn on_post_completed_reply(&mut self, html: &str, message_id: MessageId) -> Result<()> {
        let pending = self.stream.has_reply_box(MessageId::NEW);
        if self.drafts.is_editing(message_id) || (pending && self.drafts.is_editing(MessageId::NEW)) {
            self.close_draft()?;
        }
        self.stream.complete_reply(&mut self.doc, message_id, html)?;
        let feed = self.stream.feed_id().to_owned();
        self.doc.scroll_into_view(&feed, &message_id.element_id());
        Ok(())
    }
}

