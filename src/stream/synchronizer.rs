//! The feed synchronizer: where each incoming fragment goes.
//!
//! ## Placement rules
//! - A fragment whose element already exists is an edit: its reply children
//!   are lifted out, the element is replaced, and the lifted replies are put
//!   back immediately after it. The logical parent map still records them as
//!   replies, so `replies_of` is independent of where they physically sit.
//! - A fragment with a present parent goes inside the parent, before its end.
//! - Anything else goes at feed level: older pages are prepended in server
//!   order, newer pages and live messages are appended.
//!
//! ## Scroll anchoring
//! Prepending an older page records the feed height `H1` first and sets
//! `scrollTop = H2 - H1` afterwards, so the message the user was looking at
//! stays put.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::cursor::{BoundaryCursor, BoundaryState, Direction};
use super::{PINNED_CLASS, STASHED_CLASS};
use crate::config::ClientConfig;
use crate::dom::{subtree_ids, Document, Position};
use crate::error::{DomError, FeedError, Result};
use crate::protocol::{FeedReplace, Injection, MessageFragment, MessageId, Outbound};
use crate::timers::{TimerId, TimerKind, TimerQueue};

#[derive(Debug)]
pub struct StreamSynchronizer {
    feed: String,
    content: String,
    teaser: String,
    threshold: f64,
    stash_delay: Duration,
    stash_notice: String,
    older: BoundaryCursor,
    newer: BoundaryCursor,
    present: BTreeSet<MessageId>,
    /// reply id -> parent id, kept regardless of physical placement.
    parents: HashMap<MessageId, MessageId>,
    stashing: HashMap<MessageId, TimerId>,
    /// Elements created by `inline_reply_box`; only these may be refreshed.
    reply_boxes: HashSet<MessageId>,
    teasers: u64,
}

/// Ids of the direct children of `element` that are messages (attachment
/// strips and other decorations are skipped).
fn message_children<D: Document>(doc: &D, element: &str) -> Vec<String> {
    doc.child_ids(element)
        .into_iter()
        .filter(|id| MessageId::from_element_id(id).is_some())
        .collect()
}

impl StreamSynchronizer {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            feed: config.layout.feed.clone(),
            content: config.layout.content.clone(),
            teaser: config.layout.teaser.clone(),
            threshold: config.boundary_threshold_px,
            stash_delay: config.stash_removal_delay(),
            stash_notice: config.stash_notice.clone(),
            older: BoundaryCursor::default(),
            newer: BoundaryCursor::default(),
            present: BTreeSet::new(),
            parents: HashMap::new(),
            stashing: HashMap::new(),
            reply_boxes: HashSet::new(),
            teasers: 0,
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed
    }

    pub fn older_state(&self) -> BoundaryState {
        self.older.state()
    }

    pub fn newer_state(&self) -> BoundaryState {
        self.newer.state()
    }

    /// Live injections are appended only when the loaded window reaches the
    /// real newest message, i.e. the newer boundary is exhausted.
    pub fn live_accept(&self) -> bool {
        self.newer.is_exhausted()
    }

    pub fn is_present(&self, id: MessageId) -> bool {
        self.present.contains(&id)
    }

    pub fn present_ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.present.iter().copied()
    }

    pub fn parent_of(&self, id: MessageId) -> Option<MessageId> {
        self.parents.get(&id).copied()
    }

    pub fn replies_of(&self, id: MessageId) -> Vec<MessageId> {
        let mut replies: Vec<MessageId> = self
            .parents
            .iter()
            .filter(|(_, parent)| **parent == id)
            .map(|(reply, _)| *reply)
            .collect();
        replies.sort();
        replies
    }

    /// First or last feed-level message, the pagination edge for `direction`.
    /// A reply box for a not-yet-created message is never an edge.
    pub fn edge<D: Document>(&self, doc: &D, direction: Direction) -> Option<MessageId> {
        let mut top_level = message_children(doc, &self.feed)
            .into_iter()
            .filter_map(|id| MessageId::from_element_id(&id))
            .filter(|id| !id.is_new());
        match direction {
            Direction::Older => top_level.next(),
            Direction::Newer => top_level.last(),
        }
    }

    fn require_feed<D: Document>(&self, doc: &D) -> Result<()> {
        if doc.contains(&self.feed) {
            Ok(())
        } else {
            Err(DomError::NotFound(self.feed.clone()).into())
        }
    }

    fn forget_all(&mut self, timers: &mut TimerQueue) {
        for (_, timer) in self.stashing.drain() {
            timers.cancel(timer);
        }
        self.present.clear();
        self.parents.clear();
        self.reply_boxes.clear();
    }

    // -----------------------------------------------------------------------
    // Feed sessions
    // -----------------------------------------------------------------------

    /// Full feed replace; starts a new pagination session.
    pub fn replace_feed<D: Document>(
        &mut self,
        doc: &mut D,
        timers: &mut TimerQueue,
        feed: &FeedReplace,
    ) -> Result<Vec<Outbound>> {
        if doc.contains(&self.feed) {
            doc.set_inner_html(&self.feed, "")?;
        } else {
            doc.insert_html(&self.content, Position::BeforeEnd, &self.feed, "")?;
        }
        self.forget_all(timers);
        self.older.reset(feed.more_older);
        self.newer.reset(feed.more_newer);
        self.place_all(doc, &feed.messages, Direction::Newer);

        if feed.scroll_to_bottom {
            doc.scroll_to_bottom(&self.feed);
        } else {
            doc.set_scroll_top(&self.feed, 0.0);
        }
        info!(
            messages = feed.messages.len(),
            more_older = feed.more_older,
            more_newer = feed.more_newer,
            "feed replaced"
        );
        Ok(self.fill_viewport(doc).into_iter().collect())
    }

    /// The content container was replaced and the feed went with it.
    pub fn detach_feed(&mut self, timers: &mut TimerQueue) {
        self.forget_all(timers);
        self.older = BoundaryCursor::default();
        self.newer = BoundaryCursor::default();
    }

    /// Ask for newer content when the loaded feed does not fill the viewport.
    fn fill_viewport<D: Document>(&mut self, doc: &D) -> Option<Outbound> {
        if !doc.contains(&self.feed) {
            return None;
        }
        let short = doc.scroll_height(&self.feed) <= doc.client_height(&self.feed);
        (short && self.newer.begin_fetch()).then_some(Outbound::FetchNewerForwardOnly)
    }

    // -----------------------------------------------------------------------
    // Pagination
    // -----------------------------------------------------------------------

    /// Fetches the current scroll position calls for. Each cursor hands out
    /// at most one outstanding fetch.
    pub fn on_scroll<D: Document>(&mut self, doc: &D) -> Vec<Outbound> {
        let mut out = Vec::new();
        if !doc.contains(&self.feed) {
            return out;
        }
        if doc.scroll_top(&self.feed) <= self.threshold && self.older.begin_fetch() {
            out.push(Outbound::FetchOlder {
                before: self.edge(doc, Direction::Older),
            });
        }
        if doc.is_pinned_to_bottom(&self.feed, self.threshold) && self.newer.begin_fetch() {
            out.push(Outbound::FetchNewer {
                after: self.edge(doc, Direction::Newer),
            });
        }
        out
    }

    pub fn receive_older<D: Document>(
        &mut self,
        doc: &mut D,
        fragments: &[MessageFragment],
    ) -> Result<()> {
        self.older.content_received(fragments.len());
        if fragments.is_empty() {
            debug!("older boundary exhausted by empty page");
            return Ok(());
        }
        self.require_feed(doc)?;
        let before = doc.scroll_height(&self.feed);
        self.place_all(doc, fragments, Direction::Older);
        let after = doc.scroll_height(&self.feed);
        doc.set_scroll_top(&self.feed, after - before);
        Ok(())
    }

    pub fn receive_newer<D: Document>(
        &mut self,
        doc: &mut D,
        fragments: &[MessageFragment],
    ) -> Result<Option<Outbound>> {
        self.newer.content_received(fragments.len());
        if fragments.is_empty() {
            debug!("newer boundary exhausted by empty page");
            return Ok(None);
        }
        self.require_feed(doc)?;
        self.place_all(doc, fragments, Direction::Newer);
        Ok(self.fill_viewport(doc))
    }

    pub fn older_exhausted(&mut self) {
        self.older.exhaust();
    }

    pub fn newer_exhausted(&mut self) {
        self.newer.exhaust();
        debug!("newer boundary exhausted; accepting live messages");
    }

    fn place_all<D: Document>(
        &mut self,
        doc: &mut D,
        fragments: &[MessageFragment],
        direction: Direction,
    ) {
        let mut last_top_level: Option<String> = None;
        for fragment in fragments {
            if let Err(e) = self.place(doc, fragment, direction, &mut last_top_level) {
                warn!(message_id = %fragment.message_id, error = %e, "fragment skipped");
            }
        }
    }

    fn place<D: Document>(
        &mut self,
        doc: &mut D,
        fragment: &MessageFragment,
        direction: Direction,
        last_top_level: &mut Option<String>,
    ) -> Result<()> {
        let id = fragment.message_id;
        let element = id.element_id();
        if let Some(parent) = fragment.parent_id {
            self.parents.insert(id, parent);
        }
        if doc.contains(&element) {
            return self.edit_replace(doc, id, &fragment.content);
        }

        let parent = fragment
            .parent_id
            .map(MessageId::element_id)
            .filter(|p| doc.contains(p));
        match (parent, direction) {
            (Some(parent), _) => {
                doc.insert_html(&parent, Position::BeforeEnd, &element, &fragment.content)?;
            }
            (None, Direction::Older) => {
                // Older pages arrive oldest first: the first goes to the top,
                // each later one right after the previous.
                match last_top_level.as_deref() {
                    Some(previous) => {
                        doc.insert_html(previous, Position::AfterEnd, &element, &fragment.content)?
                    }
                    None => doc.insert_html(
                        &self.feed,
                        Position::AfterBegin,
                        &element,
                        &fragment.content,
                    )?,
                }
                *last_top_level = Some(element);
            }
            (None, Direction::Newer) => {
                doc.insert_html(&self.feed, Position::BeforeEnd, &element, &fragment.content)?;
            }
        }
        self.present.insert(id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Edits and live injection
    // -----------------------------------------------------------------------

    /// Replace an existing message, keeping its replies right after it.
    pub fn edit_replace<D: Document>(&mut self, doc: &mut D, id: MessageId, html: &str) -> Result<()> {
        let element = id.element_id();
        let replies = message_children(doc, &element);
        for reply in replies.iter().filter_map(|r| MessageId::from_element_id(r)) {
            self.parents.insert(reply, id);
        }
        let lifted = doc.detach(&element, &replies)?;
        doc.replace_html(&element, html)?;
        if !lifted.is_empty() {
            doc.attach(&element, Position::AfterEnd, lifted)?;
        }
        self.present.insert(id);
        debug!(message_id = %id, lifted = replies.len(), "message replaced");
        Ok(())
    }

    /// Apply a live message. Returns the acknowledgement to send when the
    /// message was actually placed as a new element.
    pub fn inject<D: Document>(&mut self, doc: &mut D, injection: &Injection) -> Result<Option<Outbound>> {
        let id = injection.new_mid;
        let element = id.element_id();
        let explicit_parent = injection.parent_mid.and_then(MessageId::non_zero);

        if doc.contains(&element) {
            if let Some(parent) = explicit_parent {
                self.parents.insert(id, parent);
            }
            self.edit_replace(doc, id, &injection.content)?;
            return Ok(None);
        }

        let reference = injection
            .reference_mid
            .non_zero()
            .filter(|r| doc.contains(&r.element_id()));
        let position = match injection.placement {
            Some(placement) => placement.position(),
            None => Some(Position::AfterEnd),
        };
        if let (Some(reference), Some(position)) = (reference, position) {
            let anchor = reference.element_id();
            doc.insert_html(&anchor, position, &element, &injection.content)?;
            let nested = matches!(position, Position::AfterBegin | Position::BeforeEnd);
            match explicit_parent.or(nested.then_some(reference)) {
                Some(parent) => {
                    self.parents.insert(id, parent);
                }
                None => {
                    self.parents.remove(&id);
                }
            }
            self.present.insert(id);
            doc.scroll_into_view(&self.feed, &anchor);
            return Ok(Some(Outbound::InjectedMessage { message_id: id }));
        }

        if self.live_accept() && doc.contains(&self.feed) {
            let pinned = doc.is_pinned_to_bottom(&self.feed, self.threshold);
            doc.insert_html(&self.feed, Position::BeforeEnd, &element, &injection.content)?;
            if let Some(parent) = explicit_parent {
                self.parents.insert(id, parent);
            }
            self.present.insert(id);
            if pinned {
                doc.scroll_to_bottom(&self.feed);
            }
            return Ok(Some(Outbound::InjectedMessage { message_id: id }));
        }

        debug!(message_id = %id, "live message deferred to pagination");
        Ok(None)
    }

    /// Remove a message and forget everything recorded for its subtree.
    pub fn remove<D: Document>(&mut self, doc: &mut D, timers: &mut TimerQueue, id: MessageId) -> bool {
        let element = id.element_id();
        if !doc.contains(&element) {
            return false;
        }
        for gone in subtree_ids(doc, &element)
            .iter()
            .filter_map(|e| MessageId::from_element_id(e))
        {
            self.present.remove(&gone);
            self.parents.remove(&gone);
            self.reply_boxes.remove(&gone);
            if let Some(timer) = self.stashing.remove(&gone) {
                timers.cancel(timer);
            }
        }
        doc.remove(&element)
    }

    // -----------------------------------------------------------------------
    // Stash and pin
    // -----------------------------------------------------------------------

    /// Lift the replies out, show the stash notice and schedule removal.
    pub fn stash<D: Document>(
        &mut self,
        doc: &mut D,
        timers: &mut TimerQueue,
        now: Instant,
        id: MessageId,
    ) -> Result<Outbound> {
        let element = id.element_id();
        if !doc.contains(&element) {
            return Err(FeedError::missing_message(id));
        }
        let replies = message_children(doc, &element);
        for reply in replies.iter().filter_map(|r| MessageId::from_element_id(r)) {
            self.parents.insert(reply, id);
        }
        let lifted = doc.detach(&element, &replies)?;
        if !lifted.is_empty() {
            doc.attach(&element, Position::AfterEnd, lifted)?;
        }
        doc.set_inner_html(&element, &self.stash_notice)?;
        doc.add_class(&element, STASHED_CLASS)?;

        let timer = timers.schedule(now, self.stash_delay, TimerKind::StashRemoval(id));
        if let Some(previous) = self.stashing.insert(id, timer) {
            timers.cancel(previous);
        }
        info!(message_id = %id, replies = replies.len(), "message stashed");
        Ok(Outbound::Stash { message_id: id })
    }

    /// The stash removal timer fired. The element goes only if it still shows
    /// the notice; an edit in the meantime keeps it.
    pub fn stash_expired<D: Document>(&mut self, doc: &mut D, timers: &mut TimerQueue, id: MessageId) -> bool {
        self.stashing.remove(&id);
        if !doc.has_class(&id.element_id(), STASHED_CLASS) {
            return false;
        }
        self.remove(doc, timers, id)
    }

    pub fn set_pinned<D: Document>(&mut self, doc: &mut D, id: MessageId, pinned: bool) -> Result<Outbound> {
        let element = id.element_id();
        if !doc.contains(&element) {
            return Err(FeedError::missing_message(id));
        }
        if pinned {
            doc.add_class(&element, PINNED_CLASS)?;
            Ok(Outbound::Pin { message_id: id })
        } else {
            doc.remove_class(&element, PINNED_CLASS)?;
            Ok(Outbound::Unpin { message_id: id })
        }
    }

    // -----------------------------------------------------------------------
    // Teasers, inline replies and attachments
    // -----------------------------------------------------------------------

    /// Prepend a teaser; returns its element id.
    pub fn deliver_teaser<D: Document>(&mut self, doc: &mut D, html: &str) -> Result<String> {
        self.teasers += 1;
        let id = format!("teaser_{}", self.teasers);
        doc.insert_html(&self.teaser, Position::AfterBegin, &id, html)?;
        Ok(id)
    }

    /// Insert (or refresh) an inline reply box and focus it. Returns the id
    /// the draft is saved under and the box's element id, which is the
    /// editable scope for the draft session.
    ///
    /// With a parent, `id` names the box itself. Without one, `id` is the
    /// message being replied to and the box stands for a message not yet
    /// created. Either way the box goes right after the message it answers,
    /// and an existing message element is never overwritten by a box.
    pub fn inline_reply_box<D: Document>(
        &mut self,
        doc: &mut D,
        id: MessageId,
        parent: MessageId,
        html: &str,
    ) -> Result<(MessageId, String)> {
        let (reply, anchor) = match parent.non_zero() {
            Some(parent) => (id, parent),
            None => (MessageId::NEW, id),
        };
        let element = reply.element_id();
        if doc.contains(&element) {
            if !self.reply_boxes.contains(&reply) {
                return Err(DomError::Duplicate(element).into());
            }
            // a pending box reopened under another message moves there
            if self.parents.get(&reply) != anchor.non_zero().as_ref() {
                doc.remove(&element);
            }
        }
        if doc.contains(&element) {
            doc.replace_html(&element, html)?;
        } else {
            match anchor.non_zero().map(MessageId::element_id).filter(|a| doc.contains(a)) {
                Some(after) => doc.insert_html(&after, Position::AfterEnd, &element, html)?,
                None => {
                    self.require_feed(doc)?;
                    doc.insert_html(&self.feed, Position::BeforeEnd, &element, html)?;
                }
            }
        }
        self.reply_boxes.insert(reply);
        if let Some(anchor) = anchor.non_zero() {
            self.parents.insert(reply, anchor);
        }
        if !reply.is_new() {
            self.present.insert(reply);
        }
        doc.focus(&element)?;
        doc.scroll_into_view(&self.feed, &element);
        Ok((reply, element))
    }

    pub fn has_reply_box(&self, id: MessageId) -> bool {
        self.reply_boxes.contains(&id)
    }

    /// Swap a finished reply box for the rendered message. A pending box
    /// for a not-yet-created message hands its place and parent to `id`.
    pub fn complete_reply<D: Document>(&mut self, doc: &mut D, id: MessageId, html: &str) -> Result<()> {
        let element = id.element_id();
        self.reply_boxes.remove(&id);
        if doc.contains(&element) {
            return self.edit_replace(doc, id, html);
        }
        let pending = MessageId::NEW.element_id();
        if self.reply_boxes.remove(&MessageId::NEW) && doc.contains(&pending) {
            doc.insert_html(&pending, Position::AfterEnd, &element, html)?;
            doc.remove(&pending);
            if let Some(parent) = self.parents.remove(&MessageId::NEW) {
                self.parents.insert(id, parent);
            }
        } else {
            self.require_feed(doc)?;
            doc.insert_html(&self.feed, Position::BeforeEnd, &element, html)?;
        }
        self.present.insert(id);
        Ok(())
    }

    /// Drop the reply box answering or named by `id`. Returns the id the
    /// box's draft was saved under.
    pub fn remove_reply_box<D: Document>(
        &mut self,
        doc: &mut D,
        timers: &mut TimerQueue,
        id: MessageId,
    ) -> Option<MessageId> {
        if self.reply_boxes.contains(&id) {
            return self.remove(doc, timers, id).then_some(id);
        }
        let pending = self.reply_boxes.contains(&MessageId::NEW)
            && self.parents.get(&MessageId::NEW) == Some(&id);
        if !pending {
            return None;
        }
        self.reply_boxes.remove(&MessageId::NEW);
        self.parents.remove(&MessageId::NEW);
        doc.remove(&MessageId::NEW.element_id()).then_some(MessageId::NEW)
    }

    /// Fill the attachment strip of `id`, creating it at the end of the
    /// message element (or of `fallback` when the message is not in the feed,
    /// e.g. while it is open in the dialog editor).
    pub fn files_uploaded<D: Document>(
        &mut self,
        doc: &mut D,
        id: MessageId,
        html: &str,
        fallback: &str,
    ) -> Result<()> {
        let strip = id.attachments_id();
        if doc.contains(&strip) {
            doc.set_inner_html(&strip, html)?;
            return Ok(());
        }
        let element = id.element_id();
        let host = if doc.contains(&element) {
            element.as_str()
        } else {
            fallback
        };
        doc.insert_html(host, Position::BeforeEnd, &strip, html)?;
        Ok(())
    }
}
