//! Document abstraction.
//!
//! The synchronizer never touches HTML itself: it asks a [`Document`] to
//! look elements up by id, splice opaque fragments in at a position, move
//! existing subtrees around, toggle classes and report scroll geometry.
//! [`MemoryDocument`] is the bundled implementation; a live-DOM binding
//! implements the same trait over real elements.

pub mod memory;

pub use memory::MemoryDocument;

use serde::{Deserialize, Serialize};

use crate::error::DomError;

/// Insert-adjacent positions relative to an anchor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Sibling immediately before the anchor.
    BeforeBegin,
    /// First child of the anchor.
    AfterBegin,
    /// Last child of the anchor.
    BeforeEnd,
    /// Sibling immediately after the anchor.
    AfterEnd,
}

/// Capabilities the client needs from the page.
///
/// `id` arguments on insertion name the element the fragment renders as;
/// a live-DOM implementation finds it inside the fragment, the in-memory one
/// takes it as given.
pub trait Document {
    /// A subtree detached by [`Document::detach`], ready to be re-attached.
    type Detached;

    fn contains(&self, id: &str) -> bool;

    /// Insert `html` as element `id` at `position` relative to `anchor`.
    fn insert_html(
        &mut self,
        anchor: &str,
        position: Position,
        id: &str,
        html: &str,
    ) -> Result<(), DomError>;

    /// Replace the whole element (outer replacement): content, classes and
    /// children are discarded; id and position are kept.
    fn replace_html(&mut self, id: &str, html: &str) -> Result<(), DomError>;

    /// Replace the element's content and children, keeping its classes.
    fn set_inner_html(&mut self, id: &str, html: &str) -> Result<(), DomError>;

    /// Remove the element and its subtree. Returns whether it existed.
    fn remove(&mut self, id: &str) -> bool;

    /// Ids of the direct child elements, in order.
    fn child_ids(&self, id: &str) -> Vec<String>;

    /// Detach the listed direct children of `parent`, preserving their order
    /// and subtrees. Ids that are not children of `parent` are skipped.
    fn detach(&mut self, parent: &str, children: &[String]) -> Result<Vec<Self::Detached>, DomError>;

    /// Re-attach detached subtrees at `position` relative to `anchor`, in order.
    fn attach(
        &mut self,
        anchor: &str,
        position: Position,
        nodes: Vec<Self::Detached>,
    ) -> Result<(), DomError>;

    fn add_class(&mut self, id: &str, class: &str) -> Result<(), DomError>;
    fn remove_class(&mut self, id: &str, class: &str) -> Result<(), DomError>;
    fn has_class(&self, id: &str, class: &str) -> bool;

    fn focus(&mut self, id: &str) -> Result<(), DomError>;

    /// Current content of the editable region inside `scope`, or `None` when
    /// the scope is gone.
    fn editable_content(&self, scope: &str) -> Option<String>;

    // -- scroll geometry of a scrolling container --

    fn scroll_top(&self, container: &str) -> f64;
    fn set_scroll_top(&mut self, container: &str, top: f64);
    fn scroll_height(&self, container: &str) -> f64;
    fn client_height(&self, container: &str) -> f64;

    /// `(offset from top of scrolled content, height)` of `id` inside `container`.
    fn element_box(&self, container: &str, id: &str) -> Option<(f64, f64)>;

    /// Whether the user is scrolled to (within `tolerance` of) the bottom.
    fn is_pinned_to_bottom(&self, container: &str, tolerance: f64) -> bool {
        let top = self.scroll_top(container);
        top + self.client_height(container) >= self.scroll_height(container) - tolerance
    }

    /// Whether any part of `id` is inside the visible window.
    fn is_in_view(&self, container: &str, id: &str) -> bool {
        let Some((offset, height)) = self.element_box(container, id) else {
            return false;
        };
        let top = self.scroll_top(container);
        let bottom = top + self.client_height(container);
        offset < bottom && offset + height > top
    }

    /// Scroll the least distance that brings `id` into view; no-op when it is
    /// already visible. Returns whether the scroll position changed.
    fn scroll_into_view(&mut self, container: &str, id: &str) -> bool {
        if self.is_in_view(container, id) {
            return false;
        }
        let Some((offset, height)) = self.element_box(container, id) else {
            return false;
        };
        let top = self.scroll_top(container);
        let target = if offset < top {
            offset
        } else {
            offset + height - self.client_height(container)
        };
        self.set_scroll_top(container, target);
        true
    }

    fn scroll_to_bottom(&mut self, container: &str) {
        let height = self.scroll_height(container);
        self.set_scroll_top(container, height);
    }
}

/// Ids of `id` and every element below it, depth first.
pub fn subtree_ids<D: Document + ?Sized>(doc: &D, id: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![id.to_owned()];
    while let Some(next) = stack.pop() {
        let children = doc.child_ids(&next);
        out.push(next);
        stack.extend(children.into_iter().rev());
    }
    out
}
