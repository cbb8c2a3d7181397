//! Message stream synchronization.
//!
//! Keeps the windowed, bidirectionally paginated feed in the document
//! consistent with what the server sends: pages from either end, live
//! injections, edits, removals and stashes. The document holds the content;
//! [`StreamSynchronizer`] holds only bookkeeping (which ids are present, the
//! logical reply tree, the two boundary cursors and pending stash removals).

pub mod cursor;
pub mod synchronizer;

pub use cursor::{BoundaryCursor, BoundaryState, Direction};
pub use synchronizer::StreamSynchronizer;

/// Class marking a message that shows the stash notice and is about to go.
pub const STASHED_CLASS: &str = "stashed";

/// Class marking a pinned message.
pub const PINNED_CLASS: &str = "pinned";
