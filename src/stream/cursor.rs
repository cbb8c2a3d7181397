//! Pagination boundary cursors.

use serde::Serialize;

/// Which edge of the feed a cursor guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Older,
    Newer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryState {
    /// More content may exist; no request outstanding.
    #[default]
    Idle,
    /// A fetch was handed to the transport and has not been answered.
    FetchInFlight,
    /// The server said there is nothing more. Terminal until the next feed replace.
    Exhausted,
}

/// One direction's fetch state.
///
/// `begin_fetch` is the only way into `FetchInFlight` and it refuses unless
/// the cursor is `Idle`, so there is never more than one outstanding fetch
/// per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryCursor {
    state: BoundaryState,
}

impl BoundaryCursor {
    pub fn new(more_available: bool) -> Self {
        let mut cursor = Self::default();
        cursor.reset(more_available);
        cursor
    }

    pub fn state(&self) -> BoundaryState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == BoundaryState::Exhausted
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == BoundaryState::FetchInFlight
    }

    /// Claim the right to send a fetch. Returns `false` when one is already
    /// outstanding or the boundary is exhausted.
    pub fn begin_fetch(&mut self) -> bool {
        if self.state == BoundaryState::Idle {
            self.state = BoundaryState::FetchInFlight;
            true
        } else {
            false
        }
    }

    /// A page of `count` messages arrived. An empty page ends the boundary.
    pub fn content_received(&mut self, count: usize) {
        if count == 0 {
            self.state = BoundaryState::Exhausted;
        } else if self.state == BoundaryState::FetchInFlight {
            self.state = BoundaryState::Idle;
        }
    }

    /// Explicit "no more" from the server.
    pub fn exhaust(&mut self) {
        self.state = BoundaryState::Exhausted;
    }

    /// Start a new feed session.
    pub fn reset(&mut self, more_available: bool) {
        self.state = if more_available {
            BoundaryState::Idle
        } else {
            BoundaryState::Exhausted
        };
    }
}
