//! Client half of a server-driven chat application.
//!
//! The server renders HTML fragments and pushes them over one WebSocket as
//! task-tagged JSON envelopes; this crate splices them into a document,
//! keeps a bidirectionally paginated message feed consistent while the user
//! scrolls and new messages arrive, autosaves drafts and multiplexes file
//! uploads into a single binary frame.
//!
//! Layout, leaves first: [`protocol`] (wire types), [`dom`] (document
//! abstraction), [`transport`] (the socket), [`timers`], [`stream`] (the feed
//! synchronizer), [`draft`], [`upload`], then [`client`] and its inbound
//! handler table, and [`session`] for the async loop the binary runs.

pub mod cli;
pub mod client;
pub mod config;
mod dispatch;
pub mod dom;
pub mod draft;
pub mod error;
pub mod protocol;
pub mod session;
pub mod stream;
pub mod timers;
pub mod transport;
pub mod upload;

pub use client::{AssumeYes, Client, Confirm};
pub use config::{ClientConfig, Layout};
pub use dom::{Document, MemoryDocument, Position};
pub use error::{DomError, FeedError, Result};
pub use protocol::{InboundTask, MessageFragment, MessageId, Outbound, Placement};
pub use session::SessionEnd;
pub use stream::{BoundaryState, StreamSynchronizer};
pub use transport::{MemorySocket, ReadyState, Socket, Transport};
