//! Client-side synchronization core for two-board bughouse games.
//!
//! [`controller::SyncController`] reconciles server board messages with
//! optimistic local moves, keeps the four clocks, replays unconfirmed moves
//! after a reconnect and drives a local analysis engine.
//! [`session`] wraps it in an actor for async hosts.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod messages;
pub mod session;
pub mod view;

pub use config::SessionConfig;
pub use controller::{GameSetup, PlayerAction, SyncController};
pub use error::SyncError;
pub use events::{Effect, RenderUpdate, SessionEvent};
pub use messages::{InboundMessage, OutboundMessage};
pub use session::{spawn_session, SessionChannels, SessionHandle};
pub use view::{DisplayPreferences, SyncSnapshot};
