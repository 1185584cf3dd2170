//! Room lifecycle and game rules for fourfifths.
//!
//! Every room lives inside one [`RoomRegistry`]. The registry is plain,
//! synchronous state: the server holds it behind a lock and feeds it
//! client events, disconnects and timer firings. Rooms emit
//! [`ServerEvent`](fourfifths_protocol::ServerEvent)s that the registry
//! delivers through per-player channels.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates/destroys rooms, routes players
//! - [`Room`]: one room's roster, countdown and round
//! - [`RoomConfig`]: seats, bots, pacing and scoring rules
//! - [`logic`]: the pure round rules (target, winner, elimination)

mod config;
mod error;
pub mod logic;
mod registry;
mod room;

pub use config::{CloseReason, CountdownAction, CountdownPhase, RoomConfig, RoundStage};
pub use error::RoomError;
pub use logic::{RoundOutcome, Submission};
pub use registry::{PlayerSender, RoomRegistry};
pub use room::{Room, RoomInfo, ROOM_FULL_MESSAGE};
