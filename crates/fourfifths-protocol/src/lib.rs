//! Wire protocol for the fourfifths game server.
//!
//! This crate defines the "language" that browsers and the server speak:
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`Player`], ids):
//!   the event structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those events
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the room core
//! (game rules). It knows nothing about rooms or timers, only how events
//! look and how to serialize them.
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Room core (rules)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEvent, Player, PlayerId, Recipient, RoomId, ServerEvent, SubmittedNumber,
};
