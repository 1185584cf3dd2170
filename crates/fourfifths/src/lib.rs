//! # fourfifths
//!
//! Server core for a multiplayer "closest to 4/5 of the average" game.
//!
//! Browsers connect over WebSocket, join rooms by name, ready up, and
//! submit a number each round. The player closest to 0.8 × the round's
//! average wins the round; everyone else loses a point, and anyone who
//! falls to -10 is out. A lone human is given four bots to play against.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fourfifths::prelude::*;
//!
//! # async fn run() -> Result<(), FourfifthsError> {
//! let server = FourfifthsServer::builder()
//!     .bind("0.0.0.0:5000")
//!     .allowed_origins(["http://localhost:3000"])
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::FourfifthsError;
pub use server::{FourfifthsServer, FourfifthsServerBuilder};

/// Everything needed to run a server or talk to one from Rust.
pub mod prelude {
    pub use crate::{FourfifthsError, FourfifthsServer, FourfifthsServerBuilder};
    pub use fourfifths_protocol::{
        ClientEvent, Codec, JsonCodec, Player, PlayerId, RoomId, ServerEvent, SubmittedNumber,
    };
    pub use fourfifths_room::{RoomConfig, RoomError};
}
