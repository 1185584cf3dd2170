//! Error types for the room layer.

use fourfifths_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
///
/// None of these are fatal to a connection: the server logs them and
/// carries on. `RoomFull` is the only one the client hears about, as a
/// `room_full` message.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Every seat is taken.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The countdown hasn't finished yet.
    #[error("room {0} has not started")]
    NotStarted(RoomId),

    /// The room isn't collecting guesses right now (results are being
    /// shown before the next round).
    #[error("room {0} is not accepting submissions")]
    RoundClosed(RoomId),

    /// The player isn't on the room's roster.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),
}
