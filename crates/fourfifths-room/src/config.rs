//! Room configuration and the two per-room state machines.

use std::time::Duration;

use fourfifths_timer::TimerHandle;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Rules and pacing shared by every room of a registry.
///
/// `Default` is the game as played: five seats, four bots for a lone
/// human, a five-second countdown, ten seconds between rounds, elimination
/// at -10 and a target of 0.8 × the average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Seats per room. The countdown only starts when every seat is taken.
    pub max_players: usize,

    /// Whether a lone human gets bots to play against.
    pub bots_enabled: bool,

    /// Bots added when the first human joins. At most `max_players - 1`.
    pub bot_count: usize,

    /// Bots guess uniformly in `0..=bot_max_number`.
    pub bot_max_number: i64,

    /// First value of the readiness countdown.
    pub countdown_from: u32,

    /// Time between countdown values.
    pub countdown_tick: Duration,

    /// Pause between a round's results and the next round.
    pub round_pacing: Duration,

    /// A player whose score drops to this value or below is eliminated.
    pub elimination_score: i32,

    /// The round target is `average * target_ratio`.
    pub target_ratio: f64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 5,
            bots_enabled: true,
            bot_count: 4,
            bot_max_number: 100,
            countdown_from: 5,
            countdown_tick: Duration::from_secs(1),
            round_pacing: Duration::from_secs(10),
            elimination_score: -10,
            target_ratio: 0.8,
        }
    }
}

impl RoomConfig {
    /// Largest room the roster numbering (`u8`) can express.
    pub const MAX_SEATS: usize = u8::MAX as usize;

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`RoomRegistry::new`](crate::RoomRegistry::new). Rules:
    /// - `max_players` within `1..=MAX_SEATS`.
    /// - `bot_count` at most `max_players - 1` (the human keeps a seat).
    /// - `countdown_from` at least 1.
    /// - `bot_max_number` not negative.
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 || self.max_players > Self::MAX_SEATS {
            let clamped = self.max_players.clamp(1, Self::MAX_SEATS);
            warn!(
                max_players = self.max_players,
                clamped, "max_players out of range, clamping"
            );
            self.max_players = clamped;
        }
        if self.bot_count >= self.max_players {
            warn!(
                bot_count = self.bot_count,
                max_players = self.max_players,
                "bot_count leaves no seat for the human, clamping"
            );
            self.bot_count = self.max_players - 1;
        }
        self.countdown_from = self.countdown_from.max(1);
        self.bot_max_number = self.bot_max_number.max(0);
        self
    }
}

// ---------------------------------------------------------------------------
// Ready countdown
// ---------------------------------------------------------------------------

/// The readiness gate in front of a game.
///
/// ```text
/// Idle ──(full & all ready)──→ CountingDown(5) ──(reaches 0)──→ Started
///   ↑                               │
///   └──────(readiness lost)─────────┘
/// ```
///
/// The running countdown owns its periodic timer, so leaving the
/// `CountingDown` state cancels the timer.
#[derive(Debug, Default)]
pub enum ReadyCountdown {
    #[default]
    Idle,
    CountingDown {
        value: u32,
        timer: TimerHandle,
    },
    Started,
}

impl ReadyCountdown {
    /// A copyable view of the state, without the timer.
    pub fn phase(&self) -> CountdownPhase {
        match self {
            Self::Idle => CountdownPhase::Idle,
            Self::CountingDown { value, .. } => CountdownPhase::CountingDown(*value),
            Self::Started => CountdownPhase::Started,
        }
    }
}

/// Timer-free view of [`ReadyCountdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPhase {
    Idle,
    CountingDown(u32),
    Started,
}

/// What a readiness check should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownAction {
    Start,
    Stop,
}

impl CountdownPhase {
    /// Decides the transition for a readiness check.
    ///
    /// `ready` is "not started, every seat taken, everyone ready". An idle
    /// room starts counting when ready; a running countdown stops as soon as
    /// it isn't. Everything else is a no-op.
    pub fn on_readiness(self, ready: bool) -> Option<CountdownAction> {
        match (self, ready) {
            (Self::Idle, true) => Some(CountdownAction::Start),
            (Self::CountingDown(_), false) => Some(CountdownAction::Stop),
            _ => None,
        }
    }

    pub fn is_started(self) -> bool {
        matches!(self, Self::Started)
    }
}

// ---------------------------------------------------------------------------
// Round phase
// ---------------------------------------------------------------------------

/// Where the current round stands once the game has started.
///
/// ```text
/// AwaitingSubmissions ──(all in)──→ Resolving ──→ Paced ──(delay)──→ AwaitingSubmissions
/// ```
///
/// `Resolving` only exists while a round is being scored; a room that
/// survives scoring moves on to `Paced`, which owns the one-shot timer for
/// the next round.
#[derive(Debug)]
pub enum RoundPhase {
    AwaitingSubmissions,
    Resolving,
    Paced { timer: TimerHandle },
}

impl RoundPhase {
    pub fn stage(&self) -> RoundStage {
        match self {
            Self::AwaitingSubmissions => RoundStage::AwaitingSubmissions,
            Self::Resolving => RoundStage::Resolving,
            Self::Paced { .. } => RoundStage::Paced,
        }
    }
}

/// Timer-free view of [`RoundPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStage {
    AwaitingSubmissions,
    Resolving,
    Paced,
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Why a room is being destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The roster emptied.
    Empty,
    /// Only bots are left.
    HumansLeft,
    /// Elimination left a single player.
    GameClear,
    /// A round ended with at most one player.
    GameOver,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::HumansLeft => write!(f, "humans left"),
            Self::GameClear => write!(f, "game clear"),
            Self::GameOver => write!(f, "game over"),
        }
    }
}

/// Outcome of an operation, as far as the registry is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub(crate) enum RoomFate {
    Keep,
    Close(CloseReason),
}
