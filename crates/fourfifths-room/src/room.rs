//! A single game room: roster, subscribers, countdown and rounds.
//!
//! A `Room` is plain data plus the rules that move it along. Operations
//! never send anything themselves; they push `(Recipient, ServerEvent)`
//! pairs into the outbox of a [`RoomContext`] and report whether the room
//! should live on. The [`RoomRegistry`](crate::RoomRegistry) owns the
//! rooms, delivers the outbox and tears rooms down.

use std::collections::HashSet;

use fourfifths_protocol::{Player, PlayerId, Recipient, RoomId, ServerEvent};
use fourfifths_timer::{TimerFired, TimerService};
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{
    CloseReason, CountdownAction, CountdownPhase, ReadyCountdown, RoomFate, RoundPhase,
    RoundStage,
};
use crate::logic::{self, RoundOutcome, Submission};
use crate::{RoomConfig, RoomError};

/// Sent to a player whose join was refused.
pub const ROOM_FULL_MESSAGE: &str = "This room is full. Please try another room.";

/// Messages produced by one operation, in emission order.
pub(crate) type Outbox = Vec<(Recipient, ServerEvent)>;

/// Everything a room operation may need besides the room itself.
pub(crate) struct RoomContext<'a> {
    pub config: &'a RoomConfig,
    pub timers: &'a TimerService<RoomId>,
    pub rng: &'a mut StdRng,
    pub outbox: &'a mut Outbox,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub player_count: usize,
    pub member_count: usize,
    pub started: bool,
    pub current_round: u32,
}

/// One room's state.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    /// The roster, in seat order. Eliminated players are gone from here.
    players: Vec<Player>,
    /// Connections subscribed to room broadcasts. Eliminated humans stay
    /// subscribed so they can watch the game out.
    members: Vec<PlayerId>,
    /// Players knocked out of this game. They never get a seat back.
    eliminated: HashSet<PlayerId>,
    submissions: Vec<Submission>,
    countdown: ReadyCountdown,
    /// `None` until the countdown completes.
    round: Option<RoundPhase>,
    current_round: u32,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            players: Vec::new(),
            members: Vec::new(),
            eliminated: HashSet::new(),
            submissions: Vec::new(),
            countdown: ReadyCountdown::Idle,
            round: None,
            current_round: 0,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *player_id)
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn is_member(&self, player_id: &PlayerId) -> bool {
        self.members.contains(player_id)
    }

    pub fn is_eliminated(&self, player_id: &PlayerId) -> bool {
        self.eliminated.contains(player_id)
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn countdown(&self) -> CountdownPhase {
        self.countdown.phase()
    }

    pub fn round_stage(&self) -> Option<RoundStage> {
        self.round.as_ref().map(RoundPhase::stage)
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn is_started(&self) -> bool {
        self.countdown.phase().is_started()
    }

    pub fn human_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_bot).count()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            player_count: self.players.len(),
            member_count: self.members.len(),
            started: self.is_started(),
            current_round: self.current_round,
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Seats a player, or re-subscribes one already seated.
    ///
    /// The first human in a bot-enabled room brings the bots along. A full
    /// room refuses the join with a `room_full` message to the joiner only.
    /// An eliminated player stays a spectator: they get the roster but no
    /// seat.
    pub(crate) fn join(
        &mut self,
        player_id: &PlayerId,
        ctx: &mut RoomContext<'_>,
    ) -> Result<(), RoomError> {
        if self.is_eliminated(player_id) {
            if !self.is_member(player_id) {
                self.members.push(player_id.clone());
            }
            tracing::debug!(room_id = %self.id, %player_id, "eliminated player rejoined to watch");
            ctx.outbox
                .push((Recipient::Player(player_id.clone()), self.roster_update()));
            return Ok(());
        }

        if self.player(player_id).is_none() {
            let number = if self.players.len() < ctx.config.max_players {
                logic::next_player_number(&self.players, ctx.config.max_players)
            } else {
                None
            };
            let Some(number) = number else {
                ctx.outbox.push((
                    Recipient::Player(player_id.clone()),
                    ServerEvent::RoomFull(ROOM_FULL_MESSAGE.to_string()),
                ));
                return Err(RoomError::RoomFull(self.id.clone()));
            };

            self.players.push(Player::human(player_id.clone(), number));
            tracing::info!(
                room_id = %self.id,
                %player_id,
                player_number = number,
                players = self.players.len(),
                "player joined"
            );

            if ctx.config.bots_enabled && self.players.len() == 1 {
                self.add_bots(ctx);
            }
        }

        if !self.is_member(player_id) {
            self.members.push(player_id.clone());
        }

        self.broadcast(ctx, self.roster_update());
        self.check_readiness(ctx);
        Ok(())
    }

    fn add_bots(&mut self, ctx: &mut RoomContext<'_>) {
        let batch: u32 = ctx.rng.random();
        for i in 0..ctx.config.bot_count {
            let Some(number) = logic::next_player_number(&self.players, ctx.config.max_players)
            else {
                break;
            };
            let id = PlayerId::new(format!("bot-{}-{batch:08x}-{i}", self.id));
            self.players.push(Player::bot(id, number));
        }
        tracing::debug!(room_id = %self.id, bots = ctx.config.bot_count, "bots added");
    }

    /// Marks a seated player ready.
    pub(crate) fn set_ready(
        &mut self,
        player_id: &PlayerId,
        ctx: &mut RoomContext<'_>,
    ) -> Result<(), RoomError> {
        let Some(player) = self.players.iter_mut().find(|p| p.id == *player_id) else {
            return Err(RoomError::NotInRoom(player_id.clone(), self.id.clone()));
        };
        player.is_ready = true;
        tracing::debug!(room_id = %self.id, %player_id, "player ready");

        self.broadcast(ctx, self.roster_update());
        self.check_readiness(ctx);
        Ok(())
    }

    /// Handles a departing connection.
    ///
    /// Drops the player's subscription, seat and pending guess. A room with
    /// no humans left closes at once, without further broadcasts. Otherwise
    /// the remaining players see the new roster, the countdown is
    /// re-evaluated, and the round resolves if everyone left has guessed.
    pub(crate) fn leave(&mut self, player_id: &PlayerId, ctx: &mut RoomContext<'_>) -> RoomFate {
        self.members.retain(|m| m != player_id);
        let seated_before = self.players.len();
        self.players.retain(|p| p.id != *player_id);
        self.submissions.retain(|s| s.player_id != *player_id);

        if self.players.is_empty() {
            return RoomFate::Close(CloseReason::Empty);
        }
        if self.human_count() == 0 {
            return RoomFate::Close(CloseReason::HumansLeft);
        }
        if self.players.len() == seated_before {
            return RoomFate::Keep;
        }

        tracing::info!(
            room_id = %self.id,
            %player_id,
            players = self.players.len(),
            "player left"
        );
        self.broadcast(ctx, self.roster_update());
        self.check_readiness(ctx);

        if self.round_stage() == Some(RoundStage::AwaitingSubmissions)
            && self.submissions.len() == self.players.len()
        {
            return self.resolve_round(ctx);
        }
        RoomFate::Keep
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    fn ready_to_start(&self, config: &RoomConfig) -> bool {
        !self.is_started()
            && self.players.len() == config.max_players
            && self.players.iter().all(|p| p.is_ready)
    }

    fn check_readiness(&mut self, ctx: &mut RoomContext<'_>) {
        let ready = self.ready_to_start(ctx.config);
        match self.countdown.phase().on_readiness(ready) {
            Some(CountdownAction::Start) => {
                let value = ctx.config.countdown_from;
                let timer = ctx.timers.every(self.id.clone(), ctx.config.countdown_tick);
                self.countdown = ReadyCountdown::CountingDown { value, timer };
                tracing::info!(room_id = %self.id, from = value, "countdown started");
                self.broadcast(
                    ctx,
                    ServerEvent::ReadyCountdown {
                        value,
                        stopped: None,
                    },
                );
            }
            Some(CountdownAction::Stop) => {
                self.countdown = ReadyCountdown::Idle;
                tracing::info!(room_id = %self.id, "countdown stopped");
                self.broadcast(
                    ctx,
                    ServerEvent::ReadyCountdown {
                        value: 0,
                        stopped: Some(true),
                    },
                );
            }
            None => {}
        }
    }

    fn countdown_tick(&mut self, ctx: &mut RoomContext<'_>) -> RoomFate {
        let ReadyCountdown::CountingDown { value, .. } = &mut self.countdown else {
            return RoomFate::Keep;
        };
        *value = value.saturating_sub(1);
        let value = *value;

        self.broadcast(
            ctx,
            ServerEvent::ReadyCountdown {
                value,
                stopped: None,
            },
        );

        if value == 0 {
            self.countdown = ReadyCountdown::Started;
            self.current_round = 1;
            tracing::info!(room_id = %self.id, players = self.players.len(), "game started");
            self.broadcast(
                ctx,
                ServerEvent::GameStart {
                    current_round: self.current_round,
                },
            );
            self.start_round(ctx);
        }
        RoomFate::Keep
    }

    // -----------------------------------------------------------------------
    // Rounds
    // -----------------------------------------------------------------------

    fn start_round(&mut self, ctx: &mut RoomContext<'_>) {
        self.submissions.clear();
        self.round = Some(RoundPhase::AwaitingSubmissions);
        tracing::debug!(room_id = %self.id, round = self.current_round, "round started");
        self.broadcast(
            ctx,
            ServerEvent::RoundStart {
                current_round: self.current_round,
            },
        );
    }

    /// Records a guess. Once every seated player has guessed, bots
    /// included, the round resolves.
    pub(crate) fn submit(
        &mut self,
        player_id: &PlayerId,
        number: i64,
        ctx: &mut RoomContext<'_>,
    ) -> Result<RoomFate, RoomError> {
        if !self.is_started() {
            return Err(RoomError::NotStarted(self.id.clone()));
        }
        if self.round_stage() != Some(RoundStage::AwaitingSubmissions) {
            return Err(RoomError::RoundClosed(self.id.clone()));
        }
        if self.player(player_id).is_none() {
            return Err(RoomError::NotInRoom(player_id.clone(), self.id.clone()));
        }

        logic::record_submission(&mut self.submissions, player_id, number);
        tracing::debug!(room_id = %self.id, %player_id, number, "number submitted");

        for bot in self.players.iter().filter(|p| p.is_bot) {
            if !self.submissions.iter().any(|s| s.player_id == bot.id) {
                let guess = ctx.rng.random_range(0..=ctx.config.bot_max_number);
                self.submissions.push(Submission {
                    player_id: bot.id.clone(),
                    number: guess,
                });
            }
        }

        if self.submissions.len() == self.players.len() {
            return Ok(self.resolve_round(ctx));
        }
        Ok(RoomFate::Keep)
    }

    fn resolve_round(&mut self, ctx: &mut RoomContext<'_>) -> RoomFate {
        self.round = Some(RoundPhase::Resolving);

        let report = logic::submission_report(&self.submissions, &self.players);
        let outcome = logic::resolve(&self.submissions, ctx.config.target_ratio);
        if let Some(outcome) = &outcome {
            logic::apply_scores(&mut self.players, &outcome.winner);
        }

        let (winner_id, average, target, winning_number) = match outcome {
            Some(RoundOutcome {
                average,
                target,
                winner,
                winning_number,
            }) => (Some(winner), Some(average), Some(target), Some(winning_number)),
            None => (None, None, None, None),
        };
        tracing::info!(
            room_id = %self.id,
            round = self.current_round,
            winner = ?winner_id,
            ?target,
            "round resolved"
        );

        self.broadcast(
            ctx,
            ServerEvent::RoundResults {
                winner_id,
                average,
                target,
                winning_number,
                updated_players: self.players.clone(),
                current_round: self.current_round,
                submitted_numbers: report,
            },
        );

        self.end_round(ctx)
    }

    fn end_round(&mut self, ctx: &mut RoomContext<'_>) -> RoomFate {
        if let RoomFate::Close(reason) = self.check_eliminations(ctx) {
            return RoomFate::Close(reason);
        }

        self.current_round += 1;
        self.submissions.clear();

        if self.players.len() <= 1 {
            return self.game_over(ctx);
        }

        let timer = ctx.timers.after(self.id.clone(), ctx.config.round_pacing);
        self.round = Some(RoundPhase::Paced { timer });
        RoomFate::Keep
    }

    fn check_eliminations(&mut self, ctx: &mut RoomContext<'_>) -> RoomFate {
        let eliminated = logic::eliminate(&mut self.players, ctx.config.elimination_score);
        for player in eliminated {
            tracing::info!(room_id = %self.id, player_id = %player.id, "player eliminated");
            self.eliminated.insert(player.id.clone());
            self.broadcast(ctx, ServerEvent::PlayerEliminated { player_id: player.id });
        }

        if let [winner] = self.players.as_slice() {
            let winner = winner.clone();
            tracing::info!(room_id = %self.id, winner = %winner.id, "game clear");
            self.broadcast(ctx, ServerEvent::GameClear { winner });
            return RoomFate::Close(CloseReason::GameClear);
        }
        RoomFate::Keep
    }

    fn pacing_elapsed(&mut self, ctx: &mut RoomContext<'_>) -> RoomFate {
        if self.players.len() > 1 {
            self.start_round(ctx);
            RoomFate::Keep
        } else {
            self.game_over(ctx)
        }
    }

    fn game_over(&mut self, ctx: &mut RoomContext<'_>) -> RoomFate {
        let winner = self.players.first().cloned();
        tracing::info!(
            room_id = %self.id,
            winner = ?winner.as_ref().map(|p| &p.id),
            "game over"
        );
        self.broadcast(ctx, ServerEvent::GameOver { winner });
        RoomFate::Close(CloseReason::GameOver)
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Routes a timer firing to the state that owns the timer. Firings
    /// from timers the room no longer holds are dropped.
    pub(crate) fn on_timer(
        &mut self,
        fired: &TimerFired<RoomId>,
        ctx: &mut RoomContext<'_>,
    ) -> RoomFate {
        if let ReadyCountdown::CountingDown { timer, .. } = &self.countdown {
            if timer.owns(fired) {
                return self.countdown_tick(ctx);
            }
        }
        if let Some(RoundPhase::Paced { timer }) = &self.round {
            if timer.owns(fired) {
                return self.pacing_elapsed(ctx);
            }
        }
        tracing::trace!(room_id = %self.id, timer = %fired.timer, "stale timer firing ignored");
        RoomFate::Keep
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn roster_update(&self) -> ServerEvent {
        ServerEvent::RoomUpdate {
            players: self.players.clone(),
        }
    }

    fn broadcast(&self, ctx: &mut RoomContext<'_>, event: ServerEvent) {
        ctx.outbox.push((Recipient::Room(self.id.clone()), event));
    }
}
