//! Room registry: owns every room, routes players to them and delivers
//! what the rooms emit.

use std::collections::{BTreeSet, HashMap};

use fourfifths_protocol::{ClientEvent, PlayerId, Recipient, RoomId, ServerEvent};
use fourfifths_timer::{TimerFired, TimerReceiver, TimerService};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use crate::config::{CloseReason, RoomFate};
use crate::room::{Outbox, Room, RoomContext, RoomInfo};
use crate::{RoomConfig, RoomError};

/// Channel sender for delivering outbound events to a player's connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// All live rooms plus the indexes needed to route players to them.
///
/// The registry is synchronous: callers wrap it in a lock and feed it
/// client events, disconnects and timer firings one at a time. Each call
/// runs to completion, delivers its messages and tears down any room that
/// finished, before the next one starts.
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,

    /// Rooms each connection is subscribed to. One connection may sit in
    /// several rooms.
    player_rooms: HashMap<PlayerId, BTreeSet<RoomId>>,

    /// Outbound channel per connected player.
    connections: HashMap<PlayerId, PlayerSender>,

    config: RoomConfig,
    timers: TimerService<RoomId>,
    rng: StdRng,
}

impl RoomRegistry {
    /// Creates an empty registry. Timer firings for its rooms arrive on the
    /// returned receiver and must be passed back through
    /// [`handle_timer`](Self::handle_timer).
    pub fn new(config: RoomConfig) -> (Self, TimerReceiver<RoomId>) {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Like [`new`](Self::new) with seeded bot guesses, for reproducible
    /// games.
    pub fn with_seed(config: RoomConfig, seed: u64) -> (Self, TimerReceiver<RoomId>) {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RoomConfig, rng: StdRng) -> (Self, TimerReceiver<RoomId>) {
        let (timers, fired) = TimerService::new();
        let registry = Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            connections: HashMap::new(),
            config: config.validated(),
            timers,
            rng,
        };
        (registry, fired)
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Registers the outbound channel of a newly connected player.
    pub fn connect(&mut self, player_id: PlayerId, sender: PlayerSender) {
        tracing::debug!(%player_id, "player connected");
        self.connections.insert(player_id, sender);
    }

    /// Removes a connection from every room it was subscribed to.
    pub fn disconnect(&mut self, player_id: &PlayerId) {
        self.connections.remove(player_id);
        let Some(room_ids) = self.player_rooms.remove(player_id) else {
            tracing::debug!(%player_id, "player disconnected");
            return;
        };
        tracing::debug!(%player_id, rooms = room_ids.len(), "player disconnected");

        for room_id in room_ids {
            if let Some(RoomFate::Close(reason)) =
                self.with_room(&room_id, |room, ctx| room.leave(player_id, ctx))
            {
                self.close(&room_id, reason);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Client events
    // -----------------------------------------------------------------------

    /// Applies one inbound client event.
    pub fn handle_event(&mut self, player_id: &PlayerId, event: ClientEvent) -> Result<(), RoomError> {
        match event {
            ClientEvent::JoinRoom(room_id) => self.join(player_id, &room_id),
            ClientEvent::PlayerReady { room_id } => self.set_ready(player_id, &room_id),
            ClientEvent::SubmitNumber { room_id, number } => {
                self.submit(player_id, &room_id, number)
            }
        }
    }

    /// Joins a room, creating it on first reference.
    pub fn join(&mut self, player_id: &PlayerId, room_id: &RoomId) -> Result<(), RoomError> {
        self.get_or_create(room_id);
        self.with_room(room_id, |room, ctx| room.join(player_id, ctx))
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))??;

        self.player_rooms
            .entry(player_id.clone())
            .or_default()
            .insert(room_id.clone());
        Ok(())
    }

    pub fn set_ready(&mut self, player_id: &PlayerId, room_id: &RoomId) -> Result<(), RoomError> {
        self.with_room(room_id, |room, ctx| room.set_ready(player_id, ctx))
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?
    }

    pub fn submit(
        &mut self,
        player_id: &PlayerId,
        room_id: &RoomId,
        number: i64,
    ) -> Result<(), RoomError> {
        let fate = self
            .with_room(room_id, |room, ctx| room.submit(player_id, number, ctx))
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))??;
        if let RoomFate::Close(reason) = fate {
            self.close(room_id, reason);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Delivers a timer firing to the room that scheduled it. Firings for
    /// rooms that are gone, or from timers a room has since replaced, are
    /// ignored.
    pub fn handle_timer(&mut self, fired: TimerFired<RoomId>) {
        let room_id = fired.owner.clone();
        match self.with_room(&room_id, |room, ctx| room.on_timer(&fired, ctx)) {
            Some(RoomFate::Close(reason)) => self.close(&room_id, reason),
            Some(RoomFate::Keep) => {}
            None => {
                tracing::trace!(%room_id, timer = %fired.timer, "timer for a closed room ignored");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    /// Returns the room, creating an empty one if it doesn't exist.
    pub fn get_or_create(&mut self, room_id: &RoomId) -> &mut Room {
        self.rooms.entry(room_id.clone()).or_insert_with(|| {
            tracing::info!(%room_id, "room created");
            Room::new(room_id.clone())
        })
    }

    /// Destroys a room and unsubscribes its members. Dropping the room
    /// cancels its timers. Returns `false` if the room was already gone.
    pub fn remove(&mut self, room_id: &RoomId) -> bool {
        let Some(room) = self.rooms.remove(room_id) else {
            return false;
        };
        for member in room.members() {
            if let Some(rooms) = self.player_rooms.get_mut(member) {
                rooms.remove(room_id);
                if rooms.is_empty() {
                    self.player_rooms.remove(member);
                }
            }
        }
        true
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_info(&self, room_id: &RoomId) -> Option<RoomInfo> {
        self.rooms.get(room_id).map(Room::info)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Rooms the player is subscribed to, in id order.
    pub fn rooms_of(&self, player_id: &PlayerId) -> Vec<RoomId> {
        self.player_rooms
            .get(player_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Runs `op` against a room and delivers whatever it emitted. Returns
    /// `None` if the room doesn't exist.
    fn with_room<T>(
        &mut self,
        room_id: &RoomId,
        op: impl FnOnce(&mut Room, &mut RoomContext<'_>) -> T,
    ) -> Option<T> {
        let room = self.rooms.get_mut(room_id)?;
        let mut outbox = Outbox::new();
        let mut ctx = RoomContext {
            config: &self.config,
            timers: &self.timers,
            rng: &mut self.rng,
            outbox: &mut outbox,
        };
        let result = op(room, &mut ctx);
        dispatch(&self.connections, room, outbox);
        Some(result)
    }

    fn close(&mut self, room_id: &RoomId, reason: CloseReason) {
        if self.remove(room_id) {
            tracing::info!(%room_id, %reason, "room destroyed");
        } else {
            tracing::debug!(%room_id, %reason, "room already destroyed");
        }
    }
}

/// Delivers messages to their recipients. Room broadcasts go to the room's
/// current members. Players whose channel is gone are skipped.
fn dispatch(connections: &HashMap<PlayerId, PlayerSender>, room: &Room, outbox: Outbox) {
    for (recipient, event) in outbox {
        match recipient {
            Recipient::Room(_) => {
                for member in room.members() {
                    send_to(connections, member, event.clone());
                }
            }
            Recipient::Player(player_id) => send_to(connections, &player_id, event),
        }
    }
}

fn send_to(connections: &HashMap<PlayerId, PlayerSender>, player_id: &PlayerId, event: ServerEvent) {
    if let Some(sender) = connections.get(player_id) {
        let _ = sender.send(event);
    }
}
