//! Room state, registry, and the authoritative tick loop

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::util::time::{Clock, MonotonicClock, TICKS_PER_SECOND, TICK_DURATION};
use crate::ws::protocol::{ActionMsg, Reward, RoomPhase, ServerMsg};

use super::companion::{Companion, CompanionSystem};
use super::loot::{spawn_chests, Chest, LootSystem};
use super::snapshot;
use super::wolf::WolfAi;
use super::{
    QueuedAction, RoomCmd, MAP_MARGIN, MAP_SIZE, MAX_WOLF_HP, PLAYER_SPEED, PLAYER_START_HP,
};

/// Synchronous join failures. The `Display` strings are part of the client
/// contract and go out verbatim in `JoinFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Room not found.")]
    RoomNotFound,
    #[error("Game already started.")]
    GameAlreadyStarted,
}

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub username: String,

    // Position and movement intent
    pub x: f32,
    pub y: f32,
    pub dx: i8,
    pub dy: i8,

    // Stats. hp may transiently dip below zero before `alive` clears;
    // dmg never settles below 1.
    pub hp: i32,
    pub dmg: i32,
    pub alive: bool,

    /// Only potion-kind rewards are retained
    pub inventory: Vec<Reward>,
    pub companion: Companion,

    /// Pending single-trigger actions, drained FIFO once per tick
    pub actions: VecDeque<QueuedAction>,
}

impl Player {
    pub fn new(id: Uuid, username: String, x: f32, y: f32) -> Self {
        Self {
            id,
            username,
            x,
            y,
            dx: 0,
            dy: 0,
            hp: PLAYER_START_HP,
            dmg: 1,
            alive: true,
            inventory: Vec::new(),
            companion: Companion::inactive(),
            actions: VecDeque::new(),
        }
    }

    /// Clear the alive flag and zero velocity, in the same step
    pub fn mark_dead(&mut self) {
        self.alive = false;
        self.dx = 0;
        self.dy = 0;
    }
}

/// The boss entity. A placeholder sits off-map until the chase begins.
#[derive(Debug, Clone)]
pub struct Wolf {
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub last_attack: Option<std::time::Duration>,
}

impl Wolf {
    pub fn placeholder() -> Self {
        Self::spawn(-100.0, -100.0)
    }

    pub fn spawn(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            hp: MAX_WOLF_HP,
            max_hp: MAX_WOLF_HP,
            last_attack: None,
        }
    }
}

/// Room state (owned by the room task)
pub struct RoomState {
    pub code: String,
    pub host_id: Uuid,
    pub phase: RoomPhase,
    pub players: HashMap<Uuid, Player>,
    /// Player ids in join order, for ordered iteration and rosters
    pub player_order: Vec<Uuid>,
    pub chests: Vec<Chest>,
    pub wolf: Wolf,
    /// Collection countdown in whole seconds
    pub timer: u32,
    /// Sub-tick counter deriving 1 Hz decrements from the tick rate
    pub timer_subtick: u32,
    pub end_reason: Option<String>,
    /// One-shot message riding on the next snapshot
    pub message: Option<String>,
    pub tick_count: u64,
    pub rng: ChaCha8Rng,
}

impl RoomState {
    pub fn new(
        code: String,
        host_id: Uuid,
        host_name: String,
        seed: u64,
        collection_secs: u32,
    ) -> Self {
        let mut state = Self {
            code,
            host_id,
            phase: RoomPhase::Lobby,
            players: HashMap::new(),
            player_order: Vec::new(),
            chests: Vec::new(),
            wolf: Wolf::placeholder(),
            timer: collection_secs,
            timer_subtick: 0,
            end_reason: None,
            message: None,
            tick_count: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        state.add_player(host_id, host_name);
        state
    }

    /// Register a player with a randomized spawn near map center
    pub fn add_player(&mut self, id: Uuid, username: String) {
        let x = MAP_SIZE / 2.0 + self.rng.gen_range(-25.0..25.0);
        let y = MAP_SIZE / 2.0 + self.rng.gen_range(-25.0..25.0);
        self.players.insert(id, Player::new(id, username, x, y));
        self.player_order.push(id);
    }

    pub fn remove_player(&mut self, id: &Uuid) -> Option<Player> {
        self.player_order.retain(|pid| pid != id);
        self.players.remove(id)
    }

    /// Display names in join order
    pub fn roster(&self) -> Vec<String> {
        self.player_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(|p| p.username.clone())
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Lobby -> Collection: generate chests and arm the countdown
    pub fn start(&mut self) {
        self.phase = RoomPhase::Collection;
        self.chests = spawn_chests(&mut self.rng);
    }

    /// Collection -> Chase: the wolf appears at the corner at full strength
    fn spawn_wolf(&mut self) {
        self.phase = RoomPhase::Chase;
        self.wolf = Wolf::spawn(50.0, 50.0);
        self.message = Some("THE ALPHA WOLF IS HERE! RUN!".to_string());
    }

    /// Terminal transition. Idempotent; nothing mutates after `Over`.
    fn finalize(&mut self, win: bool) {
        if self.phase == RoomPhase::Over {
            return;
        }
        self.phase = RoomPhase::Over;
        self.end_reason = Some(
            if win {
                "VICTORY! The Alpha Wolf has been defeated."
            } else {
                "All players have been defeated by the Alpha Wolf."
            }
            .to_string(),
        );
        self.message = Some(if win { "Game Over: VICTORY" } else { "Game Over: DEFEAT" }.to_string());
    }

    /// Run one simulation tick. Step order is the contract: countdown,
    /// movement, action drain, companion steering, wolf AI, then the
    /// victory check strictly before the defeat check.
    pub fn tick(&mut self, clock: &dyn Clock) {
        if self.phase == RoomPhase::Over {
            return;
        }
        self.tick_count += 1;

        // 1. Collection countdown at 1 Hz, derived from the tick rate.
        if self.phase == RoomPhase::Collection {
            if self.timer_subtick % TICKS_PER_SECOND == 0 {
                self.timer = self.timer.saturating_sub(1);
            }
            self.timer_subtick += 1;
            if self.timer == 0 {
                self.spawn_wolf();
            }
        }

        // 2. Integrate movement intent and clamp to the map interior.
        for i in 0..self.player_order.len() {
            let id = self.player_order[i];
            let Some(p) = self.players.get_mut(&id) else {
                continue;
            };
            if !p.alive || (p.dx == 0 && p.dy == 0) {
                continue;
            }
            p.x = (p.x + p.dx as f32 * PLAYER_SPEED).clamp(MAP_MARGIN, MAP_SIZE - MAP_MARGIN);
            p.y = (p.y + p.dy as f32 * PLAYER_SPEED).clamp(MAP_MARGIN, MAP_SIZE - MAP_MARGIN);
        }

        // 3. Drain each player's action queue, exactly once per entry.
        for i in 0..self.player_order.len() {
            let id = self.player_order[i];
            let Some(player) = self.players.get_mut(&id) else {
                continue;
            };
            let drained: Vec<QueuedAction> = player.actions.drain(..).collect();
            for action in drained {
                match action {
                    QueuedAction::Loot => {
                        LootSystem::open_nearest(player, &mut self.chests, &mut self.message)
                    }
                    QueuedAction::UseItem { index } => {
                        CompanionSystem::summon(player, index, &mut self.message)
                    }
                    QueuedAction::UpgradeCompanion => {
                        CompanionSystem::upgrade(player, &mut self.message)
                    }
                }
            }
        }

        // 4. Companions trail their owners.
        for player in self.players.values_mut() {
            CompanionSystem::follow_owner(player);
        }

        // 5. Boss behaviour.
        if matches!(self.phase, RoomPhase::Chase | RoomPhase::Battle) {
            WolfAi::run(self, clock);
        }

        // 6. Victory strictly before defeat when both hold in one tick.
        if matches!(self.phase, RoomPhase::Chase | RoomPhase::Battle) && self.wolf.hp <= 0 {
            self.finalize(true);
            return;
        }
        if self.alive_count() == 0 {
            self.finalize(false);
        }
    }
}

/// Handle to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub code: String,
    pub cmd_tx: mpsc::Sender<RoomCmd>,
    pub events_tx: broadcast::Sender<ServerMsg>,
    started: Arc<AtomicBool>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    /// True once the room has left the lobby
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events_tx.subscribe()
    }

    /// Fire-and-forget command delivery; a closed room drops the command
    pub async fn send(&self, cmd: RoomCmd) {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!(room = %self.code, "Command dropped, room task is gone");
        }
    }
}

/// Registry of all live rooms, keyed by 4-digit code.
///
/// Invariant: a code maps to at most one live room; codes are recycled only
/// after the previous holder is removed.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create a room with a fresh unique code and spawn its tick task. The
    /// host is registered as the first player. Takes the registry by `Arc`
    /// so the room task can deregister itself on exit.
    pub fn create_room(
        registry: &Arc<RoomRegistry>,
        host_id: Uuid,
        host_name: &str,
        collection_secs: u32,
    ) -> RoomHandle {
        loop {
            let code = rand::thread_rng().gen_range(1000..10_000).to_string();
            match registry.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let (room, handle) = GameRoom::new(
                        code,
                        host_id,
                        host_name.to_string(),
                        collection_secs,
                        Arc::clone(registry),
                    );
                    slot.insert(handle.clone());
                    tokio::spawn(room.run());
                    return handle;
                }
            }
        }
    }

    /// Look up a room for joining. Fails with the exact user-facing reasons.
    pub fn join_room(&self, code: &str) -> Result<RoomHandle, JoinError> {
        let handle = self
            .rooms
            .get(code)
            .map(|h| h.clone())
            .ok_or(JoinError::RoomNotFound)?;
        if handle.started() {
            return Err(JoinError::GameAlreadyStarted);
        }
        Ok(handle)
    }

    /// Drop a room's handle. Idempotent.
    pub fn remove(&self, code: &str) {
        self.rooms.remove(code);
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative room actor. Owns its state exclusively; the transport
/// layer only talks to it through the command channel, so command handling
/// and ticks can never interleave.
pub struct GameRoom {
    state: RoomState,
    cmd_rx: mpsc::Receiver<RoomCmd>,
    events_tx: broadcast::Sender<ServerMsg>,
    started: Arc<AtomicBool>,
    player_count: Arc<AtomicUsize>,
    clock: Box<dyn Clock>,
    registry: Arc<RoomRegistry>,
}

impl GameRoom {
    fn new(
        code: String,
        host_id: Uuid,
        host_name: String,
        collection_secs: u32,
        registry: Arc<RoomRegistry>,
    ) -> (Self, RoomHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (events_tx, _) = broadcast::channel(64);
        let started = Arc::new(AtomicBool::new(false));
        let player_count = Arc::new(AtomicUsize::new(1));

        let handle = RoomHandle {
            code: code.clone(),
            cmd_tx,
            events_tx: events_tx.clone(),
            started: started.clone(),
            player_count: player_count.clone(),
        };

        let room = Self {
            state: RoomState::new(code, host_id, host_name, rand::random(), collection_secs),
            cmd_rx,
            events_tx,
            started,
            player_count,
            clock: Box::new(MonotonicClock::new()),
            registry,
        };

        (room, handle)
    }

    /// Run the room to completion: command-driven in the lobby, then a
    /// fixed-rate tick interleaved with commands until the game ends or the
    /// room empties.
    pub async fn run(mut self) {
        info!(room = %self.state.code, host = %self.state.host_id, "Room created");

        while self.state.phase == RoomPhase::Lobby {
            match self.cmd_rx.recv().await {
                Some(cmd) => {
                    if self.handle_cmd(cmd) {
                        self.teardown();
                        return;
                    }
                }
                None => {
                    self.teardown();
                    return;
                }
            }
        }

        // The start handler already published the first snapshot, so the
        // first interval fire waits a full period.
        let mut ticker = interval_at(Instant::now() + TICK_DURATION, TICK_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.state.tick(self.clock.as_ref());
                    self.broadcast_snapshot();
                    if self.state.phase == RoomPhase::Over {
                        info!(
                            room = %self.state.code,
                            reason = ?self.state.end_reason,
                            "Game over"
                        );
                        break;
                    }
                }
            }
        }

        self.teardown();
    }

    /// Apply one transport command. Returns true when the room should be
    /// torn down.
    fn handle_cmd(&mut self, cmd: RoomCmd) -> bool {
        match cmd {
            RoomCmd::Join {
                player_id,
                username,
                reply,
            } => {
                // The registry pre-checks the started flag; this closes the
                // window where a start lands between that check and here.
                // The rejection goes only to the joining connection.
                if self.state.phase != RoomPhase::Lobby {
                    let _ = reply.send(Err(JoinError::GameAlreadyStarted));
                    return false;
                }
                self.state.add_player(player_id, username);
                let _ = reply.send(Ok(()));
                self.player_count
                    .store(self.state.players.len(), Ordering::Relaxed);
                info!(
                    room = %self.state.code,
                    player_id = %player_id,
                    players = self.state.players.len(),
                    "Player joined"
                );
                let _ = self.events_tx.send(ServerMsg::LobbyUpdate {
                    players: self.state.roster(),
                });
                false
            }

            RoomCmd::Start { player_id } => {
                if player_id != self.state.host_id || self.state.phase != RoomPhase::Lobby {
                    return false;
                }
                self.state.start();
                self.started.store(true, Ordering::Relaxed);
                info!(room = %self.state.code, "Game started");
                let _ = self.events_tx.send(ServerMsg::GameStarted);
                // First snapshot goes out immediately rather than waiting a
                // full tick interval.
                self.broadcast_snapshot();
                false
            }

            RoomCmd::Action { player_id, action } => {
                if matches!(self.state.phase, RoomPhase::Lobby | RoomPhase::Over) {
                    return false;
                }
                let Some(player) = self.state.players.get_mut(&player_id) else {
                    return false;
                };
                if !player.alive {
                    return false;
                }
                match action {
                    ActionMsg::Move { dx, dy } => {
                        player.dx = dx.clamp(-1, 1);
                        player.dy = dy.clamp(-1, 1);
                    }
                    ActionMsg::StopMove => {
                        player.dx = 0;
                        player.dy = 0;
                    }
                    ActionMsg::Loot => player.actions.push_back(QueuedAction::Loot),
                    ActionMsg::UseItem { index } => {
                        player.actions.push_back(QueuedAction::UseItem { index })
                    }
                    ActionMsg::UpgradeCompanion => {
                        player.actions.push_back(QueuedAction::UpgradeCompanion)
                    }
                }
                false
            }

            RoomCmd::Leave { player_id } => {
                let Some(player) = self.state.remove_player(&player_id) else {
                    return false;
                };
                self.player_count
                    .store(self.state.players.len(), Ordering::Relaxed);
                info!(room = %self.state.code, player_id = %player_id, "Player left");

                if player_id == self.state.host_id {
                    // Host leaving kills the room regardless of phase; this
                    // is the one teardown that bypasses the Over transition.
                    let _ = self.events_tx.send(ServerMsg::HostLeft {
                        reason: "The host has disconnected. Returning to intro.".to_string(),
                    });
                    return true;
                }

                let _ = self.events_tx.send(ServerMsg::LobbyUpdate {
                    players: self.state.roster(),
                });
                if !matches!(self.state.phase, RoomPhase::Lobby | RoomPhase::Over) {
                    self.state.message = Some(format!("{} disconnected.", player.username));
                    self.broadcast_snapshot();
                }
                self.state.players.is_empty()
            }
        }
    }

    /// Publish the current state and clear the one-shot message
    fn broadcast_snapshot(&mut self) {
        let snap = snapshot::build(&self.state);
        let _ = self
            .events_tx
            .send(ServerMsg::GameStateUpdate { state: snap });
        self.state.message = None;
    }

    /// Deregister from the registry. Safe to reach from every exit path.
    fn teardown(&self) {
        self.registry.remove(&self.state.code);
        info!(room = %self.state.code, "Room closed");
    }
}
