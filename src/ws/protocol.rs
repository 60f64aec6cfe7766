//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Room lifecycle phase. Transitions only move forward; `Over` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// Waiting for the host to start
    Lobby,
    /// Timed chest-looting phase
    Collection,
    /// The alpha wolf is active and hunting
    Chase,
    /// Escalated endgame; simulated identically to Chase
    Battle,
    /// Game finished, no further mutation
    Over,
}

/// Loot reward categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Companion summoning potion, stored in inventory on pickup
    Potion,
    /// Damage stat bonus, applied immediately
    Dmg,
    /// Health bonus, applied immediately
    Hp,
    /// Negative health "reward"
    Bad,
    /// Negative damage "reward"
    BadDmg,
}

/// A chest reward, as shown to clients and stored in inventories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub name: String,
    pub kind: RewardKind,
    /// Signed magnitude; zero for potions
    pub value: i32,
    pub icon: String,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a new room and become its host
    HostGame { username: String },

    /// Join an existing room by its 4-digit code
    JoinGame { code: String, username: String },

    /// Start the game (host only, lobby only)
    StartGame,

    /// Gameplay input for the player's current room
    PlayerAction { action: ActionMsg },

    /// Leave the current room
    LeaveRoom,
}

/// Player input. Move/StopMove overwrite the velocity intent directly;
/// the rest are single-trigger actions queued for the next tick drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionMsg {
    /// Movement intent, each axis in {-1, 0, 1}
    Move { dx: i8, dy: i8 },
    /// Clear movement intent
    StopMove,
    /// Open the nearest unopened chest in range
    Loot,
    /// Consume the inventory item at `index`
    UseItem { index: usize },
    /// Level up the active companion
    UpgradeCompanion,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid },

    /// Room created, sent to the host with the join code
    RoomCreated { code: String },

    /// Join rejected; `reason` is a user-facing string
    JoinFailed { reason: String },

    /// Join accepted
    JoinSuccess { code: String },

    /// Roster of display names in join order
    LobbyUpdate { players: Vec<String> },

    /// The host started the game
    GameStarted,

    /// Authoritative state snapshot, sent once per tick
    GameStateUpdate { state: RoomSnapshot },

    /// The host disconnected and the room is gone
    HostLeft { reason: String },
}

/// Complete broadcastable state of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub status: RoomPhase,
    /// Collection countdown in whole seconds
    pub timer: u32,
    pub players: HashMap<Uuid, PlayerSnapshot>,
    pub chests: Vec<ChestSnapshot>,
    pub wolf: WolfSnapshot,
    pub end_reason: Option<String>,
    /// One-shot message, cleared after each broadcast
    pub message: Option<String>,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub username: String,
    pub x: f32,
    pub y: f32,
    /// Velocity intent per axis
    pub dx: i8,
    pub dy: i8,
    pub hp: i32,
    pub dmg: i32,
    pub alive: bool,
    pub inventory: Vec<Reward>,
    pub companion: CompanionSnapshot,
}

/// Companion state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionSnapshot {
    pub active: bool,
    pub level: u32,
    pub x: f32,
    pub y: f32,
}

/// Chest state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChestSnapshot {
    pub x: f32,
    pub y: f32,
    pub opened: bool,
    pub reward: Reward,
}

/// Wolf state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfSnapshot {
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
}
