//! Game simulation modules

pub mod companion;
pub mod loot;
pub mod room;
pub mod snapshot;
pub mod wolf;

pub use room::{GameRoom, JoinError, RoomHandle, RoomRegistry};

use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::util::time::SIMULATION_TPS;
use crate::ws::protocol::ActionMsg;

/// Side length of the square map in world units
pub const MAP_SIZE: f32 = 600.0;

/// Fixed margin from each map edge players are clamped to
pub const MAP_MARGIN: f32 = 20.0;

/// Hit points the alpha wolf spawns with
pub const MAX_WOLF_HP: i32 = 50;

/// Default collection-phase countdown in seconds
pub const DEFAULT_COLLECTION_SECS: u32 = 60;

/// Hit points a player spawns with
pub const PLAYER_START_HP: i32 = 10;

/// Movement per tick. Derived from a reference feel of 6 units per 33 ms so
/// perceived speed stays the same if the tick rate changes.
pub const PLAYER_SPEED: f32 = 6.0 * (1000.0 / 33.0) / SIMULATION_TPS as f32;

/// Wolf movement per tick, tuned slightly below player speed
pub const WOLF_SPEED: f32 = 5.0 * (1000.0 / 33.0) / SIMULATION_TPS as f32;

/// Max distance at which a chest can be looted
pub const LOOT_RADIUS: f32 = 50.0;

/// Wolf melee reach
pub const WOLF_MELEE_RADIUS: f32 = 40.0;

/// Damage per wolf bite
pub const WOLF_ATTACK_DAMAGE: i32 = 2;

/// Max distance at which a companion can strike the wolf
pub const COMPANION_ATTACK_RADIUS: f32 = 50.0;

/// Minimum wall-clock gap between attacks, wolf and companion alike
pub const ATTACK_COOLDOWN: Duration = Duration::from_secs(1);

/// Fraction of the remaining gap a companion closes toward its owner per tick
pub const COMPANION_FOLLOW_FACTOR: f32 = 0.1;

/// Euclidean distance between two points
pub fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    (ax - bx).hypot(ay - by)
}

/// Command sent from the transport layer into a room's actor task
#[derive(Debug)]
pub enum RoomCmd {
    /// Add a player to the lobby. The outcome goes back over `reply` to the
    /// joining connection alone; the room broadcast never carries it.
    Join {
        player_id: Uuid,
        username: String,
        reply: oneshot::Sender<Result<(), JoinError>>,
    },
    /// Begin the game (host only)
    Start { player_id: Uuid },
    /// Gameplay input from a connected player
    Action { player_id: Uuid, action: ActionMsg },
    /// Player disconnected or left
    Leave { player_id: Uuid },
}

/// Single-trigger action awaiting the next tick drain. Each queued entry is
/// applied exactly once, in enqueue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedAction {
    Loot,
    UseItem { index: usize },
    UpgradeCompanion,
}
