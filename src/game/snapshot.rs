//! Snapshot assembly for broadcast

use std::collections::HashMap;

use crate::ws::protocol::{
    ChestSnapshot, CompanionSnapshot, PlayerSnapshot, RoomSnapshot, WolfSnapshot,
};

use super::room::RoomState;

/// Build the broadcastable view of a room. The one-shot message rides along
/// exactly once; the caller clears it after sending.
pub fn build(state: &RoomState) -> RoomSnapshot {
    let players: HashMap<_, _> = state
        .players
        .iter()
        .map(|(id, p)| {
            (
                *id,
                PlayerSnapshot {
                    username: p.username.clone(),
                    x: p.x,
                    y: p.y,
                    dx: p.dx,
                    dy: p.dy,
                    hp: p.hp,
                    dmg: p.dmg,
                    alive: p.alive,
                    inventory: p.inventory.clone(),
                    companion: CompanionSnapshot {
                        active: p.companion.active,
                        level: p.companion.level,
                        x: p.companion.x,
                        y: p.companion.y,
                    },
                },
            )
        })
        .collect();

    let chests = state
        .chests
        .iter()
        .map(|c| ChestSnapshot {
            x: c.x,
            y: c.y,
            opened: c.opened,
            reward: c.reward.clone(),
        })
        .collect();

    RoomSnapshot {
        status: state.phase,
        timer: state.timer,
        players,
        chests,
        wolf: WolfSnapshot {
            x: state.wolf.x,
            y: state.wolf.y,
            hp: state.wolf.hp,
            max_hp: state.wolf.max_hp,
        },
        end_reason: state.end_reason.clone(),
        message: state.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room::tests::room_in_phase;
    use crate::ws::protocol::RoomPhase;

    #[test]
    fn snapshot_mirrors_room_state() {
        let mut state = room_in_phase(RoomPhase::Collection, 2);
        state.message = Some("hello".to_string());

        let snap = build(&state);

        assert_eq!(snap.status, RoomPhase::Collection);
        assert_eq!(snap.timer, state.timer);
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.chests.len(), 8);
        assert_eq!(snap.wolf.max_hp, state.wolf.max_hp);
        assert_eq!(snap.message.as_deref(), Some("hello"));
        // Building a snapshot must not consume the message; the broadcaster
        // clears it after sending.
        assert_eq!(state.message.as_deref(), Some("hello"));
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let state = room_in_phase(RoomPhase::Chase, 1);
        let snap = build(&state);

        let json = serde_json::to_string(&snap).expect("snapshot serializes");
        assert!(json.contains("\"status\":\"chase\""));
        assert!(json.contains("\"max_hp\""));
    }
}
