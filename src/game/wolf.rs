//! Alpha wolf AI: targeting, movement, melee, and companion exchanges

use crate::util::time::Clock;

use super::companion::CompanionSystem;
use super::room::RoomState;
use super::{distance, ATTACK_COOLDOWN, WOLF_ATTACK_DAMAGE, WOLF_MELEE_RADIUS, WOLF_SPEED};

/// Per-tick boss behaviour, run while the room is in Chase or Battle
pub struct WolfAi;

impl WolfAi {
    pub fn run(state: &mut RoomState, clock: &dyn Clock) {
        if state.wolf.hp <= 0 {
            return;
        }

        // Target the closest living player.
        let mut target_id = None;
        let mut min_distance = f32::INFINITY;
        for id in &state.player_order {
            let Some(p) = state.players.get(id) else {
                continue;
            };
            if !p.alive {
                continue;
            }
            let dist = distance(p.x, p.y, state.wolf.x, state.wolf.y);
            if dist < min_distance {
                min_distance = dist;
                target_id = Some(*id);
            }
        }
        let Some(target_id) = target_id else {
            return;
        };

        // Advance along the straight-line bearing toward the target.
        let target = &state.players[&target_id];
        let angle = (target.y - state.wolf.y).atan2(target.x - state.wolf.x);
        state.wolf.x += angle.cos() * WOLF_SPEED;
        state.wolf.y += angle.sin() * WOLF_SPEED;

        // Melee bite, judged against the distance at targeting time.
        if min_distance < WOLF_MELEE_RADIUS {
            let now = clock.now();
            let ready = state
                .wolf
                .last_attack
                .map_or(true, |last| now.saturating_sub(last) >= ATTACK_COOLDOWN);

            if ready {
                if let Some(target) = state.players.get_mut(&target_id) {
                    target.hp -= WOLF_ATTACK_DAMAGE;
                    state.wolf.last_attack = Some(now);
                    state.message = Some(format!(
                        "The Alpha Wolf attacks {} for {} damage!",
                        target.username, WOLF_ATTACK_DAMAGE
                    ));

                    if target.hp <= 0 {
                        target.mark_dead();
                        state.message = Some(format!("{} has been defeated!", target.username));
                    }
                }
            }
        }

        // Companion counter-attacks. Damage is applied as each hit lands, so
        // a later companion in the same tick observes the updated wolf hp.
        for i in 0..state.player_order.len() {
            let id = state.player_order[i];
            let Some(player) = state.players.get_mut(&id) else {
                continue;
            };
            if !player.alive {
                continue;
            }
            if let Some(msg) = CompanionSystem::counter_attack(player, &mut state.wolf, clock) {
                state.message = Some(msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room::tests::{room_in_phase, summon_companion_at};
    use crate::game::{MAX_WOLF_HP, PLAYER_START_HP};
    use crate::util::time::ManualClock;
    use crate::ws::protocol::RoomPhase;
    use std::time::Duration;

    #[test]
    fn wolf_moves_toward_the_nearest_living_player() {
        let clock = ManualClock::new();
        let mut state = room_in_phase(RoomPhase::Chase, 2);
        let ids: Vec<_> = state.player_order.clone();
        // Near player due east of the wolf, far player in the corner.
        {
            let p = state.players.get_mut(&ids[0]).unwrap();
            p.x = 250.0;
            p.y = 50.0;
        }
        {
            let p = state.players.get_mut(&ids[1]).unwrap();
            p.x = 580.0;
            p.y = 580.0;
        }
        state.wolf.x = 50.0;
        state.wolf.y = 50.0;

        WolfAi::run(&mut state, &clock);

        assert!((state.wolf.x - (50.0 + WOLF_SPEED)).abs() < 1e-3);
        assert!((state.wolf.y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn wolf_is_idle_with_no_living_targets() {
        let clock = ManualClock::new();
        let mut state = room_in_phase(RoomPhase::Chase, 1);
        let id = state.player_order[0];
        state.players.get_mut(&id).unwrap().mark_dead();
        let (wx, wy) = (state.wolf.x, state.wolf.y);

        WolfAi::run(&mut state, &clock);

        assert_eq!((state.wolf.x, state.wolf.y), (wx, wy));
    }

    #[test]
    fn bite_respects_the_one_second_cooldown() {
        let clock = ManualClock::new();
        let mut state = room_in_phase(RoomPhase::Chase, 1);
        let id = state.player_order[0];
        {
            let p = state.players.get_mut(&id).unwrap();
            p.x = 60.0;
            p.y = 50.0;
        }
        state.wolf.x = 50.0;
        state.wolf.y = 50.0;

        WolfAi::run(&mut state, &clock);
        assert_eq!(state.players[&id].hp, PLAYER_START_HP - 2);

        // Same second: movement continues, no second bite.
        state.wolf.x = 50.0;
        state.wolf.y = 50.0;
        WolfAi::run(&mut state, &clock);
        assert_eq!(state.players[&id].hp, PLAYER_START_HP - 2);

        clock.advance(Duration::from_millis(1000));
        state.wolf.x = 50.0;
        state.wolf.y = 50.0;
        WolfAi::run(&mut state, &clock);
        assert_eq!(state.players[&id].hp, PLAYER_START_HP - 4);
    }

    #[test]
    fn lethal_bite_marks_dead_and_zeroes_velocity() {
        let clock = ManualClock::new();
        let mut state = room_in_phase(RoomPhase::Chase, 1);
        let id = state.player_order[0];
        {
            let p = state.players.get_mut(&id).unwrap();
            p.x = 55.0;
            p.y = 50.0;
            p.hp = 2;
            p.dx = 1;
            p.dy = 1;
        }
        state.wolf.x = 50.0;
        state.wolf.y = 50.0;

        WolfAi::run(&mut state, &clock);

        let p = &state.players[&id];
        assert!(!p.alive);
        assert_eq!((p.dx, p.dy), (0, 0));
        assert_eq!(
            state.message.as_deref(),
            Some(format!("{} has been defeated!", p.username).as_str())
        );
    }

    #[test]
    fn multiple_companions_land_additive_hits_in_one_tick() {
        let clock = ManualClock::new();
        let mut state = room_in_phase(RoomPhase::Chase, 2);
        let ids: Vec<_> = state.player_order.clone();
        // Keep both players outside melee range but their companions on top
        // of the wolf.
        for id in &ids {
            let p = state.players.get_mut(id).unwrap();
            p.x = 400.0;
            p.y = 400.0;
        }
        state.wolf.x = 100.0;
        state.wolf.y = 100.0;
        summon_companion_at(&mut state, ids[0], 2, 100.0, 100.0);
        summon_companion_at(&mut state, ids[1], 3, 110.0, 100.0);

        WolfAi::run(&mut state, &clock);

        // 2*2 + 3*2 applied within the same invocation.
        assert_eq!(state.wolf.hp, MAX_WOLF_HP - 10);
    }
}
