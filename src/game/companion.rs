//! Companion mechanics: summoning, steering, and wolf counter-attacks

use std::time::Duration;

use crate::util::time::Clock;
use crate::ws::protocol::RewardKind;

use super::room::{Player, Wolf};
use super::{distance, ATTACK_COOLDOWN, COMPANION_ATTACK_RADIUS, COMPANION_FOLLOW_FACTOR};

/// A player's summoned helper wolf. Exists only after a potion is consumed.
#[derive(Debug, Clone)]
pub struct Companion {
    pub active: bool,
    pub level: u32,
    pub x: f32,
    pub y: f32,
    /// Clock reading of the last landed hit; None until the first attack
    pub last_attack: Option<Duration>,
}

impl Companion {
    pub fn inactive() -> Self {
        Self {
            active: false,
            level: 1,
            x: 0.0,
            y: 0.0,
            last_attack: None,
        }
    }
}

/// Summon, steering, and attack-cooldown logic for companions
pub struct CompanionSystem;

impl CompanionSystem {
    /// Consume the potion at `index` and activate the companion. All failure
    /// modes are soft: they set a status message and leave state untouched.
    pub fn summon(player: &mut Player, index: usize, message: &mut Option<String>) {
        let Some(item) = player.inventory.get(index) else {
            *message = Some(format!("{}: Slot {} is empty.", player.username, index + 1));
            return;
        };

        if item.kind != RewardKind::Potion {
            *message = Some(format!(
                "{}: Cannot use {} from inventory.",
                player.username, item.name
            ));
            return;
        }

        if player.companion.active {
            *message = Some(format!(
                "{}: The Summoning Potion is already used.",
                player.username
            ));
            return;
        }

        player.inventory.remove(index);
        player.companion.active = true;
        player.companion.level = 1;
        player.companion.x = player.x + 30.0;
        player.companion.y = player.y;

        *message = Some(format!(
            "{} summoned a Companion Wolf! (Lvl 1)",
            player.username
        ));
    }

    /// Level up the active companion. Growth is unbounded and costless; a
    /// missing companion is a silent no-op.
    pub fn upgrade(player: &mut Player, message: &mut Option<String>) {
        if !player.companion.active {
            return;
        }

        player.companion.level += 1;
        *message = Some(format!(
            "{}'s Companion Upgraded! Level {}. Damage increased!",
            player.username, player.companion.level
        ));
    }

    /// Move the companion toward its owner by exponential smoothing: close a
    /// fixed fraction of the remaining gap each tick.
    pub fn follow_owner(player: &mut Player) {
        if !player.companion.active {
            return;
        }
        player.companion.x += (player.x - player.companion.x) * COMPANION_FOLLOW_FACTOR;
        player.companion.y += (player.y - player.companion.y) * COMPANION_FOLLOW_FACTOR;
    }

    /// A single companion's counter-attack against the wolf. Deals
    /// `level * 2` when in range and off cooldown; damage lands immediately,
    /// so a later companion in the same tick sees the reduced wolf hp.
    /// Returns the status message of a landed hit.
    pub fn counter_attack(
        player: &mut Player,
        wolf: &mut Wolf,
        clock: &dyn Clock,
    ) -> Option<String> {
        if !player.companion.active {
            return None;
        }

        let comp = &mut player.companion;
        if distance(comp.x, comp.y, wolf.x, wolf.y) >= COMPANION_ATTACK_RADIUS {
            return None;
        }

        let now = clock.now();
        let ready = comp
            .last_attack
            .map_or(true, |last| now.saturating_sub(last) >= ATTACK_COOLDOWN);
        if !ready {
            return None;
        }

        let damage = comp.level as i32 * 2;
        wolf.hp -= damage;
        comp.last_attack = Some(now);

        Some(format!(
            "{}'s Companion (Lvl {}) attacked the Alpha Wolf for {} damage!",
            player.username, comp.level, damage
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::loot::LOOT_TABLE;
    use crate::game::MAX_WOLF_HP;
    use crate::util::time::ManualClock;
    use uuid::Uuid;

    fn player_with_potion() -> Player {
        let mut p = Player::new(Uuid::new_v4(), "mara".to_string(), 300.0, 300.0);
        p.inventory.push(LOOT_TABLE[0].to_reward());
        p
    }

    #[test]
    fn summon_activates_companion_and_consumes_potion() {
        let mut player = player_with_potion();
        let mut message = None;

        CompanionSystem::summon(&mut player, 0, &mut message);

        assert!(player.companion.active);
        assert_eq!(player.companion.level, 1);
        assert_eq!(player.companion.x, 330.0);
        assert_eq!(player.companion.y, 300.0);
        assert!(player.inventory.is_empty());
        assert_eq!(
            message.as_deref(),
            Some("mara summoned a Companion Wolf! (Lvl 1)")
        );
    }

    #[test]
    fn summon_fails_softly_on_empty_slot() {
        let mut player = Player::new(Uuid::new_v4(), "mara".to_string(), 300.0, 300.0);
        let mut message = None;

        CompanionSystem::summon(&mut player, 2, &mut message);

        assert!(!player.companion.active);
        assert_eq!(message.as_deref(), Some("mara: Slot 3 is empty."));
    }

    #[test]
    fn second_summon_is_rejected_without_consuming() {
        let mut player = player_with_potion();
        player.inventory.push(LOOT_TABLE[0].to_reward());
        let mut message = None;

        CompanionSystem::summon(&mut player, 0, &mut message);
        CompanionSystem::summon(&mut player, 0, &mut message);

        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.companion.level, 1);
        assert_eq!(
            message.as_deref(),
            Some("mara: The Summoning Potion is already used.")
        );
    }

    #[test]
    fn upgrade_without_companion_is_silent() {
        let mut player = player_with_potion();
        let mut message = None;

        CompanionSystem::upgrade(&mut player, &mut message);

        assert_eq!(player.companion.level, 1);
        assert!(message.is_none());
    }

    #[test]
    fn upgrade_increments_level_unboundedly() {
        let mut player = player_with_potion();
        let mut message = None;
        CompanionSystem::summon(&mut player, 0, &mut message);

        for _ in 0..10 {
            CompanionSystem::upgrade(&mut player, &mut message);
        }

        assert_eq!(player.companion.level, 11);
        assert_eq!(
            message.as_deref(),
            Some("mara's Companion Upgraded! Level 11. Damage increased!")
        );
    }

    #[test]
    fn follow_closes_a_tenth_of_the_gap_per_tick() {
        let mut player = player_with_potion();
        let mut message = None;
        CompanionSystem::summon(&mut player, 0, &mut message);
        player.companion.x = 0.0;
        player.companion.y = 0.0;
        player.x = 100.0;
        player.y = 200.0;

        CompanionSystem::follow_owner(&mut player);

        assert!((player.companion.x - 10.0).abs() < f32::EPSILON);
        assert!((player.companion.y - 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn counter_attack_deals_level_times_two_once_per_second() {
        let clock = ManualClock::new();
        let mut player = player_with_potion();
        let mut message = None;
        CompanionSystem::summon(&mut player, 0, &mut message);
        player.companion.level = 3;
        player.companion.x = 300.0;
        player.companion.y = 300.0;
        let mut wolf = Wolf::spawn(310.0, 300.0);

        let hit = CompanionSystem::counter_attack(&mut player, &mut wolf, &clock);
        assert_eq!(
            hit.as_deref(),
            Some("mara's Companion (Lvl 3) attacked the Alpha Wolf for 6 damage!")
        );
        assert_eq!(wolf.hp, MAX_WOLF_HP - 6);

        // Still inside the 1 s window: gated.
        let hit = CompanionSystem::counter_attack(&mut player, &mut wolf, &clock);
        assert!(hit.is_none());
        assert_eq!(wolf.hp, MAX_WOLF_HP - 6);

        clock.advance(std::time::Duration::from_millis(1000));
        let hit = CompanionSystem::counter_attack(&mut player, &mut wolf, &clock);
        assert!(hit.is_some());
        assert_eq!(wolf.hp, MAX_WOLF_HP - 12);
    }

    #[test]
    fn counter_attack_requires_proximity() {
        let clock = ManualClock::new();
        let mut player = player_with_potion();
        let mut message = None;
        CompanionSystem::summon(&mut player, 0, &mut message);
        player.companion.x = 0.0;
        player.companion.y = 0.0;
        let mut wolf = Wolf::spawn(100.0, 100.0);

        let hit = CompanionSystem::counter_attack(&mut player, &mut wolf, &clock);

        assert!(hit.is_none());
        assert_eq!(wolf.hp, MAX_WOLF_HP);
    }
}
