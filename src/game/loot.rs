//! Loot table, chest generation, and chest-opening resolution

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::ws::protocol::{Reward, RewardKind};

use super::room::Player;
use super::{distance, LOOT_RADIUS};

/// One entry in the static loot table
#[derive(Debug, Clone, Copy)]
pub struct LootEntry {
    pub name: &'static str,
    pub kind: RewardKind,
    pub value: i32,
    pub icon: &'static str,
}

impl LootEntry {
    pub fn to_reward(self) -> Reward {
        Reward {
            name: self.name.to_string(),
            kind: self.kind,
            value: self.value,
            icon: self.icon.to_string(),
        }
    }
}

/// The full loot table. Index 0 is the guaranteed potion; the remaining
/// entries are the random pool for the other chests.
pub const LOOT_TABLE: [LootEntry; 7] = [
    LootEntry {
        name: "Summoning Potion",
        kind: RewardKind::Potion,
        value: 0,
        icon: "🧪",
    },
    LootEntry {
        name: "Iron Sword (+2 DMG)",
        kind: RewardKind::Dmg,
        value: 2,
        icon: "⚔️",
    },
    LootEntry {
        name: "Health Elixir (+20 HP)",
        kind: RewardKind::Hp,
        value: 20,
        icon: "🍷",
    },
    LootEntry {
        name: "Rotten Flesh (-5 HP)",
        kind: RewardKind::Bad,
        value: -5,
        icon: "🥩",
    },
    LootEntry {
        name: "Rusty Dagger (+1 DMG)",
        kind: RewardKind::Dmg,
        value: 1,
        icon: "🗡️",
    },
    LootEntry {
        name: "Magic Shield (+50 HP)",
        kind: RewardKind::Hp,
        value: 50,
        icon: "🛡️",
    },
    LootEntry {
        name: "Cursed Skull (-2 DMG)",
        kind: RewardKind::BadDmg,
        value: -2,
        icon: "💀",
    },
];

/// Fixed chest spawn points
pub const CHEST_SPAWNS: [(f32, f32); 8] = [
    (100.0, 100.0),
    (300.0, 100.0),
    (500.0, 100.0),
    (100.0, 300.0),
    (500.0, 300.0),
    (100.0, 500.0),
    (300.0, 500.0),
    (500.0, 500.0),
];

/// A lootable chest. `opened` only ever flips false -> true.
#[derive(Debug, Clone)]
pub struct Chest {
    pub x: f32,
    pub y: f32,
    pub opened: bool,
    pub reward: Reward,
}

/// Generate the room's chests. The first chest always carries the summoning
/// potion so every room has exactly one; the rest draw from the non-potion
/// pool.
pub fn spawn_chests(rng: &mut ChaCha8Rng) -> Vec<Chest> {
    let mut chests = Vec::with_capacity(CHEST_SPAWNS.len());

    let (x, y) = CHEST_SPAWNS[0];
    chests.push(Chest {
        x,
        y,
        opened: false,
        reward: LOOT_TABLE[0].to_reward(),
    });

    for &(x, y) in &CHEST_SPAWNS[1..] {
        let entry = LOOT_TABLE[rng.gen_range(1..LOOT_TABLE.len())];
        chests.push(Chest {
            x,
            y,
            opened: false,
            reward: entry.to_reward(),
        });
    }

    chests
}

/// Chest-opening and reward application
pub struct LootSystem;

impl LootSystem {
    /// Open the first unopened chest within range of the player and apply
    /// its reward. At most one chest opens per invocation; out-of-range is a
    /// soft failure that only sets a status message.
    pub fn open_nearest(player: &mut Player, chests: &mut [Chest], message: &mut Option<String>) {
        for chest in chests.iter_mut() {
            if chest.opened || distance(player.x, player.y, chest.x, chest.y) >= LOOT_RADIUS {
                continue;
            }
            chest.opened = true;

            match chest.reward.kind {
                RewardKind::Hp | RewardKind::Bad => {
                    player.hp += chest.reward.value;
                }
                RewardKind::Dmg | RewardKind::BadDmg => {
                    player.dmg = (player.dmg + chest.reward.value).max(1);
                }
                RewardKind::Potion => {
                    player.inventory.push(chest.reward.clone());
                }
            }

            *message = Some(format!("{} found: {}", player.username, chest.reward.name));

            if player.hp <= 0 {
                player.mark_dead();
                *message = Some(format!("{} died from a cursed chest.", player.username));
            }
            return;
        }

        *message = Some(format!("{}: No chest nearby.", player.username));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn player_at(x: f32, y: f32) -> Player {
        let mut p = Player::new(Uuid::new_v4(), "rin".to_string(), x, y);
        p.dx = 1;
        p.dy = -1;
        p
    }

    fn chest(x: f32, y: f32, entry: LootEntry) -> Chest {
        Chest {
            x,
            y,
            opened: false,
            reward: entry.to_reward(),
        }
    }

    #[test]
    fn spawns_eight_chests_with_exactly_one_potion() {
        for seed in 0..32 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let chests = spawn_chests(&mut rng);
            assert_eq!(chests.len(), 8);
            let potions = chests
                .iter()
                .filter(|c| c.reward.kind == RewardKind::Potion)
                .count();
            assert_eq!(potions, 1, "seed {} produced {} potions", seed, potions);
            assert!(chests.iter().all(|c| !c.opened));
        }
    }

    #[test]
    fn hp_reward_applies_immediately() {
        let mut player = player_at(100.0, 100.0);
        let mut chests = vec![chest(110.0, 100.0, LOOT_TABLE[2])];
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert!(chests[0].opened);
        assert_eq!(player.hp, 30);
        assert_eq!(message.as_deref(), Some("rin found: Health Elixir (+20 HP)"));
    }

    #[test]
    fn dmg_is_clamped_to_minimum_of_one() {
        let mut player = player_at(100.0, 100.0);
        // Cursed skull is -2 against a starting dmg of 1.
        let mut chests = vec![chest(100.0, 120.0, LOOT_TABLE[6])];
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert_eq!(player.dmg, 1);
    }

    #[test]
    fn potion_goes_to_inventory_not_stats() {
        let mut player = player_at(100.0, 100.0);
        let mut chests = vec![chest(100.0, 100.0, LOOT_TABLE[0])];
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert_eq!(player.hp, 10);
        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.inventory[0].kind, RewardKind::Potion);
    }

    #[test]
    fn cursed_chest_kills_and_zeroes_velocity() {
        let mut player = player_at(100.0, 100.0);
        player.hp = 3;
        let mut chests = vec![chest(100.0, 100.0, LOOT_TABLE[3])]; // -5 hp
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert_eq!(player.hp, -2);
        assert!(!player.alive);
        assert_eq!((player.dx, player.dy), (0, 0));
        assert_eq!(message.as_deref(), Some("rin died from a cursed chest."));
    }

    #[test]
    fn out_of_range_is_a_soft_no_op() {
        let mut player = player_at(100.0, 100.0);
        let mut chests = vec![chest(200.0, 200.0, LOOT_TABLE[2])];
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert!(!chests[0].opened);
        assert_eq!(player.hp, 10);
        assert_eq!(message.as_deref(), Some("rin: No chest nearby."));
    }

    #[test]
    fn exactly_one_chest_opens_per_invocation() {
        let mut player = player_at(100.0, 100.0);
        let mut chests = vec![
            chest(110.0, 100.0, LOOT_TABLE[2]),
            chest(100.0, 110.0, LOOT_TABLE[2]),
        ];
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert!(chests[0].opened);
        assert!(!chests[1].opened);
        assert_eq!(player.hp, 30);
    }

    #[test]
    fn opened_chest_never_rewards_twice() {
        let mut player = player_at(100.0, 100.0);
        let mut chests = vec![chest(110.0, 100.0, LOOT_TABLE[2])];
        let mut message = None;

        LootSystem::open_nearest(&mut player, &mut chests, &mut message);
        LootSystem::open_nearest(&mut player, &mut chests, &mut message);

        assert_eq!(player.hp, 30);
        assert_eq!(message.as_deref(), Some("rin: No chest nearby."));
    }
}
