//! Bot participant behavior: archetype choice, stat scaling, answer and
//! action policies.
//!
//! All probabilities and ranges come from [`BotTuning`] so they stay tunable
//! rather than load-bearing constants.

use std::time::Duration;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::config::{BotTuning, SpriteProfile};
use crate::dao::models::{BattleAction, SpriteKind};

/// What a bot decides to do on its battle turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMove {
    /// Take the contained action.
    Act(BattleAction),
    /// Nothing affordable; sit the turn out.
    Skip,
}

/// Pick an archetype uniformly at random.
pub fn random_sprite<R: Rng + ?Sized>(rng: &mut R) -> SpriteKind {
    *SpriteKind::ALL
        .choose(rng)
        .unwrap_or(&SpriteKind::Balanced)
}

/// Linear stat multiplier for the host's difficulty level, capped at
/// [`BotTuning::max_difficulty`].
pub fn difficulty_multiplier(tuning: &BotTuning, level: u32) -> f64 {
    let level = level.clamp(1, tuning.max_difficulty);
    1.0 + tuning.difficulty_step * f64::from(level - 1)
}

/// Scale a bot's starting profile by the difficulty multiplier.
pub fn scaled_profile(tuning: &BotTuning, profile: SpriteProfile, level: u32) -> SpriteProfile {
    let multiplier = difficulty_multiplier(tuning, level);
    SpriteProfile {
        starting_hp: (f64::from(profile.starting_hp) * multiplier).round() as i32,
        starting_energy: (f64::from(profile.starting_energy) * multiplier).round() as i32,
        ..profile
    }
}

/// Whether the bot gets this question right.
pub fn answers_correctly<R: Rng + ?Sized>(rng: &mut R, tuning: &BotTuning) -> bool {
    rng.random_bool(tuning.correct_rate)
}

/// How long the bot pretends to think before submitting.
pub fn answer_latency<R: Rng + ?Sized>(rng: &mut R, tuning: &BotTuning) -> Duration {
    let secs = rng.random_range(tuning.min_latency_secs..=tuning.max_latency_secs);
    Duration::from_secs(secs)
}

/// Choose a battle move given the bot's current energy.
///
/// Prefers `attack` when affordable; otherwise picks uniformly among whatever
/// it can pay for. Reflecting archetypes raise a reflect shield instead of a
/// plain one.
pub fn choose_action<R: Rng + ?Sized>(
    rng: &mut R,
    tuning: &BotTuning,
    costs: impl Fn(BattleAction) -> i32,
    energy: i32,
    reflects: bool,
) -> BotMove {
    let shield_kind = if reflects {
        BattleAction::Reflect
    } else {
        BattleAction::Shield
    };

    let affordable: Vec<BattleAction> = [BattleAction::Attack, BattleAction::Charge, shield_kind]
        .into_iter()
        .filter(|action| costs(*action) <= energy)
        .collect();

    if affordable.is_empty() {
        return BotMove::Skip;
    }

    if affordable.contains(&BattleAction::Attack) && rng.random_bool(tuning.attack_bias) {
        return BotMove::Act(BattleAction::Attack);
    }

    affordable
        .choose(rng)
        .copied()
        .map(BotMove::Act)
        .unwrap_or(BotMove::Skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tuning() -> BotTuning {
        *AppConfig::default().bot()
    }

    fn cost_table(action: BattleAction) -> i32 {
        match action {
            BattleAction::Attack => 5,
            BattleAction::Shield => 3,
            BattleAction::Reflect => 5,
            BattleAction::Charge => 2,
        }
    }

    #[test]
    fn difficulty_scaling_is_linear_and_capped() {
        let tuning = tuning();
        assert_eq!(difficulty_multiplier(&tuning, 1), 1.0);
        assert!((difficulty_multiplier(&tuning, 5) - 1.4).abs() < 1e-9);
        // Levels beyond the cap behave like the cap.
        assert_eq!(
            difficulty_multiplier(&tuning, 25),
            difficulty_multiplier(&tuning, 10)
        );
    }

    #[test]
    fn scaled_profile_rounds_stats() {
        let tuning = tuning();
        let base = AppConfig::default().sprite_profile(SpriteKind::Balanced);
        let scaled = scaled_profile(&tuning, base, 3);
        assert_eq!(scaled.starting_hp, 120);
        assert_eq!(scaled.starting_energy, 60);
        assert_eq!(scaled.reflects, base.reflects);
    }

    #[test]
    fn broke_bot_skips_its_turn() {
        let mut rng = StdRng::seed_from_u64(7);
        let decision = choose_action(&mut rng, &tuning(), cost_table, 1, false);
        assert_eq!(decision, BotMove::Skip);
    }

    #[test]
    fn bot_with_energy_for_shield_only_never_attacks() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..64 {
            match choose_action(&mut rng, &tuning(), cost_table, 3, false) {
                BotMove::Act(BattleAction::Attack) | BotMove::Act(BattleAction::Reflect) => {
                    panic!("unaffordable action chosen")
                }
                _ => {}
            }
        }
    }

    #[test]
    fn reflector_bots_prefer_reflect_over_plain_shield() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..64 {
            if let BotMove::Act(action) = choose_action(&mut rng, &tuning(), cost_table, 50, true) {
                assert_ne!(action, BattleAction::Shield);
            }
        }
    }

    #[test]
    fn answer_latency_stays_in_configured_range() {
        let tuning = tuning();
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..64 {
            let latency = answer_latency(&mut rng, &tuning).as_secs();
            assert!((tuning.min_latency_secs..=tuning.max_latency_secs).contains(&latency));
        }
    }
}
