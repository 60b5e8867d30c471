//! Battle-action resolution and answer scoring arithmetic.
//!
//! Pure functions over participant rows; callers persist the mutated fields
//! afterwards. Keeping resolution synchronous and side-effect free makes the
//! rules unit-testable without a store.

use crate::config::BattleTuning;
use crate::dao::models::{BattleAction, ParticipantEntity};

/// Energy price of a battle action.
pub fn action_cost(tuning: &BattleTuning, action: BattleAction) -> i32 {
    match action {
        BattleAction::Attack => tuning.attack_cost,
        BattleAction::Shield => tuning.shield_cost,
        BattleAction::Reflect => tuning.reflect_cost,
        BattleAction::Charge => tuning.charge_cost,
    }
}

/// Deduct an action's energy cost. Actions are never blocked on energy; the
/// pool just bottoms out at zero.
pub fn pay_action_cost(participant: &mut ParticipantEntity, cost: i32) {
    participant.energy = (participant.energy - cost).max(0);
}

/// Outcome of resolving one `attack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackResolution {
    /// Damage that was actually applied (zero when a plain shield soaked it).
    pub damage: i32,
    /// A plain shield absorbed the attack and was consumed.
    pub shield_broken: bool,
    /// The damage bounced back onto the attacker.
    pub reflected: bool,
}

/// Resolve an attack from `attacker` against `target`, mutating both rows.
///
/// `target_reflects` is the archetype lookup for the target's sprite; a raised
/// shield on a reflecting archetype returns the damage instead of absorbing
/// it. The attacker's banked charge is spent regardless of outcome.
pub fn resolve_attack(
    attacker: &mut ParticipantEntity,
    target: &mut ParticipantEntity,
    target_reflects: bool,
    tuning: &BattleTuning,
) -> AttackResolution {
    let damage = tuning.base_damage + attacker.charge_power;

    let resolution = if target.shield_active && target_reflects {
        attacker.hp = (attacker.hp - damage).max(0);
        target.shield_active = false;
        AttackResolution {
            damage,
            shield_broken: false,
            reflected: true,
        }
    } else if target.shield_active {
        target.shield_active = false;
        AttackResolution {
            damage: 0,
            shield_broken: true,
            reflected: false,
        }
    } else {
        target.hp = (target.hp - damage).max(0);
        AttackResolution {
            damage,
            shield_broken: false,
            reflected: false,
        }
    };

    attacker.charge_power = 0;
    resolution
}

/// Points awarded for a correct answer: a flat base plus a bonus for every
/// spare second below the question's time budget.
pub fn points_for_correct(
    tuning: &BattleTuning,
    seconds_per_question: u32,
    seconds_to_answer: f64,
) -> i64 {
    let spare = (f64::from(seconds_per_question) - seconds_to_answer).max(0.0);
    tuning.base_points + (tuning.speed_bonus_factor as f64 * spare).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dao::models::SpriteKind;
    use std::time::SystemTime;
    use uuid::Uuid;

    fn fighter(hp: i32, shield: bool, charge: i32) -> ParticipantEntity {
        ParticipantEntity {
            session_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            display_name: "fighter".into(),
            is_bot: false,
            score: 0,
            correct_count: 0,
            answered_count: 0,
            is_ready: true,
            hp,
            max_hp: 100,
            shield_active: shield,
            charge_power: charge,
            last_action: None,
            sprite: SpriteKind::Balanced,
            energy: 50,
            joined_at: SystemTime::now(),
            left_at: None,
        }
    }

    fn tuning() -> crate::config::BattleTuning {
        *AppConfig::default().battle()
    }

    #[test]
    fn unshielded_attack_applies_base_plus_charge() {
        let mut attacker = fighter(100, false, 5);
        let mut target = fighter(100, false, 0);

        let outcome = resolve_attack(&mut attacker, &mut target, false, &tuning());

        assert_eq!(outcome.damage, 15);
        assert!(!outcome.shield_broken);
        assert!(!outcome.reflected);
        assert_eq!(target.hp, 85);
        assert_eq!(attacker.charge_power, 0);
    }

    #[test]
    fn plain_shield_absorbs_one_attack_and_breaks() {
        let mut attacker = fighter(100, false, 5);
        let mut target = fighter(100, true, 0);

        let outcome = resolve_attack(&mut attacker, &mut target, false, &tuning());

        assert_eq!(outcome.damage, 0);
        assert!(outcome.shield_broken);
        assert!(!target.shield_active);
        assert_eq!(target.hp, 100);
        // Charge is spent even when the attack is soaked.
        assert_eq!(attacker.charge_power, 0);
    }

    #[test]
    fn reflecting_shield_returns_damage_to_attacker() {
        let mut attacker = fighter(100, false, 0);
        let mut target = fighter(100, true, 0);

        let outcome = resolve_attack(&mut attacker, &mut target, true, &tuning());

        assert!(outcome.reflected);
        assert_eq!(outcome.damage, 10);
        assert_eq!(attacker.hp, 90);
        assert_eq!(target.hp, 100);
        assert!(!target.shield_active);
    }

    #[test]
    fn damage_floors_hp_at_zero() {
        let mut attacker = fighter(100, false, 200);
        let mut target = fighter(30, false, 0);

        resolve_attack(&mut attacker, &mut target, false, &tuning());
        assert_eq!(target.hp, 0);
    }

    #[test]
    fn paying_costs_clamps_energy_at_zero() {
        let mut p = fighter(100, false, 0);
        p.energy = 3;
        pay_action_cost(&mut p, action_cost(&tuning(), BattleAction::Attack));
        assert_eq!(p.energy, 0);
    }

    #[test]
    fn correct_answer_points_reward_speed() {
        let tuning = tuning();
        assert_eq!(points_for_correct(&tuning, 30, 10.0), 140);
        assert_eq!(points_for_correct(&tuning, 30, 29.5), 101);
        // Slower than the budget never goes below the base.
        assert_eq!(points_for_correct(&tuning, 30, 45.0), 100);
    }
}
