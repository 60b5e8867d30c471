//! Application-level configuration loading, including the sprite archetype
//! stat table and battle/bot tuning constants.

use std::collections::HashMap;
use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::SpriteKind;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RIDDLE_RUMBLE_CONFIG_PATH";

/// Stat profile attached to a sprite archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpriteProfile {
    /// HP a participant starts (and resets) with.
    pub starting_hp: i32,
    /// Energy a participant starts (and resets) with.
    pub starting_energy: i32,
    /// Energy granted on a correct answer.
    pub correct_energy_bonus: i32,
    /// HP lost on a wrong (non-timeout) answer.
    pub wrong_answer_penalty: i32,
    /// Whether this archetype's shield reflects attack damage back.
    pub reflects: bool,
}

/// Tuning constants for battle-action resolution and answer scoring.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BattleTuning {
    /// Energy cost of an `attack` action.
    pub attack_cost: i32,
    /// Energy cost of a `shield` action.
    pub shield_cost: i32,
    /// Energy cost of a `reflect` action.
    pub reflect_cost: i32,
    /// Energy cost of a `charge` action.
    pub charge_cost: i32,
    /// Base damage of an attack before charge power is added.
    pub base_damage: i32,
    /// Charge power accumulated per `charge` action.
    pub charge_step: i32,
    /// Fixed HP lost on a timed-out (blank) answer, regardless of archetype.
    pub timeout_penalty: i32,
    /// Base points awarded for a correct answer.
    pub base_points: i64,
    /// Points per spare second for the speed bonus.
    pub speed_bonus_factor: i64,
    /// Pause between "everyone answered" and the next question, so battle
    /// animations can play out on clients.
    pub advance_delay_ms: u64,
}

/// Tuning constants for bot participants.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BotTuning {
    /// Probability that a bot answers a question correctly.
    pub correct_rate: f64,
    /// Lower bound of the bot answer latency, in seconds.
    pub min_latency_secs: u64,
    /// Upper bound of the bot answer latency, in seconds.
    pub max_latency_secs: u64,
    /// Probability that a bot attacks when it can afford to.
    pub attack_bias: f64,
    /// Stat multiplier gained per difficulty level above 1.
    pub difficulty_step: f64,
    /// Highest difficulty level taken into account for stat scaling.
    pub max_difficulty: u32,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    sprites: HashMap<SpriteKind, SpriteProfile>,
    battle: BattleTuning,
    bot: BotTuning,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults for anything the file omits.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded tuning overrides from config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Stat profile for the given archetype.
    ///
    /// Every [`SpriteKind`] has an entry in the defaults, so a lookup miss can
    /// only happen with a config file that removed one; the balanced profile
    /// stands in for those.
    pub fn sprite_profile(&self, kind: SpriteKind) -> SpriteProfile {
        self.sprites
            .get(&kind)
            .or_else(|| self.sprites.get(&SpriteKind::Balanced))
            .copied()
            .unwrap_or(FALLBACK_PROFILE)
    }

    /// Battle-resolution and scoring tuning.
    pub fn battle(&self) -> &BattleTuning {
        &self.battle
    }

    /// Bot behavior tuning.
    pub fn bot(&self) -> &BotTuning {
        &self.bot
    }

    /// Configuration with explicit tuning values, used by tests to shorten
    /// timers without touching the filesystem.
    pub fn with_tuning(battle: BattleTuning, bot: BotTuning) -> Self {
        Self {
            sprites: default_sprites(),
            battle,
            bot,
        }
    }
}

/// Profile used when the configured sprite table is unusable.
const FALLBACK_PROFILE: SpriteProfile = SpriteProfile {
    starting_hp: 100,
    starting_energy: 50,
    correct_energy_bonus: 10,
    wrong_answer_penalty: 10,
    reflects: false,
};

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sprites: default_sprites(),
            battle: default_battle_tuning(),
            bot: default_bot_tuning(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    sprites: Option<HashMap<SpriteKind, SpriteProfile>>,
    #[serde(default)]
    battle: Option<BattleTuning>,
    #[serde(default)]
    bot: Option<BotTuning>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            sprites: value.sprites.unwrap_or_else(default_sprites),
            battle: value.battle.unwrap_or_else(default_battle_tuning),
            bot: value.bot.unwrap_or_else(default_bot_tuning),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in sprite archetype table shipped with the binary.
fn default_sprites() -> HashMap<SpriteKind, SpriteProfile> {
    HashMap::from([
        (
            SpriteKind::BigBrain,
            SpriteProfile {
                starting_hp: 90,
                starting_energy: 60,
                correct_energy_bonus: 15,
                wrong_answer_penalty: 10,
                reflects: false,
            },
        ),
        (
            SpriteKind::RiskTaker,
            SpriteProfile {
                starting_hp: 80,
                starting_energy: 50,
                correct_energy_bonus: 20,
                wrong_answer_penalty: 20,
                reflects: false,
            },
        ),
        (
            SpriteKind::Tank,
            SpriteProfile {
                starting_hp: 140,
                starting_energy: 40,
                correct_energy_bonus: 5,
                wrong_answer_penalty: 5,
                reflects: false,
            },
        ),
        (
            SpriteKind::Reflector,
            SpriteProfile {
                starting_hp: 100,
                starting_energy: 50,
                correct_energy_bonus: 10,
                wrong_answer_penalty: 10,
                reflects: true,
            },
        ),
        (
            SpriteKind::Balanced,
            SpriteProfile {
                starting_hp: 100,
                starting_energy: 50,
                correct_energy_bonus: 10,
                wrong_answer_penalty: 10,
                reflects: false,
            },
        ),
    ])
}

/// Built-in battle tuning shipped with the binary.
fn default_battle_tuning() -> BattleTuning {
    BattleTuning {
        attack_cost: 5,
        shield_cost: 3,
        reflect_cost: 5,
        charge_cost: 2,
        base_damage: 10,
        charge_step: 5,
        timeout_penalty: 10,
        base_points: 100,
        speed_bonus_factor: 2,
        advance_delay_ms: 3_000,
    }
}

/// Built-in bot tuning shipped with the binary.
fn default_bot_tuning() -> BotTuning {
    BotTuning {
        correct_rate: 0.7,
        min_latency_secs: 5,
        max_latency_secs: 20,
        attack_bias: 0.6,
        difficulty_step: 0.1,
        max_difficulty: 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_archetype_has_a_default_profile() {
        let config = AppConfig::default();
        for kind in SpriteKind::ALL {
            let profile = config.sprite_profile(kind);
            assert!(profile.starting_hp > 0);
            assert!(profile.starting_energy > 0);
        }
    }

    #[test]
    fn only_the_reflector_reflects_by_default() {
        let config = AppConfig::default();
        for kind in SpriteKind::ALL {
            assert_eq!(
                config.sprite_profile(kind).reflects,
                kind == SpriteKind::Reflector
            );
        }
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"battle": {
                "attack_cost": 7, "shield_cost": 3, "reflect_cost": 5, "charge_cost": 2,
                "base_damage": 10, "charge_step": 5, "timeout_penalty": 10,
                "base_points": 100, "speed_bonus_factor": 2, "advance_delay_ms": 0
            }}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.battle().attack_cost, 7);
        assert_eq!(config.bot().max_difficulty, 10);
        assert_eq!(config.sprite_profile(SpriteKind::Tank).starting_hp, 140);
    }
}
