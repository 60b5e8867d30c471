//! Session bootstrap: creation, code lookup, and participant seeding.

use std::time::SystemTime;

use rand::Rng;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::dao::models::{
    ParticipantEntity, RiddleEntity, SessionEntity, SessionStatus, SpriteKind,
};
use crate::dto::game::{CreateSessionRequest, SessionSummary};
use crate::dto::validation::{SESSION_CODE_LENGTH, validate_session_code};
use crate::error::ServiceError;
use crate::services::bot;
use crate::state::SharedState;

/// Attempts at generating a collision-free join code before giving up.
const CODE_ATTEMPTS: usize = 16;

/// Characters a join code is drawn from. No lowercase so codes survive being
/// read out loud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Create a session, persist its riddles, and seed the host participant
/// (plus a bot when requested).
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionSummary, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))?;

    let store = state.require_session_store().await?;

    let mut code = generate_session_code(&mut rand::rng());
    let mut attempts = 1;
    while store
        .find_session_by_code(code.clone())
        .await?
        .is_some()
    {
        if attempts >= CODE_ATTEMPTS {
            return Err(ServiceError::InvalidState(
                "could not allocate a unique session code".into(),
            ));
        }
        code = generate_session_code(&mut rand::rng());
        attempts += 1;
    }

    let riddles: Vec<RiddleEntity> = request
        .riddles
        .into_iter()
        .map(|input| input.into_entity())
        .collect();

    let session = SessionEntity {
        id: Uuid::new_v4(),
        code,
        host_id: request.host_id,
        status: SessionStatus::Waiting,
        riddle_order: riddles.iter().map(|r| r.id).collect(),
        current_question_index: 0,
        seconds_per_question: request.seconds_per_question,
        category: request.category,
        created_at: SystemTime::now(),
        started_at: None,
        finished_at: None,
    };
    let session_id = session.id;

    store.create_session(session, riddles).await?;

    let host = new_participant(
        state.config(),
        session_id,
        request.host_id,
        request.host_name,
        SpriteKind::Balanced,
    );
    store.join_session(host).await?;

    if request.with_bot {
        let bot_row = new_bot_participant(state.config(), session_id, request.bot_difficulty);
        store.join_session(bot_row).await?;
    }

    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;

    Ok(SessionSummary::project(session, participants))
}

/// Resolve a join code for a client that only knows the shareable code.
pub async fn find_by_code(state: &SharedState, code: &str) -> Result<SessionSummary, ServiceError> {
    let code = code.to_ascii_uppercase();
    validate_session_code(&code)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let store = state.require_session_store().await?;

    let session = store
        .find_session_by_code(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no session with code `{code}`")))?;

    let (session, participants) = store
        .session_with_participants(session.id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{}` not found", session.id)))?;

    Ok(SessionSummary::project(session, participants))
}

/// Build a fresh human participant row with the archetype's starting stats.
pub fn new_participant(
    config: &AppConfig,
    session_id: Uuid,
    user_id: Uuid,
    display_name: String,
    sprite: SpriteKind,
) -> ParticipantEntity {
    let profile = config.sprite_profile(sprite);
    ParticipantEntity {
        session_id,
        user_id,
        display_name,
        is_bot: false,
        score: 0,
        correct_count: 0,
        answered_count: 0,
        is_ready: false,
        hp: profile.starting_hp,
        max_hp: profile.starting_hp,
        shield_active: false,
        charge_power: 0,
        last_action: None,
        sprite,
        energy: profile.starting_energy,
        joined_at: SystemTime::now(),
        left_at: None,
    }
}

/// Build a bot participant: random archetype, stats scaled by the host's
/// difficulty level, always ready.
pub fn new_bot_participant(
    config: &AppConfig,
    session_id: Uuid,
    difficulty: u32,
) -> ParticipantEntity {
    let mut rng = rand::rng();
    let sprite = bot::random_sprite(&mut rng);
    let profile = bot::scaled_profile(config.bot(), config.sprite_profile(sprite), difficulty);

    ParticipantEntity {
        session_id,
        user_id: Uuid::new_v4(),
        display_name: format!("Rumble Bot {}", rng.random_range(10..100)),
        is_bot: true,
        score: 0,
        correct_count: 0,
        answered_count: 0,
        is_ready: true,
        hp: profile.starting_hp,
        max_hp: profile.starting_hp,
        shield_active: false,
        charge_power: 0,
        last_action: None,
        sprite,
        energy: profile.starting_energy,
        joined_at: SystemTime::now(),
        left_at: None,
    }
}

/// Draw a six-character join code from the uppercase alphanumeric alphabet.
pub fn generate_session_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SESSION_CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..CODE_ALPHABET.len());
            char::from(CODE_ALPHABET[index])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::validation::validate_session_code;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_codes_pass_validation() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..32 {
            let code = generate_session_code(&mut rng);
            assert!(validate_session_code(&code).is_ok(), "bad code `{code}`");
        }
    }

    #[test]
    fn new_participant_starts_with_archetype_stats() {
        let config = AppConfig::default();
        let row = new_participant(
            &config,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "host".into(),
            SpriteKind::Tank,
        );
        assert_eq!(row.hp, 140);
        assert_eq!(row.max_hp, 140);
        assert_eq!(row.energy, 40);
        assert!(!row.is_ready);
        assert!(!row.is_bot);
    }

    #[test]
    fn bots_join_ready_with_scaled_stats() {
        let config = AppConfig::default();
        let row = new_bot_participant(&config, Uuid::new_v4(), 10);
        assert!(row.is_bot);
        assert!(row.is_ready);
        let base = config.sprite_profile(row.sprite);
        assert!(row.max_hp > base.starting_hp);
    }
}
