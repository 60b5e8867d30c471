//! The battle/quiz coordinator: the message-driven state machine owning
//! session progression.
//!
//! Every inbound socket message lands here. Handlers read participant state
//! from the store, mutate a local copy, write the changed fields back, and
//! fan resulting events out through the connection registry. The store calls
//! are independent awaited operations; two racing messages against the same
//! participant resolve last-write-wins.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use axum::extract::ws::{Message, WebSocket};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerEntity, BattleAction, ParticipantEntity, RiddleEntity, SessionEntity, SessionStatus,
        SpriteKind,
    },
    dto::ws::{BattleEffect, ClientMessage, EffectKind, OutboundFrame, ServerEvent},
    dto::game::{RiddleSnapshot, SessionSummary, build_leaderboard},
    dao::storage::StorageError,
    error::ServiceError,
    services::{battle, bot, judge, session_service},
    state::SharedState,
};

/// How long a fresh socket gets to send its `join` message.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Effect label for an answer that arrived blank.
const REASON_TIMEOUT: &str = "Time Ran Out";
/// Effect label for a judged-incorrect answer.
const REASON_WRONG: &str = "Wrong Answer";
/// Effect label for the energy gained on a correct answer.
const REASON_CORRECT: &str = "Correct Answer";

/// Errors raised while handling a game socket message.
///
/// These are reported to the originating socket only, as `error` events; the
/// session and every other socket are unaffected.
#[derive(Debug, Error)]
pub enum GameError {
    /// A second `join` arrived on an already-bound socket.
    #[error("this socket already joined a session")]
    AlreadyJoined,
    /// The referenced session does not exist.
    #[error("session `{0}` not found")]
    SessionNotFound(Uuid),
    /// The sender has no participant row in the session.
    #[error("user `{user_id}` is not a participant of session `{session_id}`")]
    ParticipantNotFound {
        /// Session looked up.
        session_id: Uuid,
        /// Missing participant.
        user_id: Uuid,
    },
    /// The readiness gate failed on an explicit start request.
    #[error("cannot start: {ready} of {total} participants ready")]
    NotAllReady {
        /// Participants currently ready.
        ready: usize,
        /// Active participant count.
        total: usize,
    },
    /// The session needs at least two participants to start.
    #[error("cannot start: a battle needs at least 2 participants (got {0})")]
    NotEnoughPlayers(usize),
    /// A start was requested on a session that is no longer waiting.
    #[error("the game has already started")]
    AlreadyStarted,
    /// A gameplay message arrived while the session is not active.
    #[error("the game is not active")]
    NotActive,
    /// The session's question order references a missing riddle.
    #[error("no question at index {0}")]
    QuestionMissing(usize),
    /// An attack was taken with nobody to hit.
    #[error("no opponent to attack")]
    NoOpponent,
    /// Error from persistence or state management operations.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

impl From<StorageError> for GameError {
    fn from(err: StorageError) -> Self {
        GameError::Service(ServiceError::from(err))
    }
}

/// Handle the full lifecycle of one game WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(JOIN_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match serde_json::from_str::<ClientMessage>(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse join message");
            send_error_frame(&outbound_tx, "expected a valid join message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ClientMessage::Join {
        user_id,
        session_id,
        display_name,
    } = inbound
    else {
        warn!("first message was not a join");
        send_error_frame(&outbound_tx, "the first message must be a join");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    // Register before announcing so the joiner sees their own user-joined.
    state
        .registry()
        .register(user_id, session_id, outbound_tx.clone());

    if let Err(err) = join(&state, session_id, user_id, display_name).await {
        warn!(%user_id, %session_id, error = %err, "join rejected");
        send_error_frame(&outbound_tx, &err.to_string());
        state.registry().unregister(user_id);
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    info!(%user_id, %session_id, "player connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(inbound) => {
                        if let Err(err) =
                            dispatch(&state, session_id, user_id, inbound).await
                        {
                            warn!(%user_id, error = %err, "message handling failed");
                            send_error_frame(&outbound_tx, &err.to_string());
                        }
                    }
                    Err(err) => {
                        warn!(%user_id, error = %err, "failed to parse client message");
                        send_error_frame(&outbound_tx, "malformed message");
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%user_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    leave(&state, session_id, user_id).await;
    info!(%user_id, %session_id, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route a parsed client message to its handler. Exhaustive on purpose:
/// adding a message type without wiring a handler fails to compile.
pub async fn dispatch(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    message: ClientMessage,
) -> Result<(), GameError> {
    match message {
        ClientMessage::Join { .. } => Err(GameError::AlreadyJoined),
        ClientMessage::Ready => mark_ready(state, session_id, user_id).await,
        ClientMessage::StartGame => request_start(state, session_id, user_id).await,
        ClientMessage::SubmitAnswer {
            answer,
            time_to_answer_seconds,
            question_index,
        } => {
            submit_answer(
                state,
                session_id,
                user_id,
                &answer,
                time_to_answer_seconds,
                question_index,
            )
            .await
        }
        ClientMessage::BattleAction { action } => {
            battle_action(state, session_id, user_id, action).await
        }
        ClientMessage::SelectSprite { sprite_type } => {
            select_sprite(state, session_id, user_id, sprite_type).await
        }
        ClientMessage::Unknown => Err(GameError::Service(ServiceError::InvalidInput(
            "unknown message type".into(),
        ))),
    }
}

/// Bind a user to a session, creating their participant row on first join.
pub async fn join(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    display_name: Option<String>,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    match participants.iter().find(|p| p.user_id == user_id) {
        Some(existing) => {
            // Rejoin after a disconnect: revive the soft-deleted row, stats
            // intact, so the player can keep fighting.
            if existing.left_at.is_some() {
                let mut row = existing.clone();
                row.left_at = None;
                store.join_session(row).await?;
            }
        }
        None => {
            if session.status == SessionStatus::Finished {
                return Err(GameError::NotActive);
            }
            let name =
                display_name.unwrap_or_else(|| format!("Player {}", &user_id.to_string()[..8]));
            let row = session_service::new_participant(
                state.config(),
                session_id,
                user_id,
                name,
                SpriteKind::Balanced,
            );
            store.join_session(row).await?;
        }
    }

    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;
    state.registry().broadcast(
        session_id,
        ServerEvent::UserJoined {
            user_id,
            session: SessionSummary::project(session, participants),
        },
    );

    Ok(())
}

/// Flag a participant ready and start the game once everyone is.
pub async fn mark_ready(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    store.mark_ready(session_id, user_id).await?;

    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    let active: Vec<&ParticipantEntity> =
        participants.iter().filter(|p| p.is_active()).collect();
    let all_ready = active.iter().all(|p| p.is_ready);
    let enough_players = active.len() >= 2;
    let waiting = session.status == SessionStatus::Waiting;

    state.registry().broadcast(
        session_id,
        ServerEvent::PlayerReady {
            user_id,
            all_ready,
            session: SessionSummary::project(session.clone(), participants.clone()),
        },
    );

    if all_ready && enough_players && waiting {
        begin_game(state, session).await?;
    }

    Ok(())
}

/// Explicit start request from the host. Re-checks the readiness gate and
/// reports a failure back instead of silently ignoring it.
pub async fn request_start(
    state: &SharedState,
    session_id: Uuid,
    _user_id: Uuid,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    if session.status != SessionStatus::Waiting {
        return Err(GameError::AlreadyStarted);
    }

    let active: Vec<&ParticipantEntity> =
        participants.iter().filter(|p| p.is_active()).collect();
    if active.len() < 2 {
        return Err(GameError::NotEnoughPlayers(active.len()));
    }
    let ready = active.iter().filter(|p| p.is_ready).count();
    if ready != active.len() {
        return Err(GameError::NotAllReady {
            ready,
            total: active.len(),
        });
    }

    begin_game(state, session).await
}

/// Transition a waiting session to active and send out the first question.
async fn begin_game(state: &SharedState, session: SessionEntity) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    store.start_session(session.id).await?;

    let first_id = session
        .riddle_order
        .first()
        .copied()
        .ok_or(GameError::QuestionMissing(0))?;
    let riddle = store
        .riddle_by_id(first_id)
        .await?
        .ok_or(GameError::QuestionMissing(0))?;

    info!(session_id = %session.id, questions = session.riddle_order.len(), "game started");

    state.registry().broadcast(
        session.id,
        ServerEvent::GameStarted {
            current_question: RiddleSnapshot::from(riddle.clone()),
            question_index: 0,
            time_per_question: session.seconds_per_question,
        },
    );

    spawn_bot_turns(state.clone(), session.id, 0, riddle).await;
    Ok(())
}

/// Score one submitted answer, persist it, and advance the round once every
/// active participant has answered.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    answer: &str,
    seconds_to_answer: f64,
    question_index: usize,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    if session.status != SessionStatus::Active {
        return Err(GameError::NotActive);
    }

    let mut participant = participants
        .iter()
        .find(|p| p.user_id == user_id && p.is_active())
        .cloned()
        .ok_or(GameError::ParticipantNotFound {
            session_id,
            user_id,
        })?;

    let riddle_id = session
        .riddle_order
        .get(question_index)
        .copied()
        .ok_or(GameError::QuestionMissing(question_index))?;
    let riddle = store
        .riddle_by_id(riddle_id)
        .await?
        .ok_or(GameError::QuestionMissing(question_index))?;

    // One scored answer per user per question; repeats are rejected.
    let existing = store.answers_for_question(session_id, question_index).await?;
    if existing.iter().any(|a| a.user_id == user_id) {
        return Err(GameError::Service(ServiceError::InvalidState(format!(
            "question {question_index} was already answered"
        ))));
    }

    // A blank submission is a timeout: always incorrect, judged by nobody.
    let timed_out = answer.trim().is_empty();
    let is_correct = !timed_out && judge::check(answer, &riddle.answer).is_correct;

    let tuning = state.config().battle();
    let profile = state.config().sprite_profile(participant.sprite);
    let mut effects = Vec::new();

    participant.answered_count += 1;
    if is_correct {
        let points =
            battle::points_for_correct(tuning, session.seconds_per_question, seconds_to_answer);
        participant.score += points;
        participant.correct_count += 1;
        if profile.correct_energy_bonus > 0 {
            participant.energy += profile.correct_energy_bonus;
            effects.push(BattleEffect {
                user_id,
                effect: EffectKind::EnergyGain,
                amount: profile.correct_energy_bonus,
                reason: REASON_CORRECT.into(),
            });
        }
    } else {
        // Timeouts cost a fixed amount regardless of archetype.
        let penalty = if timed_out {
            tuning.timeout_penalty
        } else {
            profile.wrong_answer_penalty
        };
        participant.hp = (participant.hp - penalty).max(0);
        effects.push(BattleEffect {
            user_id,
            effect: EffectKind::HpLoss,
            amount: penalty,
            reason: if timed_out { REASON_TIMEOUT } else { REASON_WRONG }.into(),
        });
    }

    store
        .save_answer(AnswerEntity {
            session_id,
            user_id,
            riddle_id,
            question_index,
            submitted_text: answer.to_owned(),
            is_correct,
            seconds_to_answer,
            submitted_at: SystemTime::now(),
        })
        .await?;
    store
        .update_score(
            session_id,
            user_id,
            participant.score,
            participant.correct_count,
            participant.answered_count,
        )
        .await?;
    if is_correct {
        store
            .update_energy(session_id, user_id, participant.energy)
            .await?;
    } else {
        store
            .update_hp(session_id, user_id, participant.hp, participant.max_hp)
            .await?;
    }

    state.registry().broadcast(
        session_id,
        ServerEvent::AnswerSubmitted {
            user_id,
            is_correct,
            user_answer: answer.to_owned(),
            // The canonical answer is only revealed on a miss.
            correct_answer: (!is_correct).then(|| riddle.answer.clone()),
            question_index,
            battle_effects: effects,
        },
    );

    maybe_close_round(state, session_id, question_index).await
}

/// Check the advancement gate: when every active participant has an answer
/// on record for the round, broadcast the consolidated moves and schedule
/// the next question.
async fn maybe_close_round(
    state: &SharedState,
    session_id: Uuid,
    question_index: usize,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;

    // Recomputed from storage on every answer; idempotent under races, the
    // last arriving answer closes the round.
    let answers = store.answers_for_question(session_id, question_index).await?;
    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    if session.current_question_index != question_index {
        return Ok(());
    }

    // Only one answer per user counts; repeats never close the round early.
    let answered: HashSet<Uuid> = answers.iter().map(|a| a.user_id).collect();
    let pending = participants
        .iter()
        .filter(|p| p.is_active() && !answered.contains(&p.user_id))
        .count();
    if pending > 0 {
        return Ok(());
    }

    let moves = consolidate_moves(state, &participants, &answers);
    state.registry().broadcast(
        session_id,
        ServerEvent::BattleMoves {
            moves,
            question_index,
        },
    );

    let delay = Duration::from_millis(state.config().battle().advance_delay_ms);
    let state = state.clone();
    tokio::spawn(async move {
        // Fixed pacing delay so effect animations can play; not a
        // correctness mechanism.
        sleep(delay).await;
        if let Err(err) = advance_round(&state, session_id, question_index).await {
            warn!(%session_id, error = %err, "failed to advance round");
        }
    });

    Ok(())
}

/// Rebuild the round's effect list from every persisted answer.
fn consolidate_moves(
    state: &SharedState,
    participants: &[ParticipantEntity],
    answers: &[AnswerEntity],
) -> Vec<BattleEffect> {
    let tuning = state.config().battle();
    let mut seen = HashSet::new();
    answers
        .iter()
        .filter_map(|answer| {
            // The first recorded answer per user is the authoritative one.
            if !seen.insert(answer.user_id) {
                return None;
            }
            let sprite = participants
                .iter()
                .find(|p| p.user_id == answer.user_id)?
                .sprite;
            let profile = state.config().sprite_profile(sprite);
            let effect = if answer.is_correct {
                BattleEffect {
                    user_id: answer.user_id,
                    effect: EffectKind::EnergyGain,
                    amount: profile.correct_energy_bonus,
                    reason: REASON_CORRECT.into(),
                }
            } else if answer.is_timeout() {
                BattleEffect {
                    user_id: answer.user_id,
                    effect: EffectKind::HpLoss,
                    amount: tuning.timeout_penalty,
                    reason: REASON_TIMEOUT.into(),
                }
            } else {
                BattleEffect {
                    user_id: answer.user_id,
                    effect: EffectKind::HpLoss,
                    amount: profile.wrong_answer_penalty,
                    reason: REASON_WRONG.into(),
                }
            };
            Some(effect)
        })
        .collect()
}

/// Move to the next question, or finish the session after the last one.
async fn advance_round(
    state: &SharedState,
    session_id: Uuid,
    question_index: usize,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    if session.status != SessionStatus::Active
        || session.current_question_index != question_index
    {
        // Another handler already advanced or finished the session.
        return Ok(());
    }

    let closing_id = session
        .riddle_order
        .get(question_index)
        .copied()
        .ok_or(GameError::QuestionMissing(question_index))?;
    let closing_answer = store
        .riddle_by_id(closing_id)
        .await?
        .ok_or(GameError::QuestionMissing(question_index))?
        .answer;

    let next_index = question_index + 1;
    if next_index >= session.riddle_order.len() {
        store.finish_session(session_id).await?;
        let leaderboard = build_leaderboard(
            participants.into_iter().filter(|p| p.is_active()).collect(),
        );
        info!(%session_id, "game finished");
        state.registry().broadcast(
            session_id,
            ServerEvent::GameFinished {
                leaderboard,
                correct_answer: closing_answer,
            },
        );
        return Ok(());
    }

    store.advance_question_index(session_id, next_index).await?;
    let next_id = session.riddle_order[next_index];
    let riddle = store
        .riddle_by_id(next_id)
        .await?
        .ok_or(GameError::QuestionMissing(next_index))?;

    state.registry().broadcast(
        session_id,
        ServerEvent::NextQuestion {
            current_question: RiddleSnapshot::from(riddle.clone()),
            question_index: next_index,
            correct_answer: closing_answer,
        },
    );

    spawn_bot_turns(state.clone(), session_id, next_index, riddle).await;
    Ok(())
}

/// Resolve one battle action from a participant.
///
/// The energy cost is deducted up front and clamped at zero; an action is
/// never blocked for lack of energy.
pub async fn battle_action(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    action: BattleAction,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    let (session, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    if session.status != SessionStatus::Active {
        return Err(GameError::NotActive);
    }

    let mut actor = participants
        .iter()
        .find(|p| p.user_id == user_id && p.is_active())
        .cloned()
        .ok_or(GameError::ParticipantNotFound {
            session_id,
            user_id,
        })?;

    let tuning = *state.config().battle();
    battle::pay_action_cost(&mut actor, battle::action_cost(&tuning, action));
    store.update_energy(session_id, user_id, actor.energy).await?;
    store.update_last_action(session_id, user_id, action).await?;

    match action {
        BattleAction::Shield | BattleAction::Reflect => {
            actor.shield_active = true;
            store.update_shield(session_id, user_id, true).await?;
        }
        BattleAction::Charge => {
            actor.charge_power += tuning.charge_step;
            store
                .update_charge(session_id, user_id, actor.charge_power)
                .await?;
        }
        BattleAction::Attack => {
            let mut target = participants
                .iter()
                .find(|p| p.user_id != user_id && p.is_active())
                .cloned()
                .ok_or(GameError::NoOpponent)?;
            let target_reflects = state.config().sprite_profile(target.sprite).reflects;

            let outcome = battle::resolve_attack(&mut actor, &mut target, target_reflects, &tuning);

            store.update_charge(session_id, user_id, 0).await?;
            if outcome.reflected {
                store
                    .update_hp(session_id, user_id, actor.hp, actor.max_hp)
                    .await?;
                store.update_shield(session_id, target.user_id, false).await?;
            } else if outcome.shield_broken {
                store.update_shield(session_id, target.user_id, false).await?;
            } else {
                store
                    .update_hp(session_id, target.user_id, target.hp, target.max_hp)
                    .await?;
            }

            state.registry().broadcast(
                session_id,
                ServerEvent::BattleResult {
                    attacker_id: user_id,
                    target_id: target.user_id,
                    action,
                    damage: outcome.damage,
                    shield_broken: outcome.shield_broken.then_some(true),
                    reflected: outcome.reflected.then_some(true),
                    target_hp: target.hp,
                    attacker_hp: outcome.reflected.then_some(actor.hp),
                },
            );
        }
    }

    // Direct acknowledgement to the actor; non-attack actions additionally
    // notify the rest of the session (attacks already sent battle-result).
    state
        .registry()
        .send_to(user_id, ServerEvent::BattleActionConfirmed { action });
    if action != BattleAction::Attack {
        state.registry().broadcast_except(
            session_id,
            user_id,
            ServerEvent::ParticipantAction { user_id, action },
        );
    }

    Ok(())
}

/// Switch a participant to another archetype, resetting HP and energy to its
/// starting values. Allowed at any point, including mid-battle.
pub async fn select_sprite(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    sprite: SpriteKind,
) -> Result<(), GameError> {
    let store = state.require_session_store().await?;
    let (_, participants) = store
        .session_with_participants(session_id)
        .await?
        .ok_or(GameError::SessionNotFound(session_id))?;

    if !participants
        .iter()
        .any(|p| p.user_id == user_id && p.is_active())
    {
        return Err(GameError::ParticipantNotFound {
            session_id,
            user_id,
        });
    }

    let profile = state.config().sprite_profile(sprite);
    store.update_sprite(session_id, user_id, sprite).await?;
    store
        .update_hp(session_id, user_id, profile.starting_hp, profile.starting_hp)
        .await?;
    store
        .update_energy(session_id, user_id, profile.starting_energy)
        .await?;

    state.registry().broadcast(
        session_id,
        ServerEvent::SpriteSelected {
            user_id,
            sprite_type: sprite,
        },
    );

    Ok(())
}

/// Tear down a departed socket: drop the registry entries, stamp the
/// participant row, and tell the remaining players.
pub async fn leave(state: &SharedState, session_id: Uuid, user_id: Uuid) {
    let departed_session = state.registry().unregister(user_id);

    if let Some(store) = state.session_store().await
        && let Err(err) = store.mark_left(session_id, user_id).await
    {
        warn!(%user_id, error = %err, "failed to stamp participant departure");
    }

    if let Some(session_id) = departed_session {
        state
            .registry()
            .broadcast(session_id, ServerEvent::UserLeft { user_id });
    }
}

/// Give every bot in the session its turn for the question: a delayed answer
/// followed by a battle move, driven through the same handlers human
/// messages use.
///
/// Boxed: the round pipeline loops back into itself (bot answer, gate,
/// advance, next bot turns), so this future's type must be erased.
fn spawn_bot_turns(
    state: SharedState,
    session_id: Uuid,
    question_index: usize,
    riddle: RiddleEntity,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(store) = state.session_store().await else {
            return;
        };
        let bots: Vec<ParticipantEntity> = match store.session_with_participants(session_id).await
        {
            Ok(Some((_, participants))) => participants
                .into_iter()
                .filter(|p| p.is_bot && p.is_active())
                .collect(),
            Ok(None) => return,
            Err(err) => {
                warn!(%session_id, error = %err, "failed to load bots for round");
                return;
            }
        };

        for bot_row in bots {
            let state = state.clone();
            let answer = riddle.answer.clone();
            tokio::spawn(async move {
                run_bot_turn(state, session_id, bot_row, answer, question_index).await;
            });
        }
    })
}

/// One bot's behavior for one question.
async fn run_bot_turn(
    state: SharedState,
    session_id: Uuid,
    bot_row: ParticipantEntity,
    correct_answer: String,
    question_index: usize,
) {
    let tuning = *state.config().bot();
    let (latency, correct) = {
        let mut rng = rand::rng();
        (
            bot::answer_latency(&mut rng, &tuning),
            bot::answers_correctly(&mut rng, &tuning),
        )
    };

    sleep(latency).await;

    let text = if correct {
        correct_answer
    } else {
        "not a clue".to_owned()
    };
    if let Err(err) = submit_answer(
        &state,
        session_id,
        bot_row.user_id,
        &text,
        latency.as_secs_f64(),
        question_index,
    )
    .await
    {
        warn!(bot_id = %bot_row.user_id, error = %err, "bot answer failed");
        return;
    }

    // Pick the battle move off the post-answer energy pool.
    let energy = match reload_energy(&state, session_id, bot_row.user_id).await {
        Some(energy) => energy,
        None => bot_row.energy,
    };
    let decision = {
        let mut rng = rand::rng();
        let battle_tuning = *state.config().battle();
        let reflects = state.config().sprite_profile(bot_row.sprite).reflects;
        bot::choose_action(
            &mut rng,
            &tuning,
            |action| battle::action_cost(&battle_tuning, action),
            energy,
            reflects,
        )
    };

    if let bot::BotMove::Act(action) = decision
        && let Err(err) = battle_action(&state, session_id, bot_row.user_id, action).await
    {
        warn!(bot_id = %bot_row.user_id, error = %err, "bot action failed");
    }
}

/// Best-effort fetch of a participant's current energy.
async fn reload_energy(state: &SharedState, session_id: Uuid, user_id: Uuid) -> Option<i32> {
    let store = state.session_store().await?;
    let (_, participants) = store.session_with_participants(session_id).await.ok()??;
    participants
        .iter()
        .find(|p| p.user_id == user_id)
        .map(|p| p.energy)
}

/// Push an error event onto a socket's writer channel, bypassing the
/// registry (used before registration or after a failed join).
fn send_error_frame(tx: &mpsc::UnboundedSender<Message>, message: &str) {
    let frame = OutboundFrame::now(ServerEvent::Error {
        message: message.to_owned(),
    });
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = tx.send(Message::Text(payload.into()));
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use super::*;
    use crate::config::AppConfig;
    use crate::dao::session_store::memory::InMemorySessionStore;
    use crate::dto::game::{CreateSessionRequest, RiddleInput};
    use crate::services::session_service;
    use crate::state::AppState;

    const RECV_BUDGET: Duration = Duration::from_secs(5);

    /// Default tuning with all pacing delays removed so rounds advance
    /// immediately and bots act without latency.
    fn fast_config() -> AppConfig {
        let defaults = AppConfig::default();
        let mut battle = *defaults.battle();
        battle.advance_delay_ms = 0;
        let mut bot = *defaults.bot();
        bot.min_latency_secs = 0;
        bot.max_latency_secs = 0;
        bot.correct_rate = 1.0;
        AppConfig::with_tuning(battle, bot)
    }

    async fn state_with_store() -> SharedState {
        let state = AppState::new(fast_config());
        state
            .set_session_store(Arc::new(InMemorySessionStore::new()))
            .await;
        state
    }

    fn creation_request(
        host_id: Uuid,
        riddles: &[(&str, &str)],
        with_bot: bool,
    ) -> CreateSessionRequest {
        CreateSessionRequest {
            host_id,
            host_name: "host".into(),
            riddles: riddles
                .iter()
                .map(|(prompt, answer)| RiddleInput {
                    prompt: (*prompt).into(),
                    answer: (*answer).into(),
                    category: None,
                    difficulty: None,
                })
                .collect(),
            seconds_per_question: 30,
            category: None,
            with_bot,
            bot_difficulty: 3,
        }
    }

    /// Register a fake socket for a user and return its outbound stream.
    fn connect(state: &SharedState, session_id: Uuid, user_id: Uuid) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.registry().register(user_id, session_id, tx);
        rx
    }

    /// Pull frames off a fake socket until one matches the wanted type,
    /// skipping everything else.
    async fn next_event(rx: &mut UnboundedReceiver<Message>, event_type: &str) -> Value {
        loop {
            let message = timeout(RECV_BUDGET, rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for `{event_type}`"))
                .unwrap_or_else(|| panic!("socket closed waiting for `{event_type}`"));
            if let Message::Text(text) = message {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == event_type {
                    return value;
                }
            }
        }
    }

    /// Bring a two-player session up to the point where the game is running.
    async fn started_duel(
        state: &SharedState,
        riddles: &[(&str, &str)],
    ) -> (Uuid, Uuid, Uuid, UnboundedReceiver<Message>, UnboundedReceiver<Message>) {
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let summary = session_service::create_session(state, creation_request(host, riddles, false))
            .await
            .unwrap();
        let session_id = summary.id;

        let mut host_rx = connect(state, session_id, host);
        join(state, session_id, host, None).await.unwrap();
        let mut guest_rx = connect(state, session_id, guest);
        join(state, session_id, guest, Some("guest".into()))
            .await
            .unwrap();

        mark_ready(state, session_id, host).await.unwrap();
        mark_ready(state, session_id, guest).await.unwrap();

        next_event(&mut host_rx, "game-started").await;
        next_event(&mut guest_rx, "game-started").await;
        (session_id, host, guest, host_rx, guest_rx)
    }

    #[tokio::test]
    async fn two_players_play_a_full_match() {
        let state = state_with_store().await;
        let riddles = [
            ("what has keys but no locks", "a keyboard"),
            ("what gets wetter as it dries", "a towel"),
        ];
        let (session_id, host, guest, mut host_rx, mut guest_rx) =
            started_duel(&state, &riddles).await;

        submit_answer(&state, session_id, host, "a keyboard", 10.0, 0)
            .await
            .unwrap();
        let scored = next_event(&mut guest_rx, "answer-submitted").await;
        assert_eq!(scored["userId"], host.to_string());
        assert_eq!(scored["isCorrect"], true);
        assert!(scored.get("correctAnswer").is_none());

        submit_answer(&state, session_id, guest, "a keyboard", 5.0, 0)
            .await
            .unwrap();

        let next = next_event(&mut host_rx, "next-question").await;
        assert_eq!(next["questionIndex"], 1);
        assert_eq!(next["correctAnswer"], "a keyboard");
        assert!(next["currentQuestion"].get("answer").is_none());

        // Round two: the host answers, the guest lets the clock run out.
        submit_answer(&state, session_id, host, "a towel", 10.0, 1)
            .await
            .unwrap();
        submit_answer(&state, session_id, guest, "", 30.0, 1)
            .await
            .unwrap();

        // The host's own answer event comes off the wire first.
        let own = next_event(&mut host_rx, "answer-submitted").await;
        assert_eq!(own["userId"], host.to_string());
        let timed_out = next_event(&mut host_rx, "answer-submitted").await;
        assert_eq!(timed_out["userId"], guest.to_string());
        assert_eq!(timed_out["isCorrect"], false);
        assert_eq!(timed_out["correctAnswer"], "a towel");
        assert_eq!(timed_out["battleEffects"][0]["effect"], "hp-loss");
        assert_eq!(timed_out["battleEffects"][0]["amount"], 10);
        assert_eq!(timed_out["battleEffects"][0]["reason"], "Time Ran Out");

        let finished = next_event(&mut guest_rx, "game-finished").await;
        let board = finished["leaderboard"].as_array().unwrap();
        assert_eq!(board.len(), 2);
        // Host: 140 + 140. Guest: 150 + nothing.
        assert_eq!(board[0]["userId"], host.to_string());
        assert_eq!(board[0]["score"], 280);
        assert_eq!(board[0]["position"], 1);
        assert_eq!(board[1]["score"], 150);
        assert_eq!(board[1]["hp"], 90);
    }

    #[tokio::test]
    async fn shields_and_charges_shape_attack_damage() {
        let state = state_with_store().await;
        let (session_id, host, guest, mut host_rx, mut guest_rx) =
            started_duel(&state, &[("q", "a")]).await;

        battle_action(&state, session_id, guest, BattleAction::Shield)
            .await
            .unwrap();
        next_event(&mut guest_rx, "battle-action-confirmed").await;
        let seen = next_event(&mut host_rx, "participant-action").await;
        assert_eq!(seen["action"], "shield");

        battle_action(&state, session_id, host, BattleAction::Attack)
            .await
            .unwrap();
        let soaked = next_event(&mut guest_rx, "battle-result").await;
        assert_eq!(soaked["damage"], 0);
        assert_eq!(soaked["shieldBroken"], true);
        assert_eq!(soaked["targetHp"], 100);

        // The shield is spent; a plain attack now lands.
        battle_action(&state, session_id, host, BattleAction::Attack)
            .await
            .unwrap();
        let landed = next_event(&mut guest_rx, "battle-result").await;
        assert_eq!(landed["damage"], 10);
        assert_eq!(landed["targetHp"], 90);
        assert!(landed.get("shieldBroken").is_none());

        battle_action(&state, session_id, host, BattleAction::Charge)
            .await
            .unwrap();
        battle_action(&state, session_id, host, BattleAction::Attack)
            .await
            .unwrap();
        let charged = next_event(&mut guest_rx, "battle-result").await;
        assert_eq!(charged["damage"], 15);
        assert_eq!(charged["targetHp"], 75);
    }

    #[tokio::test]
    async fn reflector_shield_bounces_damage_back() {
        let state = state_with_store().await;
        let (session_id, host, guest, mut host_rx, _guest_rx) =
            started_duel(&state, &[("q", "a")]).await;

        select_sprite(&state, session_id, guest, SpriteKind::Reflector)
            .await
            .unwrap();
        next_event(&mut host_rx, "sprite-selected").await;

        battle_action(&state, session_id, guest, BattleAction::Reflect)
            .await
            .unwrap();
        battle_action(&state, session_id, host, BattleAction::Attack)
            .await
            .unwrap();

        let bounced = next_event(&mut host_rx, "battle-result").await;
        assert_eq!(bounced["reflected"], true);
        assert_eq!(bounced["targetHp"], 100);
        assert_eq!(bounced["attackerHp"], 90);
    }

    #[tokio::test]
    async fn joining_a_missing_session_fails() {
        let state = state_with_store().await;
        let result = join(&state, Uuid::new_v4(), Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(GameError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn start_gate_reports_what_is_missing() {
        let state = state_with_store().await;
        let host = Uuid::new_v4();
        let summary =
            session_service::create_session(&state, creation_request(host, &[("q", "a")], false))
                .await
                .unwrap();
        let session_id = summary.id;

        let _host_rx = connect(&state, session_id, host);
        join(&state, session_id, host, None).await.unwrap();
        mark_ready(&state, session_id, host).await.unwrap();
        assert!(matches!(
            request_start(&state, session_id, host).await,
            Err(GameError::NotEnoughPlayers(1))
        ));

        let guest = Uuid::new_v4();
        let _guest_rx = connect(&state, session_id, guest);
        join(&state, session_id, guest, None).await.unwrap();
        assert!(matches!(
            request_start(&state, session_id, host).await,
            Err(GameError::NotAllReady { ready: 1, total: 2 })
        ));
    }

    #[tokio::test]
    async fn battle_actions_need_an_active_game() {
        let state = state_with_store().await;
        let host = Uuid::new_v4();
        let summary =
            session_service::create_session(&state, creation_request(host, &[("q", "a")], false))
                .await
                .unwrap();

        let _host_rx = connect(&state, summary.id, host);
        join(&state, summary.id, host, None).await.unwrap();
        assert!(matches!(
            battle_action(&state, summary.id, host, BattleAction::Attack).await,
            Err(GameError::NotActive)
        ));
    }

    #[tokio::test]
    async fn bot_carries_the_match_to_completion() {
        let state = state_with_store().await;
        let host = Uuid::new_v4();
        let summary =
            session_service::create_session(&state, creation_request(host, &[("q", "a")], true))
                .await
                .unwrap();
        let session_id = summary.id;
        assert_eq!(summary.participants.len(), 2);

        let mut host_rx = connect(&state, session_id, host);
        join(&state, session_id, host, None).await.unwrap();

        // The bot is seeded ready, so the host's readiness starts the game.
        mark_ready(&state, session_id, host).await.unwrap();
        next_event(&mut host_rx, "game-started").await;

        submit_answer(&state, session_id, host, "a", 3.0, 0)
            .await
            .unwrap();

        let finished = next_event(&mut host_rx, "game-finished").await;
        let board = finished["leaderboard"].as_array().unwrap();
        assert_eq!(board.len(), 2);
        assert!(
            board
                .iter()
                .any(|entry| entry["displayName"].as_str().unwrap().starts_with("Rumble Bot"))
        );
    }

    #[tokio::test]
    async fn leaving_mid_game_frees_the_answer_gate() {
        let state = state_with_store().await;
        let riddles = [("q one", "one"), ("q two", "two")];
        let (session_id, host, guest, mut host_rx, guest_rx) =
            started_duel(&state, &riddles).await;

        drop(guest_rx);
        leave(&state, session_id, guest).await;
        next_event(&mut host_rx, "user-left").await;

        // With the guest gone, the host's answer alone closes the round.
        submit_answer(&state, session_id, host, "one", 4.0, 0)
            .await
            .unwrap();
        let next = next_event(&mut host_rx, "next-question").await;
        assert_eq!(next["questionIndex"], 1);
    }

    #[tokio::test]
    async fn rejoining_after_a_disconnect_restores_play() {
        let state = state_with_store().await;
        let (session_id, _host, guest, mut host_rx, guest_rx) =
            started_duel(&state, &[("q one", "one"), ("q two", "two")]).await;

        drop(guest_rx);
        leave(&state, session_id, guest).await;
        next_event(&mut host_rx, "user-left").await;

        let mut guest_rx = connect(&state, session_id, guest);
        join(&state, session_id, guest, None).await.unwrap();
        let rejoined = next_event(&mut host_rx, "user-joined").await;
        let roster = rejoined["session"]["participants"].as_array().unwrap();
        assert_eq!(roster.len(), 2);

        // The revived row is playable again and kept its original name.
        submit_answer(&state, session_id, guest, "one", 3.0, 0)
            .await
            .unwrap();
        let scored = next_event(&mut guest_rx, "answer-submitted").await;
        assert_eq!(scored["userId"], guest.to_string());
        assert!(
            roster
                .iter()
                .any(|p| p["userId"] == guest.to_string() && p["displayName"] == "guest")
        );
    }

    #[test]
    fn storage_failures_convert_into_service_errors() {
        let err = GameError::from(StorageError::unavailable(
            "load session",
            std::io::Error::other("connection reset"),
        ));
        assert!(matches!(err, GameError::Service(ServiceError::Unavailable(_))));
    }
}
