//! In-memory [`SessionStore`] backend.
//!
//! Backs integration tests and storage-less local runs. Participant rows are
//! kept in join order so leaderboard ties stay stable.

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::time::SystemTime;
use uuid::Uuid;

use super::SessionStore;
use crate::dao::models::{
    AnswerEntity, BattleAction, ParticipantEntity, RiddleEntity, SessionEntity, SessionStatus,
    SpriteKind,
};
use crate::dao::storage::StorageResult;

/// Process-local session store. Cheap to clone; all clones share the maps.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    inner: std::sync::Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: DashMap<Uuid, SessionEntity>,
    codes: DashMap<String, Uuid>,
    participants: DashMap<Uuid, IndexMap<Uuid, ParticipantEntity>>,
    answers: DashMap<Uuid, Vec<AnswerEntity>>,
    riddles: DashMap<Uuid, RiddleEntity>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_participant<F>(&self, session_id: Uuid, user_id: Uuid, mutate: F)
    where
        F: FnOnce(&mut ParticipantEntity),
    {
        if let Some(mut roster) = self.inner.participants.get_mut(&session_id)
            && let Some(participant) = roster.get_mut(&user_id)
        {
            mutate(participant);
        }
    }

    fn with_session<F>(&self, session_id: Uuid, mutate: F)
    where
        F: FnOnce(&mut SessionEntity),
    {
        if let Some(mut session) = self.inner.sessions.get_mut(&session_id) {
            mutate(&mut session);
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(
        &self,
        session: SessionEntity,
        riddles: Vec<RiddleEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.codes.insert(session.code.clone(), session.id);
            store
                .inner
                .participants
                .entry(session.id)
                .or_default();
            for riddle in riddles {
                store.inner.riddles.insert(riddle.id, riddle);
            }
            store.inner.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .inner
                .codes
                .get(&code)
                .and_then(|id| store.inner.sessions.get(&id).map(|s| s.clone()));
            Ok(found)
        })
    }

    fn session_with_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<(SessionEntity, Vec<ParticipantEntity>)>>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(session) = store.inner.sessions.get(&session_id).map(|s| s.clone()) else {
                return Ok(None);
            };
            let roster = store
                .inner
                .participants
                .get(&session_id)
                .map(|roster| roster.values().cloned().collect())
                .unwrap_or_default();
            Ok(Some((session, roster)))
        })
    }

    fn join_session(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .participants
                .entry(participant.session_id)
                .or_default()
                .insert(participant.user_id, participant);
            Ok(())
        })
    }

    fn mark_ready(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| p.is_ready = true);
            Ok(())
        })
    }

    fn start_session(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_session(session_id, |session| {
                session.status = SessionStatus::Active;
                session.started_at = Some(SystemTime::now());
            });
            Ok(())
        })
    }

    fn advance_question_index(
        &self,
        session_id: Uuid,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_session(session_id, |session| {
                // The index never moves backwards for the life of a session.
                if index > session.current_question_index {
                    session.current_question_index = index;
                }
            });
            Ok(())
        })
    }

    fn finish_session(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_session(session_id, |session| {
                session.status = SessionStatus::Finished;
                session.finished_at = Some(SystemTime::now());
            });
            Ok(())
        })
    }

    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .answers
                .entry(answer.session_id)
                .or_default()
                .push(answer);
            Ok(())
        })
    }

    fn update_score(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        score: i64,
        correct_count: u32,
        answered_count: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| {
                p.score = score;
                p.correct_count = correct_count;
                p.answered_count = answered_count;
            });
            Ok(())
        })
    }

    fn update_hp(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        hp: i32,
        max_hp: i32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| {
                p.max_hp = max_hp;
                p.hp = hp.clamp(0, max_hp);
            });
            Ok(())
        })
    }

    fn update_shield(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| p.shield_active = active);
            Ok(())
        })
    }

    fn update_charge(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        charge_power: i32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| p.charge_power = charge_power);
            Ok(())
        })
    }

    fn update_last_action(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: BattleAction,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| p.last_action = Some(action));
            Ok(())
        })
    }

    fn update_sprite(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        sprite: SpriteKind,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| p.sprite = sprite);
            Ok(())
        })
    }

    fn update_energy(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        energy: i32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| p.energy = energy.max(0));
            Ok(())
        })
    }

    fn mark_left(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.with_participant(session_id, user_id, |p| {
                p.left_at = Some(SystemTime::now());
            });
            Ok(())
        })
    }

    fn answers_for_question(
        &self,
        session_id: Uuid,
        question_index: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let answers = store
                .inner
                .answers
                .get(&session_id)
                .map(|answers| {
                    answers
                        .iter()
                        .filter(|a| a.question_index == question_index)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            Ok(answers)
        })
    }

    fn riddle_by_id(
        &self,
        riddle_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RiddleEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.riddles.get(&riddle_id).map(|r| r.clone())) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn sample_session() -> SessionEntity {
        SessionEntity {
            id: Uuid::new_v4(),
            code: "AB12CD".into(),
            host_id: Uuid::new_v4(),
            status: SessionStatus::Waiting,
            riddle_order: vec![],
            current_question_index: 0,
            seconds_per_question: 30,
            category: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn sample_participant(session_id: Uuid) -> ParticipantEntity {
        ParticipantEntity {
            session_id,
            user_id: Uuid::new_v4(),
            display_name: "p".into(),
            is_bot: false,
            score: 0,
            correct_count: 0,
            answered_count: 0,
            is_ready: false,
            hp: 100,
            max_hp: 100,
            shield_active: false,
            charge_power: 0,
            last_action: None,
            sprite: SpriteKind::Balanced,
            energy: 50,
            joined_at: SystemTime::now(),
            left_at: None,
        }
    }

    #[tokio::test]
    async fn code_resolves_to_session() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let id = session.id;
        store.create_session(session, vec![]).await.unwrap();

        let found = store
            .find_session_by_code("AB12CD".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(
            store
                .find_session_by_code("ZZZZZZ".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn question_index_never_regresses() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let id = session.id;
        store.create_session(session, vec![]).await.unwrap();

        store.advance_question_index(id, 3).await.unwrap();
        store.advance_question_index(id, 1).await.unwrap();

        let (session, _) = store.session_with_participants(id).await.unwrap().unwrap();
        assert_eq!(session.current_question_index, 3);
    }

    #[tokio::test]
    async fn hp_updates_clamp_to_bounds() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let sid = session.id;
        store.create_session(session, vec![]).await.unwrap();
        let participant = sample_participant(sid);
        let uid = participant.user_id;
        store.join_session(participant).await.unwrap();

        store.update_hp(sid, uid, -25, 100).await.unwrap();
        let (_, roster) = store.session_with_participants(sid).await.unwrap().unwrap();
        assert_eq!(roster[0].hp, 0);

        store.update_hp(sid, uid, 250, 100).await.unwrap();
        let (_, roster) = store.session_with_participants(sid).await.unwrap().unwrap();
        assert_eq!(roster[0].hp, 100);
    }

    #[tokio::test]
    async fn answers_are_retrievable_with_recorded_verdict() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let sid = session.id;
        store.create_session(session, vec![]).await.unwrap();

        let answer = AnswerEntity {
            session_id: sid,
            user_id: Uuid::new_v4(),
            riddle_id: Uuid::new_v4(),
            question_index: 2,
            submitted_text: "a sponge".into(),
            is_correct: true,
            seconds_to_answer: 4.5,
            submitted_at: SystemTime::now(),
        };
        store.save_answer(answer.clone()).await.unwrap();

        let round = store.answers_for_question(sid, 2).await.unwrap();
        assert_eq!(round.len(), 1);
        assert!(round[0].is_correct);
        assert!(store.answers_for_question(sid, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn participants_keep_join_order() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let sid = session.id;
        store.create_session(session, vec![]).await.unwrap();

        let first = sample_participant(sid);
        let second = sample_participant(sid);
        let (first_id, second_id) = (first.user_id, second.user_id);
        store.join_session(first).await.unwrap();
        store.join_session(second).await.unwrap();

        let (_, roster) = store.session_with_participants(sid).await.unwrap().unwrap();
        assert_eq!(
            roster.iter().map(|p| p.user_id).collect::<Vec<_>>(),
            vec![first_id, second_id]
        );
    }
}
