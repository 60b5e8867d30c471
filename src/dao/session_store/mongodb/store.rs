use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc, serialize_to_bson as to_bson},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAnswerDocument, MongoParticipantDocument, MongoRiddleDocument, MongoSessionDocument,
        bson_uuid, doc_id, participant_key,
    },
};
use crate::dao::{
    models::{
        AnswerEntity, BattleAction, ParticipantEntity, RiddleEntity, SessionEntity, SpriteKind,
    },
    session_store::SessionStore,
    storage::StorageResult,
};

const SESSION_COLLECTION: &str = "sessions";
const PARTICIPANT_COLLECTION: &str = "participants";
const ANSWER_COLLECTION: &str = "answers";
const RIDDLE_COLLECTION: &str = "riddles";

/// MongoDB-backed session store.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let sessions = database.collection::<MongoSessionDocument>(SESSION_COLLECTION);
        let code_index = mongodb::IndexModel::builder()
            .keys(doc! {"code": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        sessions
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION,
                index: "code",
                source,
            })?;

        let participants = database.collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION);
        let participant_index = mongodb::IndexModel::builder()
            .keys(doc! {"session_id": 1, "user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_session_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        participants
            .create_index(participant_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION,
                index: "session_id,user_id",
                source,
            })?;

        let answers = database.collection::<MongoAnswerDocument>(ANSWER_COLLECTION);
        let answer_index = mongodb::IndexModel::builder()
            .keys(doc! {"session_id": 1, "question_index": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("answer_round_idx".to_owned()))
                    .build(),
            )
            .build();
        answers
            .create_index(answer_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ANSWER_COLLECTION,
                index: "session_id,question_index",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database()
            .await
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        self.database()
            .await
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION)
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database()
            .await
            .collection::<MongoAnswerDocument>(ANSWER_COLLECTION)
    }

    async fn riddles(&self) -> Collection<MongoRiddleDocument> {
        self.database()
            .await
            .collection::<MongoRiddleDocument>(RIDDLE_COLLECTION)
    }

    /// Apply a `$set` update to a single participant row.
    async fn set_participant_fields(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        fields: mongodb::bson::Document,
    ) -> MongoResult<()> {
        self.participants()
            .await
            .update_one(participant_key(session_id, user_id), doc! {"$set": fields})
            .await
            .map_err(|source| MongoDaoError::SaveParticipant {
                session_id,
                user_id,
                source,
            })?;
        Ok(())
    }

    async fn set_session_fields(
        &self,
        session_id: Uuid,
        fields: mongodb::bson::Document,
    ) -> MongoResult<()> {
        self.sessions()
            .await
            .update_one(doc_id(session_id), doc! {"$set": fields})
            .await
            .map_err(|source| MongoDaoError::SaveSession {
                id: session_id,
                source,
            })?;
        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn create_session(
        &self,
        session: SessionEntity,
        riddles: Vec<RiddleEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let session_id = session.id;
            let riddle_collection = store.riddles().await;
            for riddle in riddles {
                let id = riddle.id;
                let document: MongoRiddleDocument = riddle.into();
                riddle_collection
                    .replace_one(doc_id(id), &document)
                    .upsert(true)
                    .await
                    .map_err(|source| MongoDaoError::SaveRiddle { id, source })?;
            }

            let document: MongoSessionDocument = session.into();
            store
                .sessions()
                .await
                .replace_one(doc_id(session_id), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveSession {
                    id: session_id,
                    source,
                })?;
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
                .sessions()
                .await
                .find_one(doc! {"code": &code})
                .await
                .map_err(|source| MongoDaoError::LookupCode { code, source })?;
            Ok(found.map(Into::into))
        })
    }

    fn session_with_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<(SessionEntity, Vec<ParticipantEntity>)>>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(session) = store
                .sessions()
                .await
                .find_one(doc_id(session_id))
                .await
                .map_err(|source| MongoDaoError::LoadSession {
                    id: session_id,
                    source,
                })?
            else {
                return Ok(None);
            };

            // Sorted by join time so tie-breaking stays stable across reads.
            let cursor = store
                .participants()
                .await
                .find(doc! {"session_id": bson_uuid(session_id)})
                .sort(doc! {"joined_at": 1})
                .await
                .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?;
            let documents: Vec<MongoParticipantDocument> = cursor
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?;

            Ok(Some((
                session.into(),
                documents.into_iter().map(Into::into).collect(),
            )))
        })
    }

    fn join_session(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let (session_id, user_id) = (participant.session_id, participant.user_id);
            let document: MongoParticipantDocument = participant.into();
            store
                .participants()
                .await
                .replace_one(participant_key(session_id, user_id), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveParticipant {
                    session_id,
                    user_id,
                    source,
                })?;
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
            store
                .set_participant_fields(session_id, user_id, doc! {"is_ready": true})
                .await
                .map_err(Into::into)
        })
    }

    fn start_session(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_session_fields(
                    session_id,
                    doc! {"status": "active", "started_at": DateTime::now()},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn advance_question_index(
        &self,
        session_id: Uuid,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            // `$max` keeps the index monotonic even under racing updates.
            store
                .sessions()
                .await
                .update_one(
                    doc_id(session_id),
                    doc! {"$max": {"current_question_index": index as i64}},
                )
                .await
                .map_err(|source| MongoDaoError::SaveSession {
                    id: session_id,
                    source,
                })?;
            Ok(())
        })
    }

    fn finish_session(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_session_fields(
                    session_id,
                    doc! {"status": "finished", "finished_at": DateTime::now()},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let session_id = answer.session_id;
            let document: MongoAnswerDocument = answer.into();
            store
                .answers()
                .await
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::SaveAnswer { session_id, source })?;
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
            store
                .set_participant_fields(
                    session_id,
                    user_id,
                    doc! {
                        "score": score,
                        "correct_count": correct_count,
                        "answered_count": answered_count,
                    },
                )
                .await
                .map_err(Into::into)
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
            let clamped = hp.clamp(0, max_hp);
            store
                .set_participant_fields(
                    session_id,
                    user_id,
                    doc! {"hp": clamped, "max_hp": max_hp},
                )
                .await
                .map_err(Into::into)
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
            store
                .set_participant_fields(session_id, user_id, doc! {"shield_active": active})
                .await
                .map_err(Into::into)
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
            store
                .set_participant_fields(session_id, user_id, doc! {"charge_power": charge_power})
                .await
                .map_err(Into::into)
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
            let value = to_bson(&action).unwrap_or(mongodb::bson::Bson::Null);
            store
                .set_participant_fields(session_id, user_id, doc! {"last_action": value})
                .await
                .map_err(Into::into)
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
            let value = to_bson(&sprite).unwrap_or(mongodb::bson::Bson::Null);
            store
                .set_participant_fields(session_id, user_id, doc! {"sprite": value})
                .await
                .map_err(Into::into)
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
            store
                .set_participant_fields(session_id, user_id, doc! {"energy": energy.max(0)})
                .await
                .map_err(Into::into)
        })
    }

    fn mark_left(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_participant_fields(session_id, user_id, doc! {"left_at": DateTime::now()})
                .await
                .map_err(Into::into)
        })
    }

    fn answers_for_question(
        &self,
        session_id: Uuid,
        question_index: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let cursor = store
                .answers()
                .await
                .find(doc! {
                    "session_id": bson_uuid(session_id),
                    "question_index": question_index as i64,
                })
                .await
                .map_err(|source| MongoDaoError::LoadAnswers { session_id, source })?;
            let documents: Vec<MongoAnswerDocument> = cursor
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::LoadAnswers { session_id, source })?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn riddle_by_id(
        &self,
        riddle_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RiddleEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .riddles()
                .await
                .find_one(doc_id(riddle_id))
                .await
                .map_err(|source| MongoDaoError::LoadRiddle {
                    id: riddle_id,
                    source,
                })?;
            Ok(found.map(Into::into))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}
