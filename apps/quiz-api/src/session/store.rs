//! Authoritative in-process quiz state, cached from the shared store.
//!
//! Each quiz sits in its own slot: a `parking_lot::Mutex` guarding the quiz
//! (never held across an `.await`) and an async turn lock that callers hold
//! while they mutate, persist, and broadcast so that events leave in the
//! order mutations were applied.
//!
//! Several instances may write the same quiz. Writes and relay refreshes
//! merge the stored copy into the cached one (see [`Quiz::merge`]) rather
//! than replacing either, and accepted answers are claimed in the shared
//! store so a question is answered at most once across instances.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use super::rules::{self, Submission, MAX_NAME_LEN, MAX_TITLE_LEN};
use crate::db::kv::{keys, KeyValueStore};
use crate::error::{QuizError, StoreError};
use crate::models::leaderboard::LeaderboardEntry;
use crate::models::question::question_bank;
use crate::models::quiz::{Quiz, QuizStats};
use crate::models::user::User;

/// Exclusive right to run a mutate-then-broadcast sequence on one quiz.
pub type Turn = OwnedMutexGuard<()>;

struct QuizSlot {
    quiz: Mutex<Quiz>,
    turn: Arc<tokio::sync::Mutex<()>>,
}

impl QuizSlot {
    fn new(quiz: Quiz) -> Arc<Self> {
        Arc::new(Self {
            quiz: Mutex::new(quiz),
            turn: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    fn snapshot(&self) -> Quiz {
        self.quiz.lock().clone()
    }
}

pub struct SessionStore {
    quizzes: DashMap<String, Arc<QuizSlot>>,
    kv: Option<Arc<dyn KeyValueStore>>,
    ttl_secs: u64,
}

impl SessionStore {
    /// `kv = None` keeps everything in memory (single-instance mode).
    pub fn new(kv: Option<Arc<dyn KeyValueStore>>, ttl_secs: u64) -> Self {
        Self {
            quizzes: DashMap::new(),
            kv,
            ttl_secs,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.kv.is_some()
    }

    /// Number of quizzes currently cached in this process.
    pub fn quiz_count(&self) -> usize {
        self.quizzes.len()
    }

    /// Load every quiz listed in the active set into the cache.
    pub async fn warm(&self) -> usize {
        let Some(kv) = &self.kv else {
            return 0;
        };
        let ids = match kv.smembers(keys::ACTIVE_QUIZZES).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(?e, "failed to list active quizzes");
                return 0;
            }
        };

        let mut loaded = 0;
        for quiz_id in ids {
            if self.quizzes.contains_key(&quiz_id) {
                continue;
            }
            if let Some(quiz) = load_listed(kv.as_ref(), &quiz_id).await {
                self.quizzes
                    .entry(quiz_id)
                    .or_insert_with(|| QuizSlot::new(quiz));
                loaded += 1;
            }
        }
        tracing::info!(loaded, "quiz cache warmed from store");
        loaded
    }

    /// Wait for the exclusive turn on a quiz.
    pub async fn turn(&self, quiz_id: &str) -> Result<Turn, QuizError> {
        let slot = self.slot(quiz_id).await?;
        Ok(slot.turn.clone().lock_owned().await)
    }

    pub async fn create_quiz(&self, title: &str) -> Result<Quiz, QuizError> {
        let title = rules::validate_text("title", title, MAX_TITLE_LEN)?;
        let quiz = Quiz::new(title, question_bank());

        self.quizzes.insert(quiz.id.clone(), QuizSlot::new(quiz.clone()));
        self.persist_quiz(&quiz).await;

        tracing::info!(quiz_id = %quiz.id, title = %quiz.title, "quiz created");
        Ok(quiz)
    }

    pub async fn get_quiz(&self, quiz_id: &str) -> Result<Quiz, QuizError> {
        Ok(self.slot(quiz_id).await?.snapshot())
    }

    /// Every live quiz known locally or listed in the shared active set,
    /// oldest first.
    pub async fn list_quizzes(&self) -> Vec<Quiz> {
        let slots: Vec<Arc<QuizSlot>> = self.quizzes.iter().map(|e| e.value().clone()).collect();
        let mut quizzes: Vec<Quiz> = slots.iter().map(|slot| slot.snapshot()).collect();

        if let Some(kv) = &self.kv {
            let members = match kv.smembers(keys::ACTIVE_QUIZZES).await {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!(?e, "failed to list active quizzes");
                    Vec::new()
                }
            };
            for quiz_id in members {
                if self.quizzes.contains_key(&quiz_id) {
                    continue;
                }
                if let Some(quiz) = load_listed(kv.as_ref(), &quiz_id).await {
                    let slot = self
                        .quizzes
                        .entry(quiz_id)
                        .or_insert_with(|| QuizSlot::new(quiz))
                        .value()
                        .clone();
                    quizzes.push(slot.snapshot());
                }
            }
        }
        quizzes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        quizzes
    }

    pub async fn join_quiz(&self, quiz_id: &str, name: &str) -> Result<User, QuizError> {
        let name = rules::validate_text("name", name, MAX_NAME_LEN)?;
        let slot = self.slot(quiz_id).await?;

        let user = User::new(name);
        slot.quiz
            .lock()
            .participants
            .insert(user.id.clone(), user.clone());

        self.persist_merged(&slot, quiz_id).await;
        self.persist_user(&user).await;

        tracing::info!(%quiz_id, user_id = %user.id, name = %user.name, "user joined quiz");
        Ok(user)
    }

    pub async fn submit_answer(
        &self,
        quiz_id: &str,
        user_id: &str,
        question_id: &str,
        choice: usize,
    ) -> Result<Submission, QuizError> {
        let slot = self.slot(quiz_id).await?;
        self.reconcile(&slot, quiz_id).await;

        rules::check_answer(&slot.quiz.lock(), user_id, question_id)?;
        let claimed = self.claim_answer(user_id, question_id, choice).await?;

        let applied = {
            let mut quiz = slot.quiz.lock();
            rules::apply_answer(&mut quiz, user_id, question_id, choice, Utc::now())
        };
        let mut submission = match applied {
            Ok(submission) => submission,
            Err(e) => {
                if claimed {
                    self.release_answer(user_id, question_id).await;
                }
                return Err(e);
            }
        };

        let merged = self.persist_merged(&slot, quiz_id).await;
        if let Some(user) = merged.participants.get(user_id) {
            submission.user = user.clone();
        }
        self.persist_user(&submission.user).await;

        tracing::info!(
            %quiz_id,
            %user_id,
            %question_id,
            correct = submission.answer.correct,
            points = submission.answer.points,
            "answer accepted"
        );
        Ok(submission)
    }

    /// Returns the start timestamp.
    pub async fn start_quiz(&self, quiz_id: &str) -> Result<DateTime<Utc>, QuizError> {
        let slot = self.slot(quiz_id).await?;
        self.reconcile(&slot, quiz_id).await;
        let now = Utc::now();

        rules::start(&mut slot.quiz.lock(), now)?;
        self.persist_merged(&slot, quiz_id).await;

        tracing::info!(%quiz_id, "quiz started");
        Ok(now)
    }

    /// Returns the end timestamp, or `None` if the quiz had already ended.
    pub async fn end_quiz(&self, quiz_id: &str) -> Result<Option<DateTime<Utc>>, QuizError> {
        let slot = self.slot(quiz_id).await?;
        self.reconcile(&slot, quiz_id).await;
        let now = Utc::now();

        if !rules::end(&mut slot.quiz.lock(), now)? {
            return Ok(None);
        }
        self.persist_merged(&slot, quiz_id).await;

        tracing::info!(%quiz_id, "quiz ended");
        Ok(Some(now))
    }

    /// Ranked snapshot of the quiz. The snapshot is also written to the
    /// store in the background.
    pub async fn leaderboard(&self, quiz_id: &str) -> Result<Vec<LeaderboardEntry>, QuizError> {
        let slot = self.slot(quiz_id).await?;
        let board = slot.quiz.lock().leaderboard();

        if let Some(kv) = self.kv.clone() {
            let key = keys::leaderboard(quiz_id);
            let snapshot = board.clone();
            let ttl_secs = self.ttl_secs;
            tokio::spawn(async move {
                if let Err(e) = write_json(kv.as_ref(), &key, &snapshot, ttl_secs).await {
                    tracing::warn!(?e, %key, "failed to persist leaderboard");
                }
            });
        }

        Ok(board)
    }

    pub async fn stats(&self, quiz_id: &str) -> Result<QuizStats, QuizError> {
        let slot = self.slot(quiz_id).await?;
        let stats = QuizStats::from(&*slot.quiz.lock());
        Ok(stats)
    }

    /// Look a participant up in the cache, then in the store.
    pub async fn get_user(&self, user_id: &str) -> Result<User, QuizError> {
        if let Some(user) = self.find_cached_user(user_id) {
            return Ok(user);
        }
        let Some(kv) = &self.kv else {
            return Err(QuizError::user_not_found(user_id));
        };
        match read_json::<User>(kv.as_ref(), &keys::user(user_id)).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(QuizError::user_not_found(user_id)),
            Err(e) => {
                tracing::warn!(?e, %user_id, "failed to load user from store");
                Err(QuizError::user_not_found(user_id))
            }
        }
    }

    /// Remove a quiz from the cache and the store. Idempotent.
    pub async fn delete_quiz(&self, quiz_id: &str) {
        let mut doomed = vec![keys::quiz(quiz_id), keys::leaderboard(quiz_id)];
        if let Some((_, slot)) = self.quizzes.remove(quiz_id) {
            let quiz = slot.quiz.lock();
            for user_id in quiz.participants.keys() {
                doomed.push(keys::user(user_id));
                doomed.extend(quiz.questions.iter().map(|q| keys::answer(user_id, &q.id)));
            }
        }

        if let Some(kv) = &self.kv {
            for key in doomed {
                if let Err(e) = kv.del(&key).await {
                    tracing::warn!(?e, %key, "failed to delete key");
                }
            }
            if let Err(e) = kv.srem(keys::ACTIVE_QUIZZES, quiz_id).await {
                tracing::warn!(?e, %quiz_id, "failed to remove quiz from active set");
            }
        }

        tracing::info!(%quiz_id, "quiz deleted");
    }

    /// Merge the stored copy of a quiz into the cached one. Quizzes that are
    /// not cached are left alone; quizzes gone from the store are evicted.
    /// When the cache holds something the store lacks, the merged quiz is
    /// written back.
    ///
    /// Waits for the quiz's turn so an in-flight local mutation is persisted
    /// before the stored copy is read back.
    pub async fn refresh(&self, quiz_id: &str) {
        let Some(slot) = self.cached(quiz_id) else {
            return;
        };
        let Some(kv) = &self.kv else {
            return;
        };
        let _turn = slot.turn.clone().lock_owned().await;
        let stored = match read_json::<Quiz>(kv.as_ref(), &keys::quiz(quiz_id)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                self.evict(quiz_id);
                return;
            }
            Err(e) => {
                tracing::warn!(?e, %quiz_id, "failed to refresh quiz from store");
                return;
            }
        };

        let merged = {
            let mut quiz = slot.quiz.lock();
            quiz.merge(stored.clone());
            quiz.clone()
        };
        if merged != stored {
            tracing::debug!(%quiz_id, "cached quiz ahead of store; writing merged copy");
            self.persist_quiz(&merged).await;
        }
    }

    /// Drop the cached copy of a quiz without touching the store.
    pub fn evict(&self, quiz_id: &str) {
        if self.quizzes.remove(quiz_id).is_some() {
            tracing::debug!(%quiz_id, "quiz evicted from cache");
        }
    }

    // -----------------------------------------------------------------------
    // Cache and persistence helpers
    // -----------------------------------------------------------------------

    fn cached(&self, quiz_id: &str) -> Option<Arc<QuizSlot>> {
        self.quizzes.get(quiz_id).map(|slot| slot.value().clone())
    }

    /// Cached slot, or load from the store and populate the cache.
    async fn slot(&self, quiz_id: &str) -> Result<Arc<QuizSlot>, QuizError> {
        if let Some(slot) = self.cached(quiz_id) {
            return Ok(slot);
        }
        let quiz = self
            .load(quiz_id)
            .await
            .ok_or_else(|| QuizError::quiz_not_found(quiz_id))?;
        let slot = self
            .quizzes
            .entry(quiz_id.to_string())
            .or_insert_with(|| QuizSlot::new(quiz))
            .value()
            .clone();
        Ok(slot)
    }

    fn find_cached_user(&self, user_id: &str) -> Option<User> {
        self.quizzes
            .iter()
            .find_map(|slot| slot.value().quiz.lock().participants.get(user_id).cloned())
    }

    async fn load(&self, quiz_id: &str) -> Option<Quiz> {
        let kv = self.kv.as_ref()?;
        match read_json::<Quiz>(kv.as_ref(), &keys::quiz(quiz_id)).await {
            Ok(quiz) => quiz,
            Err(e) => {
                tracing::warn!(?e, %quiz_id, "failed to load quiz from store");
                None
            }
        }
    }

    /// Fold the stored copy of a quiz into its cached slot.
    async fn reconcile(&self, slot: &QuizSlot, quiz_id: &str) {
        if let Some(stored) = self.load(quiz_id).await {
            slot.quiz.lock().merge(stored);
        }
    }

    /// Reconcile with the store, then write the merged quiz. Returns what
    /// was written.
    async fn persist_merged(&self, slot: &QuizSlot, quiz_id: &str) -> Quiz {
        self.reconcile(slot, quiz_id).await;
        let snapshot = slot.snapshot();
        self.persist_quiz(&snapshot).await;
        snapshot
    }

    /// Reserve a participant's answer to a question across instances.
    /// Returns whether a claim was taken; an unreachable store leaves the
    /// local check as the only guard.
    async fn claim_answer(
        &self,
        user_id: &str,
        question_id: &str,
        choice: usize,
    ) -> Result<bool, QuizError> {
        let Some(kv) = &self.kv else {
            return Ok(false);
        };
        let key = keys::answer(user_id, question_id);
        match kv.set_nx_ex(&key, &choice.to_string(), self.ttl_secs).await {
            Ok(true) => Ok(true),
            Ok(false) => Err(QuizError::Conflict(format!(
                "user already answered question {question_id}"
            ))),
            Err(e) => {
                tracing::warn!(?e, %key, "failed to claim answer; relying on local check");
                Ok(false)
            }
        }
    }

    async fn release_answer(&self, user_id: &str, question_id: &str) {
        let Some(kv) = &self.kv else {
            return;
        };
        let key = keys::answer(user_id, question_id);
        if let Err(e) = kv.del(&key).await {
            tracing::warn!(?e, %key, "failed to release answer claim");
        }
    }

    async fn persist_quiz(&self, quiz: &Quiz) {
        let Some(kv) = &self.kv else {
            return;
        };
        if let Err(e) = write_json(kv.as_ref(), &keys::quiz(&quiz.id), quiz, self.ttl_secs).await {
            tracing::warn!(?e, quiz_id = %quiz.id, "failed to persist quiz; continuing in memory");
        }
        if let Err(e) = kv.sadd(keys::ACTIVE_QUIZZES, &quiz.id).await {
            tracing::warn!(?e, quiz_id = %quiz.id, "failed to add quiz to active set");
        }
    }

    async fn persist_user(&self, user: &User) {
        let Some(kv) = &self.kv else {
            return;
        };
        if let Err(e) = write_json(kv.as_ref(), &keys::user(&user.id), user, self.ttl_secs).await {
            tracing::warn!(?e, user_id = %user.id, "failed to persist user; continuing in memory");
        }
    }
}

async fn write_json<T: Serialize + ?Sized>(
    kv: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    kv.set_ex(key, &raw, ttl_secs).await
}

/// Load a quiz named in the active set. Ids whose quiz has expired are
/// pruned from the set.
async fn load_listed(kv: &dyn KeyValueStore, quiz_id: &str) -> Option<Quiz> {
    match read_json::<Quiz>(kv, &keys::quiz(quiz_id)).await {
        Ok(Some(quiz)) => Some(quiz),
        Ok(None) => {
            tracing::debug!(%quiz_id, "listed quiz expired; removing from active set");
            if let Err(e) = kv.srem(keys::ACTIVE_QUIZZES, quiz_id).await {
                tracing::warn!(?e, %quiz_id, "failed to prune active set");
            }
            None
        }
        Err(e) => {
            tracing::warn!(?e, %quiz_id, "failed to load listed quiz");
            None
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match kv.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}
