// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An in-memory Card Store and Analytics Store.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::Analytics;
use crate::store::AnalyticsDelta;
use crate::store::AnalyticsStore;
use crate::store::CardStore;
use crate::store::ResetKind;
use crate::store::StoreResult;
use crate::store::StudySessionBatch;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::Folder;
use crate::types::card::FolderId;
use crate::types::level::Level;
use crate::util::lock;

/// Which store call a scripted failure applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    ListFolders,
    GetCards,
    UpdateCard,
    IncrementAnalytics,
    TrackReset,
    TrackStudySession,
}

/// Holds folders, cards and analytics totals in memory. Failures and
/// latency can be scripted per call, which is how the tests exercise the
/// retry and reconciliation paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    folders: BTreeMap<FolderId, Folder>,
    cards: BTreeMap<FolderId, Vec<Card>>,
    analytics: Analytics,
    /// Every batch accepted by `track_study_session`, in order.
    batches: Vec<StudySessionBatch>,
    /// Every reset event accepted by `track_reset`, in order.
    resets: Vec<ResetKind>,
    failures: VecDeque<(Call, StoreError)>,
    latency: Option<Duration>,
    calls: Vec<Call>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, folder: Folder, cards: Vec<Card>) {
        let mut inner = lock(&self.inner);
        let cards = cards
            .into_iter()
            .map(|card| Card {
                folder_id: folder.id,
                ..card
            })
            .collect();
        inner.cards.insert(folder.id, cards);
        inner.folders.insert(folder.id, folder);
    }

    /// Makes the next call of the given kind fail with `error`. Scripted
    /// failures are consumed in order.
    pub fn fail_next(&self, call: Call, error: StoreError) {
        lock(&self.inner).failures.push_back((call, error));
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.inner).latency = latency;
    }

    pub fn cards(&self, folder: FolderId) -> Vec<Card> {
        lock(&self.inner)
            .cards
            .get(&folder)
            .cloned()
            .unwrap_or_default()
    }

    pub fn batches(&self) -> Vec<StudySessionBatch> {
        lock(&self.inner).batches.clone()
    }

    pub fn resets(&self) -> Vec<ResetKind> {
        lock(&self.inner).resets.clone()
    }

    pub fn totals(&self) -> Analytics {
        lock(&self.inner).analytics
    }

    /// Number of calls of the given kind made so far, failed ones included.
    pub fn call_count(&self, call: Call) -> usize {
        lock(&self.inner).calls.iter().filter(|c| **c == call).count()
    }

    async fn begin(&self, call: Call) -> StoreResult<()> {
        let latency = {
            let mut inner = lock(&self.inner);
            inner.calls.push(call);
            inner.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = lock(&self.inner);
        let scripted = inner.failures.iter().position(|(c, _)| *c == call);
        match scripted.and_then(|index| inner.failures.remove(index)) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn list_folders(&self) -> StoreResult<Vec<Folder>> {
        self.begin(Call::ListFolders).await?;
        Ok(lock(&self.inner).folders.values().cloned().collect())
    }

    async fn get_cards_by_folder(&self, folder: FolderId) -> StoreResult<Vec<Card>> {
        self.begin(Call::GetCards).await?;
        match lock(&self.inner).cards.get(&folder) {
            Some(cards) => Ok(cards.clone()),
            None => Err(StoreError::validation(format!("folder {folder} not found"))),
        }
    }

    async fn update_card(
        &self,
        folder: FolderId,
        card: CardId,
        level: Level,
    ) -> StoreResult<Card> {
        self.begin(Call::UpdateCard).await?;
        let mut inner = lock(&self.inner);
        let cards = inner
            .cards
            .get_mut(&folder)
            .ok_or_else(|| StoreError::validation(format!("folder {folder} not found")))?;
        let stored = cards
            .iter_mut()
            .find(|c| c.id == card)
            .ok_or_else(|| StoreError::validation(format!("card {card} not found")))?;
        stored.current_learning_level = level;
        Ok(stored.clone())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn increment_analytics(&self, delta: AnalyticsDelta) -> StoreResult<Analytics> {
        self.begin(Call::IncrementAnalytics).await?;
        let mut inner = lock(&self.inner);
        let totals = &mut inner.analytics;
        totals.total_learning_time += delta.total_learning_time.unwrap_or(0);
        totals.total_cards_learned += delta.total_cards_learned.unwrap_or(0);
        totals.total_correct += delta.total_correct.unwrap_or(0);
        totals.total_wrong += delta.total_wrong.unwrap_or(0);
        Ok(inner.analytics)
    }

    async fn track_reset(&self, kind: ResetKind) -> StoreResult<Analytics> {
        self.begin(Call::TrackReset).await?;
        let mut inner = lock(&self.inner);
        match kind {
            ResetKind::Folder => inner.analytics.folder_resets += 1,
            ResetKind::LearningSession => inner.analytics.learning_session_resets += 1,
        }
        inner.resets.push(kind);
        Ok(inner.analytics)
    }

    /// Session time is recorded on the batch only; learning time totals
    /// come from `increment_analytics`.
    async fn track_study_session(&self, batch: StudySessionBatch) -> StoreResult<Analytics> {
        self.begin(Call::TrackStudySession).await?;
        let mut inner = lock(&self.inner);
        let totals = &mut inner.analytics;
        totals.total_cards_learned += batch.cards_studied;
        totals.total_correct += batch.correct_answers;
        totals.total_wrong += batch.wrong_answers;
        totals.study_sessions += 1;
        inner.batches.push(batch);
        Ok(inner.analytics)
    }

    async fn analytics(&self) -> StoreResult<Analytics> {
        Ok(lock(&self.inner).analytics)
    }
}
