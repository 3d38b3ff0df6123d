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

//! The remote collaborators the core talks to. Implementations own the
//! authoritative card levels and analytics totals; the core only ever holds
//! cached copies.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::StoreError;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::Folder;
use crate::types::card::FolderId;
use crate::types::level::Level;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn list_folders(&self) -> StoreResult<Vec<Folder>>;

    async fn get_cards_by_folder(&self, folder: FolderId) -> StoreResult<Vec<Card>>;

    async fn update_card(
        &self,
        folder: FolderId,
        card: CardId,
        level: Level,
    ) -> StoreResult<Card>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn increment_analytics(&self, delta: AnalyticsDelta) -> StoreResult<Analytics>;

    async fn track_reset(&self, kind: ResetKind) -> StoreResult<Analytics>;

    async fn track_study_session(&self, batch: StudySessionBatch) -> StoreResult<Analytics>;

    async fn analytics(&self) -> StoreResult<Analytics>;
}

/// Increments to the running analytics totals. Absent fields are left
/// unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_learning_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cards_learned: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_correct: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_wrong: Option<u64>,
}

/// One flush worth of session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySessionBatch {
    /// Seconds.
    pub time_spent: u64,
    pub cards_studied: u64,
    pub correct_answers: u64,
    pub wrong_answers: u64,
}

impl StudySessionBatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    Folder,
    LearningSession,
}

/// Running totals as the Analytics Store reports them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_learning_time: u64,
    pub total_cards_learned: u64,
    pub total_correct: u64,
    pub total_wrong: u64,
    pub folder_resets: u64,
    pub learning_session_resets: u64,
    pub study_sessions: u64,
}

/// Runs a store call under a deadline. An elapsed deadline is reported as a
/// network failure, which makes it eligible for retry.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::network(format!(
            "request timed out after {} ms",
            timeout.as_millis()
        ))),
    }
}
