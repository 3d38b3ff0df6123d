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

//! Session analytics.
//!
//! Card evaluations only touch local counters. The counters are written to
//! the Analytics Store in batches, on the flush timer and once more when the
//! session ends. Delivery is at-least-once: a batch whose response is lost
//! (or whose flush is aborted mid-request) is sent again with the next one.
//!
//! This is a best-effort side channel. Failures are logged and never
//! surface to the learning flow.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::DateTime;
use chrono::Local;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio::time::interval_at;

use crate::config::SessionConfig;
use crate::store::AnalyticsDelta;
use crate::store::AnalyticsStore;
use crate::store::ResetKind;
use crate::store::StudySessionBatch;
use crate::store::with_timeout;
use crate::timers::TimerSlot;
use crate::timers::Timers;
use crate::util::lock;

/// A snapshot of the running session's write-behind buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LearningSession {
    pub is_active: bool,
    pub start_time: DateTime<Local>,
    pub cards_studied: u64,
    pub correct_answers: u64,
    pub wrong_answers: u64,
    /// Whole seconds not yet reported in a batch.
    pub time_spent: u64,
}

#[derive(Clone)]
pub struct AnalyticsAggregator {
    shared: Arc<Shared>,
    timers: Timers,
    flush_interval: Duration,
}

struct Shared {
    store: Arc<dyn AnalyticsStore>,
    request_timeout: Duration,
    session: Mutex<Option<Counters>>,
}

struct Counters {
    is_active: bool,
    start_time: DateTime<Local>,
    /// Time before this instant has already been reported.
    counted_from: Instant,
    cards_studied: u64,
    correct_answers: u64,
    wrong_answers: u64,
}

impl Counters {
    fn batch(&self, now: Instant) -> StudySessionBatch {
        StudySessionBatch {
            time_spent: now.saturating_duration_since(self.counted_from).as_secs(),
            cards_studied: self.cards_studied,
            correct_answers: self.correct_answers,
            wrong_answers: self.wrong_answers,
        }
    }

    /// Removes a delivered batch from the buffer. Evaluations tracked while
    /// the batch was in flight stay behind for the next one.
    fn acknowledge(&mut self, batch: &StudySessionBatch) {
        self.cards_studied = self.cards_studied.saturating_sub(batch.cards_studied);
        self.correct_answers = self.correct_answers.saturating_sub(batch.correct_answers);
        self.wrong_answers = self.wrong_answers.saturating_sub(batch.wrong_answers);
        self.counted_from += Duration::from_secs(batch.time_spent);
    }
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: &SessionConfig, timers: Timers) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                request_timeout: config.request_timeout,
                session: Mutex::new(None),
            }),
            timers,
            flush_interval: config.flush_interval,
        }
    }

    /// Opens a session and starts the flush timer. Starting while a session
    /// is already active keeps the existing counters.
    pub fn start_session(&self) {
        {
            let mut session = lock(&self.shared.session);
            if session.as_ref().is_some_and(|s| s.is_active) {
                log::debug!("Analytics session already active");
                return;
            }
            *session = Some(Counters {
                is_active: true,
                start_time: Local::now(),
                counted_from: Instant::now(),
                cards_studied: 0,
                correct_answers: 0,
                wrong_answers: 0,
            });
        }
        log::debug!("Analytics session started");

        let shared = self.shared.clone();
        let period = self.flush_interval;
        self.timers.start(TimerSlot::Flush, async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !shared.is_active() {
                    break;
                }
                shared.flush().await;
            }
        });
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn session(&self) -> Option<LearningSession> {
        let now = Instant::now();
        lock(&self.shared.session)
            .as_ref()
            .map(|counters| LearningSession {
                is_active: counters.is_active,
                start_time: counters.start_time,
                cards_studied: counters.cards_studied,
                correct_answers: counters.correct_answers,
                wrong_answers: counters.wrong_answers,
                time_spent: counters.batch(now).time_spent,
            })
    }

    /// Counts an answered card. Nothing is sent until the next flush.
    pub fn track_card_evaluation(&self, correct: bool) {
        let mut session = lock(&self.shared.session);
        match session.as_mut() {
            Some(counters) if counters.is_active => {
                counters.cards_studied += 1;
                if correct {
                    counters.correct_answers += 1;
                } else {
                    counters.wrong_answers += 1;
                }
            }
            _ => log::debug!("Ignoring card evaluation outside of a session"),
        }
    }

    /// Sends the buffered counters now. Returns whether the buffer was
    /// delivered (an empty buffer counts as delivered).
    pub async fn flush(&self) -> bool {
        self.shared.flush().await
    }

    /// Pushes an elapsed-time increment straight to the store.
    pub async fn track_time_spent(&self, seconds: u64) {
        if seconds == 0 {
            return;
        }
        let delta = AnalyticsDelta {
            total_learning_time: Some(seconds),
            ..Default::default()
        };
        let shared = &self.shared;
        let result = with_timeout(
            shared.request_timeout,
            shared.store.increment_analytics(delta),
        )
        .await;
        if let Err(e) = result {
            log::warn!("Failed to record {seconds}s of learning time: {e}");
        }
    }

    /// Resets are discrete events and skip the batch buffer.
    pub async fn track_reset(&self, kind: ResetKind) {
        let shared = &self.shared;
        let result = with_timeout(shared.request_timeout, shared.store.track_reset(kind)).await;
        match result {
            Ok(_) => log::debug!("Recorded {kind:?} reset"),
            Err(e) => log::warn!("Failed to record {kind:?} reset: {e}"),
        }
    }

    /// Stops the flush timer, sends whatever is buffered, and discards the
    /// session.
    pub async fn end_session(&self) {
        self.timers.stop(TimerSlot::Flush);
        {
            let mut session = lock(&self.shared.session);
            match session.as_mut() {
                Some(counters) => counters.is_active = false,
                None => return,
            }
        }
        if !self.shared.flush().await {
            if let Some(counters) = lock(&self.shared.session).as_ref() {
                log::warn!(
                    "Dropping undelivered analytics: {} cards, {} correct, {} wrong",
                    counters.cards_studied,
                    counters.correct_answers,
                    counters.wrong_answers
                );
            }
        }
        *lock(&self.shared.session) = None;
        log::debug!("Analytics session ended");
    }
}

impl Shared {
    fn is_active(&self) -> bool {
        lock(&self.session).as_ref().is_some_and(|s| s.is_active)
    }

    async fn flush(&self) -> bool {
        let batch = {
            let session = lock(&self.session);
            match session.as_ref() {
                Some(counters) => counters.batch(Instant::now()),
                None => return true,
            }
        };
        if batch.is_empty() {
            return true;
        }
        let result = with_timeout(self.request_timeout, self.store.track_study_session(batch)).await;
        match result {
            Ok(_) => {
                if let Some(counters) = lock(&self.session).as_mut() {
                    counters.acknowledge(&batch);
                }
                log::debug!(
                    "Flushed analytics: {}s, {} cards",
                    batch.time_spent,
                    batch.cards_studied
                );
                true
            }
            Err(e) => {
                log::warn!("Analytics flush failed, keeping counters for the next one: {e}");
                false
            }
        }
    }
}
