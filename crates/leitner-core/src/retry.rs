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

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use crate::config::SessionConfig;
use crate::error::ErrorKind;
use crate::error::StoreError;
use crate::timers::TimerSlot;
use crate::timers::Timers;
use crate::util::lock;

/// The error currently shown to the user.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    pub message: String,
    pub kind: ErrorKind,
    pub retryable: bool,
    pub retry_count: u32,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetryOutcome {
    /// The operation succeeded and the error was cleared.
    Succeeded,
    /// The operation failed again. The error stays, with its count bumped.
    Failed(ErrorState),
    /// The error was dismissed or superseded while the retry was pending.
    Cancelled,
    /// There is no error, or it may not be retried right now.
    NotAllowed,
}

/// The error, and what the user may do about it, read together.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorStatus {
    pub error: Option<ErrorState>,
    pub can_retry: bool,
    pub is_retrying: bool,
}

/// Tracks the current error and retries failed operations with backoff.
#[derive(Clone)]
pub struct RetryableErrorHandler {
    state: Arc<Mutex<HandlerState>>,
    timers: Timers,
    delays: Arc<[Duration]>,
    max_retries: u32,
}

#[derive(Default)]
struct HandlerState {
    error: Option<ErrorState>,
    is_retrying: bool,
    /// Bumped whenever the error is replaced or cleared, so a retry that was
    /// started for an older error cannot write its outcome over a newer one.
    generation: u64,
}

impl HandlerState {
    fn can_retry(&self) -> bool {
        match &self.error {
            Some(error) => {
                error.retryable && error.retry_count < error.max_retries && !self.is_retrying
            }
            None => false,
        }
    }
}

impl RetryableErrorHandler {
    pub fn new(config: &SessionConfig, timers: Timers) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandlerState::default())),
            timers,
            delays: config.retry_delays.clone().into(),
            max_retries: config.max_retries,
        }
    }

    /// Records a failure, replacing any previous error and cancelling its
    /// pending retry.
    pub fn report(&self, error: StoreError) -> ErrorState {
        self.timers.stop(TimerSlot::Retry);
        let state = ErrorState {
            retryable: error.kind.is_retryable(),
            kind: error.kind,
            message: error.message,
            retry_count: 0,
            max_retries: self.max_retries,
        };
        log::warn!("Operation failed ({}): {}", state.kind, state.message);
        let mut guard = lock(&self.state);
        guard.error = Some(state.clone());
        guard.is_retrying = false;
        guard.generation += 1;
        state
    }

    /// Dismisses the current error. A retry still waiting on its backoff is
    /// cancelled.
    pub fn clear_error(&self) {
        self.timers.stop(TimerSlot::Retry);
        let mut guard = lock(&self.state);
        if guard.error.take().is_some() {
            log::debug!("Error cleared");
        }
        guard.is_retrying = false;
        guard.generation += 1;
    }

    pub fn error(&self) -> Option<ErrorState> {
        lock(&self.state).error.clone()
    }

    pub fn is_retrying(&self) -> bool {
        lock(&self.state).is_retrying
    }

    pub fn can_retry(&self) -> bool {
        lock(&self.state).can_retry()
    }

    /// Reads the error and both flags under a single lock.
    pub fn status(&self) -> ErrorStatus {
        let guard = lock(&self.state);
        ErrorStatus {
            error: guard.error.clone(),
            can_retry: guard.can_retry(),
            is_retrying: guard.is_retrying,
        }
    }

    /// The backoff the next retry would wait for, if there is an error.
    pub fn next_delay(&self) -> Option<Duration> {
        lock(&self.state)
            .error
            .as_ref()
            .map(|error| self.delay_for(error.retry_count))
    }

    fn delay_for(&self, retry_count: u32) -> Duration {
        let index = (retry_count as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or_default()
    }

    /// Waits out the backoff for the current retry count on the retry
    /// timer, then runs `operation`.
    pub async fn retry<F, Fut>(&self, operation: F) -> RetryOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        if !self.can_retry() {
            return RetryOutcome::NotAllowed;
        }
        let (delay, generation) = {
            let mut guard = lock(&self.state);
            guard.is_retrying = true;
            let retry_count = guard.error.as_ref().map_or(0, |e| e.retry_count);
            (self.delay_for(retry_count), guard.generation)
        };
        log::info!("Retrying in {} ms", delay.as_millis());

        let handle = self.timers.start(TimerSlot::Retry, async move {
            sleep(delay).await;
            operation().await
        });
        let result = handle.await;

        let mut guard = lock(&self.state);
        if guard.generation != generation {
            return RetryOutcome::Cancelled;
        }
        guard.is_retrying = false;
        match result {
            Err(_) => RetryOutcome::Cancelled,
            Ok(Ok(())) => {
                log::info!("Retry succeeded");
                guard.error = None;
                guard.generation += 1;
                RetryOutcome::Succeeded
            }
            Ok(Err(err)) => match guard.error.as_mut() {
                Some(error) => {
                    error.retry_count += 1;
                    error.retryable = err.kind.is_retryable();
                    error.kind = err.kind;
                    error.message = err.message;
                    log::warn!(
                        "Retry {}/{} failed: {}",
                        error.retry_count,
                        error.max_retries,
                        error.message
                    );
                    RetryOutcome::Failed(error.clone())
                }
                None => RetryOutcome::Cancelled,
            },
        }
    }
}
