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

//! The timers a study session owns.
//!
//! Each timer is a tokio task. A `Timers` value holds their abort handles,
//! one per slot, and is shared by the session controller, the analytics
//! aggregator and the retry handler. Starting a slot that is already
//! running replaces (and aborts) the old task. Dropping the last handle
//! aborts everything still running.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::task::AbortHandle;
use tokio::task::JoinHandle;

use crate::util::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// The 1 Hz elapsed-time clock shown in the learn view.
    Ui,
    /// The analytics batch flush.
    Flush,
    /// A pending retry backoff.
    Retry,
}

#[derive(Clone, Default)]
pub struct Timers {
    inner: Arc<TimerSet>,
}

#[derive(Default)]
struct TimerSet {
    running: Mutex<HashMap<TimerSlot, AbortHandle>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` in `slot`, aborting whatever ran there before.
    pub fn start<F>(&self, slot: TimerSlot, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(task);
        let previous = lock(&self.inner.running).insert(slot, handle.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
        log::debug!("Started {slot:?} timer");
        handle
    }

    pub fn stop(&self, slot: TimerSlot) {
        let handle = lock(&self.inner.running).remove(&slot);
        if let Some(handle) = handle {
            handle.abort();
            log::debug!("Stopped {slot:?} timer");
        }
    }

    pub fn stop_all(&self) {
        self.inner.abort_all();
    }

    /// Whether the slot holds a task that has not finished yet.
    pub fn is_running(&self, slot: TimerSlot) -> bool {
        lock(&self.inner.running)
            .get(&slot)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl TimerSet {
    fn abort_all(&self) {
        let handles: Vec<(TimerSlot, AbortHandle)> = lock(&self.running).drain().collect();
        for (slot, handle) in handles {
            handle.abort();
            log::debug!("Stopped {slot:?} timer");
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}
