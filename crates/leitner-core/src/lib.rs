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

//! leitner-core: the study scheduler behind leitner.
//!
//! - Leitner box transitions and mastery detection
//! - The study session state machine and its timers
//! - Batched session analytics
//! - Error classification and retry with backoff
//! - The Card Store and Analytics Store interfaces, plus an in-memory
//!   implementation of both

pub mod analytics;
pub mod config;
pub mod error;
pub mod memory;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timers;
pub mod types;
mod util;

// Re-exports for convenience
pub use analytics::{AnalyticsAggregator, LearningSession};
pub use config::SessionConfig;
pub use error::{ErrorKind, ErrorReport, Fallible, StoreError, fail};
pub use memory::MemoryStore;
pub use retry::{ErrorState, ErrorStatus, RetryOutcome, RetryableErrorHandler};
pub use session::{EvaluateOutcome, NavigationState, SessionController, Step, ViewState};
pub use store::{Analytics, AnalyticsStore, CardStore, ResetKind};
pub use timers::{TimerSlot, Timers};
pub use types::boxes::{BoxCount, BoxSummary};
pub use types::card::{Card, CardId, Folder, FolderId};
pub use types::level::Level;
