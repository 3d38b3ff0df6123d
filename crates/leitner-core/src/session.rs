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

//! The study session state machine.
//!
//! ```text
//! start -> select-folder -> select-box -> learn
//! ```
//!
//! `go_back` walks the same path in reverse, one step at a time, and
//! `go_back_to_folders` jumps from `learn` straight to `select-folder`.
//!
//! Card levels live in the Card Store. The controller keeps a cache of the
//! selected folder, applies evaluations to it optimistically, and replaces
//! it with a fresh copy of the folder after every write. When a card
//! operation fails the optimistic changes are thrown away and the folder is
//! fetched again.

use std::fmt::Display;
use std::fmt::Formatter;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

use serde::Serialize;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio::time::interval_at;

use crate::analytics::AnalyticsAggregator;
use crate::config::SessionConfig;
use crate::error::Fallible;
use crate::error::StoreError;
use crate::error::fail;
use crate::retry::ErrorState;
use crate::retry::RetryOutcome;
use crate::retry::RetryableErrorHandler;
use crate::scheduler;
use crate::store::AnalyticsStore;
use crate::store::CardStore;
use crate::store::ResetKind;
use crate::store::with_timeout;
use crate::timers::TimerSlot;
use crate::timers::Timers;
use crate::types::boxes::BoxCount;
use crate::types::boxes::BoxSummary;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::Folder;
use crate::types::card::FolderId;
use crate::types::level::Level;
use crate::util::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Start,
    SelectFolder,
    SelectBox,
    Learn,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Start => write!(f, "start"),
            Step::SelectFolder => write!(f, "select-folder"),
            Step::SelectBox => write!(f, "select-box"),
            Step::Learn => write!(f, "learn"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub step: Step,
    pub selected_folder: Option<Folder>,
    pub selected_level: Option<Level>,
    pub elapsed_seconds: u64,
    /// Changes on every reset. Views holding scheduler state reload when it
    /// differs from the value they last saw.
    pub reset_trigger: u64,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            step: Step::Start,
            selected_folder: None,
            selected_level: None,
            elapsed_seconds: 0,
            reset_trigger: 0,
        }
    }
}

/// Everything the host UI reads.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub step: Step,
    pub selected_folder: Option<Folder>,
    pub selected_learning_level: Option<Level>,
    pub elapsed_seconds: u64,
    pub box_counts: [BoxCount; 4],
    pub mastered_count: usize,
    pub folder_mastered: bool,
    pub reset_trigger: u64,
    pub error: Option<ErrorState>,
    pub can_retry: bool,
    pub is_retrying: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluateOutcome {
    /// The card moved to `level` and the folder was re-fetched.
    #[serde(rename_all = "camelCase")]
    Moved {
        card: CardId,
        level: Level,
        folder_mastered: bool,
    },
    /// The card is not in the cached folder. Nothing happened.
    CardNotFound,
    /// The new level could not be saved. The error is in the view state.
    Failed(ErrorState),
}

/// A remote operation that can be re-run by `retry_last_operation`.
#[derive(Clone, Debug, PartialEq)]
enum Operation {
    LoadFolders,
    RefreshBoxCounts {
        folder: FolderId,
    },
    PersistLevel {
        folder: FolderId,
        card: CardId,
        level: Level,
    },
    /// Restart: every card in the folder back to level 0.
    ResetFolder {
        folder: FolderId,
    },
    /// Mastered cards back to the last visible box.
    ReleaseMastered {
        folder: FolderId,
    },
}

impl Operation {
    fn folder(&self) -> Option<FolderId> {
        match self {
            Operation::LoadFolders => None,
            Operation::RefreshBoxCounts { folder }
            | Operation::PersistLevel { folder, .. }
            | Operation::ResetFolder { folder }
            | Operation::ReleaseMastered { folder } => Some(*folder),
        }
    }
}

/// The cached copy of the selected folder.
#[derive(Default)]
struct FolderCache {
    /// The folder as last reported by the Card Store.
    confirmed: Vec<Card>,
    /// `confirmed` plus any optimistic changes not yet re-fetched.
    cards: Vec<Card>,
    summary: BoxSummary,
}

impl FolderCache {
    fn replace(&mut self, cards: Vec<Card>) {
        self.summary = scheduler::box_summary(&cards);
        self.confirmed = cards.clone();
        self.cards = cards;
    }

    fn set_level(&mut self, card: CardId, level: Level) {
        if let Some(cached) = self.cards.iter_mut().find(|c| c.id == card) {
            cached.current_learning_level = level;
        }
        self.summary = scheduler::box_summary(&self.cards);
    }

    fn discard_optimistic(&mut self) {
        self.cards = self.confirmed.clone();
        self.summary = scheduler::box_summary(&self.cards);
    }
}

#[derive(Default)]
struct ControllerState {
    nav: NavigationState,
    folders: Vec<Folder>,
    cache: FolderCache,
    folder_mastered: bool,
    last_failed: Option<Operation>,
}

impl ControllerState {
    fn selected_folder_id(&self) -> Option<FolderId> {
        self.nav.selected_folder.as_ref().map(|f| f.id)
    }

    fn clear_folder(&mut self) {
        self.nav.selected_folder = None;
        self.cache = FolderCache::default();
        self.folder_mastered = false;
    }

    fn clear_learning(&mut self) {
        self.nav.selected_level = None;
        self.nav.elapsed_seconds = 0;
    }
}

/// Drives a study session. Cloning gives another handle to the same
/// session. When the last handle is dropped, every timer the session owns
/// is cancelled.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    cards: Arc<dyn CardStore>,
    analytics: AnalyticsAggregator,
    errors: RetryableErrorHandler,
    timers: Timers,
    config: SessionConfig,
    state: Mutex<ControllerState>,
    /// Evaluations run one at a time: each one's persist and refresh
    /// finish before the next one reads the cache. Leaving `learn` takes
    /// the same lock, so it waits for evaluations already queued.
    evaluations: tokio::sync::Mutex<()>,
}

impl SessionController {
    pub fn new(
        cards: Arc<dyn CardStore>,
        analytics: Arc<dyn AnalyticsStore>,
        config: SessionConfig,
    ) -> Self {
        let timers = Timers::new();
        let analytics = AnalyticsAggregator::new(analytics, &config, timers.clone());
        let errors = RetryableErrorHandler::new(&config, timers.clone());
        Self {
            inner: Arc::new(Inner {
                cards,
                analytics,
                errors,
                timers,
                config,
                state: Mutex::new(ControllerState::default()),
                evaluations: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        lock(&self.inner.state)
    }

    pub fn analytics(&self) -> &AnalyticsAggregator {
        &self.inner.analytics
    }

    pub fn timers(&self) -> &Timers {
        &self.inner.timers
    }

    // Read state.

    pub fn view(&self) -> ViewState {
        let errors = self.inner.errors.status();
        let state = self.state();
        ViewState {
            step: state.nav.step,
            selected_folder: state.nav.selected_folder.clone(),
            selected_learning_level: state.nav.selected_level,
            elapsed_seconds: state.nav.elapsed_seconds,
            box_counts: state.cache.summary.boxes,
            mastered_count: state.cache.summary.mastered_count,
            folder_mastered: state.folder_mastered,
            reset_trigger: state.nav.reset_trigger,
            error: errors.error,
            can_retry: errors.can_retry,
            is_retrying: errors.is_retrying,
        }
    }

    pub fn navigation(&self) -> NavigationState {
        self.state().nav.clone()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state().folders.clone()
    }

    /// The cached cards of the selected folder.
    pub fn cards(&self) -> Vec<Card> {
        self.state().cache.cards.clone()
    }

    /// The cards in the selected box.
    pub fn learning_cards(&self) -> Vec<Card> {
        let state = self.state();
        match state.nav.selected_level {
            Some(level) => scheduler::cards_in_box(&state.cache.cards, level),
            None => Vec::new(),
        }
    }

    // Navigation.

    fn expect_step(&self, expected: Step, action: &str) -> Fallible<()> {
        let step = self.state().nav.step;
        if step == expected {
            Ok(())
        } else {
            fail(format!("cannot {action} from step {step}."))
        }
    }

    pub async fn start_learning(&self) -> Fallible<()> {
        self.expect_step(Step::Start, "start learning")?;
        self.state().nav.step = Step::SelectFolder;
        log::debug!("Entered select-folder");
        self.perform(Operation::LoadFolders).await;
        Ok(())
    }

    pub async fn select_folder(&self, folder: Folder) -> Fallible<()> {
        self.expect_step(Step::SelectFolder, "select a folder")?;
        let id = folder.id;
        {
            let mut state = self.state();
            state.clear_folder();
            state.nav.selected_folder = Some(folder);
            state.nav.selected_level = None;
            state.nav.step = Step::SelectBox;
        }
        log::debug!("Selected folder {id}");
        self.perform(Operation::RefreshBoxCounts { folder: id }).await;
        Ok(())
    }

    /// Picks one of the visible boxes. The mastered tier is not a box.
    pub fn select_box(&self, level: Level) -> Fallible<()> {
        self.expect_step(Step::SelectBox, "select a box")?;
        if !level.is_visible() {
            return fail(format!("level {level} is not a selectable box."));
        }
        self.state().nav.selected_level = Some(level);
        Ok(())
    }

    pub fn start_box_learning(&self) -> Fallible<()> {
        self.expect_step(Step::SelectBox, "start learning a box")?;
        {
            let mut state = self.state();
            if state.nav.selected_level.is_none() {
                return fail("no box selected.");
            }
            state.nav.step = Step::Learn;
            state.nav.elapsed_seconds = 0;
        }
        self.start_ui_timer();
        self.inner.analytics.start_session();
        log::debug!("Entered learn");
        Ok(())
    }

    /// One step back. At `start` this does nothing.
    pub async fn go_back(&self) -> Fallible<()> {
        let step = self.state().nav.step;
        match step {
            Step::Start => {}
            Step::SelectFolder => {
                self.state().nav.step = Step::Start;
            }
            Step::SelectBox => {
                let mut state = self.state();
                state.clear_folder();
                state.nav.selected_level = None;
                state.nav.step = Step::SelectFolder;
            }
            Step::Learn => {
                self.leave_learn(Step::SelectBox).await;
            }
        }
        log::debug!("Went back from {step}");
        Ok(())
    }

    /// From `learn` straight back to the folder list.
    pub async fn go_back_to_folders(&self) -> Fallible<()> {
        self.expect_step(Step::Learn, "go back to folders")?;
        if self.leave_learn(Step::SelectFolder).await {
            self.state().clear_folder();
        }
        Ok(())
    }

    /// Restarts learning. With a folder selected, every card in it goes
    /// back to level 0 and the session returns to `select-box`; otherwise
    /// it returns to `start`. Exactly one reset event is recorded.
    pub async fn reset_learning(&self) {
        let _serial = self.inner.evaluations.lock().await;
        self.inner.timers.stop(TimerSlot::Ui);
        let (was_learning, folder) = {
            let state = self.state();
            (state.nav.step == Step::Learn, state.selected_folder_id())
        };
        if was_learning {
            self.inner.analytics.end_session().await;
        }
        match folder {
            Some(folder) => {
                self.perform(Operation::ResetFolder { folder }).await;
                self.inner.analytics.track_reset(ResetKind::Folder).await;
            }
            None => {
                self.inner
                    .analytics
                    .track_reset(ResetKind::LearningSession)
                    .await;
            }
        }
        let mut state = self.state();
        state.clear_learning();
        state.folder_mastered = scheduler::is_mastered(&state.cache.cards);
        state.nav.reset_trigger += 1;
        state.nav.step = if state.nav.selected_folder.is_some() {
            Step::SelectBox
        } else {
            Step::Start
        };
        log::info!(
            "Learning reset (trigger {}), now at {}",
            state.nav.reset_trigger,
            state.nav.step
        );
    }

    /// Ends `learn` once the evaluations queued before it have finished,
    /// and moves to `next`. Returns false if learning had already ended.
    async fn leave_learn(&self, next: Step) -> bool {
        let _serial = self.inner.evaluations.lock().await;
        if self.state().nav.step != Step::Learn {
            return false;
        }
        self.inner.timers.stop(TimerSlot::Ui);
        let (mastered, folder) = {
            let state = self.state();
            (state.folder_mastered, state.selected_folder_id())
        };
        if let (true, Some(folder)) = (mastered, folder) {
            log::info!("Folder {folder} mastered, releasing mastered cards");
            self.perform(Operation::ReleaseMastered { folder }).await;
        }
        self.inner.analytics.end_session().await;
        let mut state = self.state();
        state.clear_learning();
        state.nav.step = next;
        true
    }

    fn start_ui_timer(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.tick_interval;
        let every = u64::from(self.inner.config.analytics_update_interval);
        let report_seconds = (period * self.inner.config.analytics_update_interval).as_secs();
        self.inner.timers.start(TimerSlot::Ui, async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let elapsed = {
                    let mut state = lock(&inner.state);
                    state.nav.elapsed_seconds += 1;
                    state.nav.elapsed_seconds
                };
                if elapsed % every == 0 {
                    // Telemetry runs beside the clock so a slow store never
                    // delays a tick.
                    let analytics = inner.analytics.clone();
                    tokio::spawn(async move {
                        analytics.track_time_spent(report_seconds).await;
                    });
                }
            }
        });
    }

    // Cards.

    /// Answers a card in the learn view: moves it one box up or down,
    /// saves the new level, and re-fetches the folder.
    pub async fn evaluate_card(&self, card: CardId, correct: bool) -> Fallible<EvaluateOutcome> {
        self.expect_step(Step::Learn, "evaluate a card")?;
        let _serial = self.inner.evaluations.lock().await;
        // Learning may have ended while this evaluation was queued.
        self.expect_step(Step::Learn, "evaluate a card")?;
        let (folder, level) = {
            let mut state = self.state();
            let Some(folder) = state.selected_folder_id() else {
                return fail("no folder selected.");
            };
            let Some(cached) = state.cache.cards.iter().find(|c| c.id == card) else {
                log::warn!("Card {card} is not in folder {folder}");
                return Ok(EvaluateOutcome::CardNotFound);
            };
            let level = scheduler::evaluate(cached, correct);
            state.cache.set_level(card, level);
            (folder, level)
        };
        self.inner.analytics.track_card_evaluation(correct);
        log::debug!("Card {card} -> level {level}");

        if self
            .perform(Operation::PersistLevel {
                folder,
                card,
                level,
            })
            .await
        {
            let folder_mastered = self.state().folder_mastered;
            if folder_mastered {
                log::info!("Folder {folder} mastered");
            }
            Ok(EvaluateOutcome::Moved {
                card,
                level,
                folder_mastered,
            })
        } else {
            match self.inner.errors.error() {
                Some(error) => Ok(EvaluateOutcome::Failed(error)),
                None => fail("card update failed."),
            }
        }
    }

    /// Re-fetches the selected folder and recomputes the box counts.
    pub async fn refresh_box_counts(&self) {
        let folder = self.state().selected_folder_id();
        if let Some(folder) = folder {
            self.perform(Operation::RefreshBoxCounts { folder }).await;
        }
    }

    /// Throws away optimistic changes and re-fetches the selected folder.
    pub async fn invalidate_cache(&self) {
        self.state().cache.discard_optimistic();
        self.refresh_box_counts().await;
    }

    // Errors.

    pub async fn retry_last_operation(&self) -> RetryOutcome {
        let operation = self.state().last_failed.clone();
        let Some(operation) = operation else {
            return RetryOutcome::NotAllowed;
        };
        let controller = self.clone();
        let outcome = self
            .inner
            .errors
            .retry(move || async move { controller.execute(&operation).await })
            .await;
        if outcome == RetryOutcome::Succeeded {
            self.state().last_failed = None;
        }
        outcome
    }

    pub fn dismiss_error(&self) {
        self.inner.errors.clear_error();
        self.state().last_failed = None;
    }

    /// Tears the session down: cancels every timer and sends the final
    /// analytics batch.
    pub async fn shutdown(&self) {
        self.inner.timers.stop_all();
        self.inner.analytics.end_session().await;
        self.inner.errors.clear_error();
        log::debug!("Session shut down");
    }

    // Remote operations.

    /// Runs an operation, recording it as the retry target if it fails.
    async fn perform(&self, operation: Operation) -> bool {
        match self.execute(&operation).await {
            Ok(()) => {
                self.inner.errors.clear_error();
                self.state().last_failed = None;
                true
            }
            Err(error) => {
                self.inner.errors.report(error);
                self.state().last_failed = Some(operation);
                false
            }
        }
    }

    async fn execute(&self, operation: &Operation) -> Result<(), StoreError> {
        let result = match operation {
            Operation::LoadFolders => self.load_folders().await,
            Operation::RefreshBoxCounts { folder } => self.fetch_folder(*folder).await,
            Operation::PersistLevel {
                folder,
                card,
                level,
            } => {
                self.timed(self.inner.cards.update_card(*folder, *card, *level))
                    .await?;
                self.fetch_folder(*folder).await
            }
            Operation::ResetFolder { folder } => {
                self.rewrite_folder(*folder, scheduler::reset_all_to_zero)
                    .await
            }
            Operation::ReleaseMastered { folder } => {
                self.rewrite_folder(*folder, scheduler::reset_mastered_to_last_visible)
                    .await
            }
        };
        if let (Err(error), Some(folder)) = (&result, operation.folder()) {
            log::debug!("Reconciling folder {folder} after failure: {error}");
            self.state().cache.discard_optimistic();
            if let Err(e) = self.fetch_folder(folder).await {
                log::debug!("Re-fetch of folder {folder} failed too: {e}");
            }
        }
        result
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        with_timeout(self.inner.config.request_timeout, call).await
    }

    async fn load_folders(&self) -> Result<(), StoreError> {
        let folders = self.timed(self.inner.cards.list_folders()).await?;
        self.state().folders = folders;
        Ok(())
    }

    /// Replaces the cache with the folder's current cards, unless the user
    /// has moved on to another folder in the meantime.
    async fn fetch_folder(&self, folder: FolderId) -> Result<(), StoreError> {
        let cards = self
            .timed(self.inner.cards.get_cards_by_folder(folder))
            .await?;
        let mut state = self.state();
        if state.selected_folder_id() == Some(folder) {
            state.folder_mastered = scheduler::is_mastered(&cards);
            state.cache.replace(cards);
        }
        Ok(())
    }

    /// Applies a scheduler rewrite to a fresh snapshot of the folder and
    /// saves every card whose level changed.
    async fn rewrite_folder(
        &self,
        folder: FolderId,
        rewrite: fn(&[Card]) -> Vec<Card>,
    ) -> Result<(), StoreError> {
        let current = self
            .timed(self.inner.cards.get_cards_by_folder(folder))
            .await?;
        let rewritten = rewrite(&current);
        for (before, after) in current.iter().zip(rewritten.iter()) {
            if before.level() != after.level() {
                self.timed(self.inner.cards.update_card(folder, after.id, after.level()))
                    .await?;
            }
        }
        self.fetch_folder(folder).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::Call;
    use crate::memory::MemoryStore;
    use crate::scheduler::tests::card;

    fn spanish() -> Folder {
        Folder {
            id: FolderId(1),
            name: "Spanish".to_string(),
        }
    }

    fn setup(levels: &[u8]) -> (MemoryStore, SessionController) {
        let store = MemoryStore::new();
        let cards = levels
            .iter()
            .enumerate()
            .map(|(i, level)| card(i as u64 + 1, *level))
            .collect();
        store.add_folder(spanish(), cards);
        let controller = SessionController::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            SessionConfig::default(),
        );
        (store, controller)
    }

    async fn enter_learn(controller: &SessionController, level: u8) -> Fallible<()> {
        controller.start_learning().await?;
        controller.select_folder(spanish()).await?;
        controller.select_box(Level::try_from(level)?)?;
        controller.start_box_learning()
    }

    fn levels(store: &MemoryStore) -> Vec<u8> {
        store
            .cards(FolderId(1))
            .iter()
            .map(|c| c.level().value())
            .collect()
    }

    fn box_counts(view: &ViewState) -> Vec<(u8, usize)> {
        view.box_counts
            .iter()
            .map(|b| (b.level.value(), b.count))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_forward_and_back() -> Fallible<()> {
        let (_store, controller) = setup(&[0, 1]);
        assert_eq!(controller.view().step, Step::Start);
        controller.start_learning().await?;
        assert_eq!(controller.view().step, Step::SelectFolder);
        assert_eq!(controller.folders(), vec![spanish()]);
        controller.select_folder(spanish()).await?;
        assert_eq!(controller.view().step, Step::SelectBox);
        controller.select_box(Level::ZERO)?;
        controller.start_box_learning()?;
        assert_eq!(controller.view().step, Step::Learn);
        assert!(controller.timers().is_running(TimerSlot::Ui));
        assert!(controller.timers().is_running(TimerSlot::Flush));

        controller.go_back().await?;
        let view = controller.view();
        assert_eq!(view.step, Step::SelectBox);
        assert_eq!(view.selected_learning_level, None);
        assert!(!controller.timers().is_running(TimerSlot::Ui));
        assert!(!controller.timers().is_running(TimerSlot::Flush));

        controller.go_back().await?;
        assert_eq!(controller.view().step, Step::SelectFolder);
        assert_eq!(controller.view().selected_folder, None);
        controller.go_back().await?;
        assert_eq!(controller.view().step, Step::Start);
        controller.go_back().await?;
        assert_eq!(controller.view().step, Step::Start);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_cannot_be_skipped() -> Fallible<()> {
        let (_store, controller) = setup(&[0]);
        assert!(controller.select_folder(spanish()).await.is_err());
        assert!(controller.start_box_learning().is_err());
        controller.start_learning().await?;
        assert!(controller.start_learning().await.is_err());
        assert!(controller.go_back_to_folders().await.is_err());
        controller.select_folder(spanish()).await?;
        assert!(controller.start_box_learning().is_err());
        assert!(controller.select_box(Level::MASTERED).is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_go_back_to_folders_skips_box_selection() -> Fallible<()> {
        let (_store, controller) = setup(&[0]);
        enter_learn(&controller, 0).await?;
        controller.go_back_to_folders().await?;
        let view = controller.view();
        assert_eq!(view.step, Step::SelectFolder);
        assert_eq!(view.selected_folder, None);
        assert!(!controller.timers().is_running(TimerSlot::Ui));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_timer() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        enter_learn(&controller, 0).await?;
        sleep(Duration::from_millis(3500)).await;
        assert_eq!(controller.view().elapsed_seconds, 3);

        sleep(Duration::from_secs(27)).await;
        assert_eq!(controller.view().elapsed_seconds, 30);
        assert_eq!(store.totals().total_learning_time, 30);

        controller.go_back().await?;
        assert_eq!(controller.view().elapsed_seconds, 0);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(controller.view().elapsed_seconds, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_scenario() -> Fallible<()> {
        let (store, controller) = setup(&[0, 1, 2]);
        enter_learn(&controller, 2).await?;
        assert_eq!(controller.learning_cards().len(), 1);
        let outcome = controller.evaluate_card(CardId(3), true).await?;
        assert_eq!(
            outcome,
            EvaluateOutcome::Moved {
                card: CardId(3),
                level: Level::LAST_VISIBLE,
                folder_mastered: false,
            }
        );
        assert_eq!(levels(&store), vec![0, 1, 3]);
        let view = controller.view();
        assert_eq!(box_counts(&view), vec![(0, 1), (1, 1), (2, 0), (3, 1)]);
        assert_eq!(view.mastered_count, 0);
        assert!(controller.learning_cards().is_empty());
        assert_eq!(controller.analytics().session().unwrap().correct_answers, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_card_is_a_no_op() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        enter_learn(&controller, 0).await?;
        let outcome = controller.evaluate_card(CardId(42), true).await?;
        assert_eq!(outcome, EvaluateOutcome::CardNotFound);
        assert_eq!(store.call_count(Call::UpdateCard), 0);
        assert_eq!(controller.analytics().session().unwrap().cards_studied, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_mastery_is_released_on_leaving() -> Fallible<()> {
        let (store, controller) = setup(&[3, 4]);
        enter_learn(&controller, 3).await?;
        let outcome = controller.evaluate_card(CardId(1), true).await?;
        assert!(matches!(
            outcome,
            EvaluateOutcome::Moved {
                folder_mastered: true,
                ..
            }
        ));
        assert!(controller.view().folder_mastered);
        assert_eq!(controller.view().mastered_count, 2);

        controller.go_back().await?;
        assert_eq!(levels(&store), vec![3, 3]);
        let view = controller.view();
        assert!(!view.folder_mastered);
        assert_eq!(view.mastered_count, 0);
        assert_eq!(box_counts(&view)[3], (3, 2));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_evaluations_are_serialized() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        enter_learn(&controller, 0).await?;
        store.set_latency(Some(Duration::from_millis(100)));
        let (first, second) = tokio::join!(
            controller.evaluate_card(CardId(1), true),
            controller.evaluate_card(CardId(1), true),
        );
        assert!(matches!(first?, EvaluateOutcome::Moved { .. }));
        assert!(matches!(second?, EvaluateOutcome::Moved { .. }));
        assert_eq!(levels(&store), vec![2]);
        assert_eq!(controller.cards()[0].level().value(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_waits_for_queued_evaluations() -> Fallible<()> {
        let (store, controller) = setup(&[0, 0]);
        enter_learn(&controller, 0).await?;
        store.set_latency(Some(Duration::from_millis(100)));
        let (first, second, ()) = tokio::join!(
            controller.evaluate_card(CardId(1), true),
            controller.evaluate_card(CardId(2), true),
            async {
                sleep(Duration::from_millis(10)).await;
                controller.reset_learning().await;
            },
        );
        assert!(matches!(first?, EvaluateOutcome::Moved { .. }));
        assert!(matches!(second?, EvaluateOutcome::Moved { .. }));

        // Both answers landed before the reset, which then zeroed the folder.
        assert_eq!(controller.view().step, Step::SelectBox);
        assert_eq!(levels(&store), vec![0, 0]);
        assert_eq!(store.batches().len(), 1);
        assert_eq!(store.batches()[0].cards_studied, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluation_queued_behind_go_back_is_rejected() -> Fallible<()> {
        let (store, controller) = setup(&[0, 0]);
        enter_learn(&controller, 0).await?;
        store.set_latency(Some(Duration::from_millis(100)));
        let (first, back, late) = tokio::join!(
            controller.evaluate_card(CardId(1), true),
            async {
                sleep(Duration::from_millis(10)).await;
                controller.go_back().await
            },
            async {
                sleep(Duration::from_millis(20)).await;
                controller.evaluate_card(CardId(2), true).await
            },
        );
        assert!(matches!(first?, EvaluateOutcome::Moved { .. }));
        back?;
        let err = late.err().unwrap();
        assert_eq!(
            err.to_string(),
            "error: cannot evaluate a card from step select-box."
        );
        assert_eq!(controller.view().step, Step::SelectBox);
        assert_eq!(levels(&store), vec![1, 0]);
        assert_eq!(store.batches()[0].cards_studied, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_persist_reconciles_and_retries() -> Fallible<()> {
        let (store, controller) = setup(&[0, 1]);
        enter_learn(&controller, 0).await?;
        store.fail_next(Call::UpdateCard, StoreError::network("network down"));
        let outcome = controller.evaluate_card(CardId(1), true).await?;
        let EvaluateOutcome::Failed(error) = outcome else {
            panic!("expected a failure, got {outcome:?}");
        };
        assert_eq!(error.kind, ErrorKind::Network);
        assert_eq!(error.retry_count, 0);

        // The optimistic move was discarded in favour of the store's copy.
        assert_eq!(controller.cards()[0].level(), Level::ZERO);
        let view = controller.view();
        assert!(view.can_retry);
        assert_eq!(box_counts(&view)[0], (0, 1));

        assert_eq!(
            controller.retry_last_operation().await,
            RetryOutcome::Succeeded
        );
        assert_eq!(levels(&store), vec![1, 1]);
        let view = controller.view();
        assert_eq!(view.error, None);
        assert_eq!(box_counts(&view)[1], (1, 2));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_is_not_retryable() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        controller.start_learning().await?;
        store.fail_next(Call::GetCards, StoreError::validation("invalid folder"));
        controller.select_folder(spanish()).await?;
        let view = controller.view();
        assert_eq!(view.step, Step::SelectBox);
        assert_eq!(view.error.unwrap().kind, ErrorKind::Validation);
        assert!(!view.can_retry);
        assert_eq!(
            controller.retry_last_operation().await,
            RetryOutcome::NotAllowed
        );
        controller.dismiss_error();
        assert_eq!(controller.view().error, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_card_store_times_out_as_network() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        controller.start_learning().await?;
        store.set_latency(Some(Duration::from_secs(11)));
        controller.select_folder(spanish()).await?;
        let view = controller.view();
        assert_eq!(view.error.unwrap().kind, ErrorKind::Network);
        assert!(view.can_retry);

        store.set_latency(None);
        assert_eq!(
            controller.retry_last_operation().await,
            RetryOutcome::Succeeded
        );
        assert_eq!(box_counts(&controller.view())[0], (0, 1));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_with_folder_returns_to_box_selection() -> Fallible<()> {
        let (store, controller) = setup(&[2, 4, 1]);
        enter_learn(&controller, 2).await?;
        controller.evaluate_card(CardId(1), false).await?;
        sleep(Duration::from_secs(3)).await;
        let before = controller.view().reset_trigger;

        controller.reset_learning().await;
        let view = controller.view();
        assert_eq!(view.step, Step::SelectBox);
        assert_eq!(view.selected_folder, Some(spanish()));
        assert_eq!(view.selected_learning_level, None);
        assert_eq!(view.elapsed_seconds, 0);
        assert_eq!(view.reset_trigger, before + 1);
        assert_eq!(box_counts(&view)[0], (0, 3));
        assert_eq!(levels(&store), vec![0, 0, 0]);
        assert!(!controller.timers().is_running(TimerSlot::Ui));

        // The session's answers were flushed when learning stopped.
        assert_eq!(store.batches().len(), 1);
        assert_eq!(store.batches()[0].wrong_answers, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_records_exactly_one_event() -> Fallible<()> {
        let (store, controller) = setup(&[1]);
        controller.reset_learning().await;
        assert_eq!(controller.view().step, Step::Start);
        assert_eq!(store.resets(), vec![ResetKind::LearningSession]);

        enter_learn(&controller, 1).await?;
        controller.reset_learning().await;
        assert_eq!(
            store.resets(),
            vec![ResetKind::LearningSession, ResetKind::Folder]
        );
        let totals = store.totals();
        assert_eq!(totals.folder_resets + totals.learning_session_resets, 2);
        assert_eq!(controller.view().reset_trigger, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_trigger_is_monotonic() -> Fallible<()> {
        let (_store, controller) = setup(&[0]);
        let mut last = controller.view().reset_trigger;
        for _ in 0..3 {
            controller.reset_learning().await;
            let now = controller.view().reset_trigger;
            assert!(now > last);
            last = now;
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_pending_retry() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        controller.start_learning().await?;
        store.fail_next(Call::GetCards, StoreError::network("offline"));
        controller.select_folder(spanish()).await?;
        let retry = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.retry_last_operation().await })
        };
        sleep(Duration::from_millis(200)).await;
        assert!(controller.view().is_retrying);
        controller.dismiss_error();
        assert_eq!(retry.await.unwrap(), RetryOutcome::Cancelled);
        // The failed fetch and its reconciliation fetch; the retry never ran.
        assert_eq!(store.call_count(Call::GetCards), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_all_timers() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        enter_learn(&controller, 0).await?;
        controller.evaluate_card(CardId(1), true).await?;
        controller.shutdown().await;
        for slot in [TimerSlot::Ui, TimerSlot::Flush, TimerSlot::Retry] {
            assert!(!controller.timers().is_running(slot));
        }
        assert_eq!(store.batches().len(), 1);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(controller.view().elapsed_seconds, 0);
        assert_eq!(store.batches().len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_analytics_failure_does_not_surface() -> Fallible<()> {
        let (store, controller) = setup(&[0]);
        enter_learn(&controller, 0).await?;
        controller.evaluate_card(CardId(1), true).await?;
        store.fail_next(Call::TrackStudySession, StoreError::network("offline"));
        controller.go_back().await?;
        let view = controller.view();
        assert_eq!(view.error, None);
        assert_eq!(view.step, Step::SelectBox);
        Ok(())
    }
}
