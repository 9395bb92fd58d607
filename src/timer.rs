//! Focus timer coordinator
//!
//! Owns the [`SessionState`] behind a mutex and is the only writer. It
//! drives the countdown with a single 1 s ticker task and completes a
//! running phase exactly once when it sits at 00:00. After every transition
//! that changes the persisted record it saves the record, outside the state
//! lock. Every event is broadcast to subscribers (chime, UI, logging).
//!
//! Ticker lifecycle:
//!
//! - spawned when the state becomes running, aborted when it stops
//! - never more than one alive
//! - exits on its own once a run settles and the timer stops

use crate::clock::Clock;
use crate::persistence::StateStore;
use crate::record::{PersistedSession, SessionPatch};
use crate::session::{SessionAction, SessionEvent, SessionState, TimerMode};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const TICK: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 64;

struct Shared {
    state: Mutex<SessionState>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,
    /// Cleared when a completion fires, set again once time is positive
    completion_armed: AtomicBool,
    /// Bumped under the state lock for every record that needs saving
    revision: AtomicU64,
    /// Newest revision written; older records arriving late are dropped
    saved_revision: Mutex<u64>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Apply the action chosen by `choose` under a single lock
    ///
    /// The record is snapshotted under the lock and written after it is
    /// released.
    fn dispatch<F>(&self, choose: F) -> Vec<SessionEvent>
    where
        F: FnOnce(&SessionState) -> Option<SessionAction>,
    {
        let (events, pending) = {
            let mut state = self.state();
            let Some(action) = choose(&state) else {
                return Vec::new();
            };
            let before = PersistedSession::from(&*state);
            let events = state.apply(action, self.clock.now());
            if state.time_remaining() > 0 {
                self.completion_armed.store(true, Ordering::Release);
            }
            let after = PersistedSession::from(&*state);
            let pending = (after != before).then(|| {
                let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
                (revision, after.to_json())
            });
            (events, pending)
        };

        if let Some((revision, record)) = pending {
            self.persist(revision, &record);
        }
        for event in &events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
        events
    }

    fn persist(&self, revision: u64, record: &Value) {
        let mut saved = self.saved_revision.lock().unwrap_or_else(PoisonError::into_inner);
        if revision <= *saved {
            debug!("Skipping stale save (revision {} <= {})", revision, *saved);
            return;
        }
        *saved = revision;
        if let Err(e) = self.store.save(record) {
            warn!("Failed to save state: {}", e);
        }
    }

    /// Complete the current phase if it is running at 00:00 and armed
    fn complete_if_exhausted(&self) -> Vec<SessionEvent> {
        self.dispatch(|state| {
            let due = state.is_running()
                && state.time_remaining() == 0
                && self.completion_armed.swap(false, Ordering::AcqRel);
            due.then(|| {
                debug!("Phase exhausted, completing");
                SessionAction::CompletePhase {
                    completed_focus_seconds: None,
                }
            })
        })
    }

    /// One countdown step, completing the phase once it runs out
    fn tick(&self) -> Vec<SessionEvent> {
        let mut events = self.dispatch(|_| Some(SessionAction::Tick));
        events.extend(self.complete_if_exhausted());
        events
    }
}

pub struct FocusTimer {
    shared: Arc<Shared>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl FocusTimer {
    pub fn new(state: SessionState, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let timer = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                store,
                clock,
                events,
                completion_armed: AtomicBool::new(true),
                revision: AtomicU64::new(0),
                saved_revision: Mutex::new(0),
            }),
            ticker: Mutex::new(None),
            runtime,
        };
        timer.sync_ticker();
        timer
    }

    /// Start from `defaults`, overlaid with whatever the store holds
    ///
    /// A missing or unreadable record leaves the defaults in place.
    pub fn restore(
        defaults: SessionState,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        let mut state = defaults;
        match store.load() {
            Ok(Some(record)) => {
                state.apply(
                    SessionAction::LoadState(SessionPatch::from_json(&record)),
                    clock.now(),
                );
                info!(
                    "Restored state: {} affection, {} sessions",
                    state.affection(),
                    state.sessions().len()
                );
            }
            Ok(None) => debug!("No saved state, starting fresh"),
            Err(e) => warn!("Ignoring unreadable saved state: {}", e),
        }
        Self::new(state, store, clock, runtime)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.shared.state().clone()
    }

    pub fn formatted_time(&self) -> String {
        self.shared.state().formatted_time()
    }

    pub fn progress(&self) -> f64 {
        self.shared.state().progress()
    }

    pub fn start(&self) -> Vec<SessionEvent> {
        self.run(SessionAction::Start)
    }

    pub fn pause(&self) -> Vec<SessionEvent> {
        self.run(SessionAction::Pause)
    }

    pub fn reset(&self) -> Vec<SessionEvent> {
        self.run(SessionAction::Reset)
    }

    /// One countdown step (the ticker calls this every second)
    pub fn tick(&self) -> Vec<SessionEvent> {
        let events = self.shared.tick();
        self.sync_ticker();
        events
    }

    pub fn complete_focus_phase(&self, completed_focus_seconds: Option<i64>) -> Vec<SessionEvent> {
        self.run(SessionAction::CompleteFocusPhase {
            completed_focus_seconds,
        })
    }

    pub fn complete_break_phase(&self) -> Vec<SessionEvent> {
        self.run(SessionAction::CompleteBreakPhase)
    }

    /// Complete whichever phase is current, crediting the full focus phase
    pub fn complete_phase(&self) -> Vec<SessionEvent> {
        self.run(SessionAction::CompletePhase {
            completed_focus_seconds: None,
        })
    }

    /// Skip to the end of the current phase
    ///
    /// A focus phase is credited only with the seconds actually elapsed.
    pub fn fast_forward(&self) -> Vec<SessionEvent> {
        let events = self.shared.dispatch(|state| {
            Some(match state.timer_mode() {
                TimerMode::Focus => SessionAction::CompleteFocusPhase {
                    completed_focus_seconds: Some(state.elapsed_focus_seconds() as i64),
                },
                TimerMode::Break => SessionAction::CompleteBreakPhase,
            })
        });
        self.sync_ticker();
        events
    }

    pub fn set_pomodoro_minutes(&self, minutes: u32) -> Vec<SessionEvent> {
        self.run(SessionAction::SetPomodoroMinutes(minutes))
    }

    pub fn set_break_minutes(&self, minutes: u32) -> Vec<SessionEvent> {
        self.run(SessionAction::SetBreakMinutes(minutes))
    }

    pub fn set_pomodoro_cycles(&self, cycles: u32) -> Vec<SessionEvent> {
        self.run(SessionAction::SetPomodoroCycles(cycles))
    }

    /// Overwrite state from an imported record; never fails
    pub fn load_state(&self, record: &Value) {
        self.run(SessionAction::LoadState(SessionPatch::from_json(record)));
    }

    /// The persisted projection as JSON
    pub fn export(&self) -> Value {
        PersistedSession::from(&*self.shared.state()).to_json()
    }

    /// Whether a ticker task is currently alive
    pub fn ticker_active(&self) -> bool {
        self.ticker_slot()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Apply `action`; a start on a phase already at 00:00 completes it
    fn run(&self, action: SessionAction) -> Vec<SessionEvent> {
        let mut events = self.shared.dispatch(|_| Some(action));
        events.extend(self.shared.complete_if_exhausted());
        self.sync_ticker();
        events
    }

    fn ticker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the ticker's existence match `is_running`
    fn sync_ticker(&self) {
        let running = self.shared.is_running();
        let mut slot = self.ticker_slot();
        let alive = slot.as_ref().map_or(false, |handle| !handle.is_finished());

        if running && !alive {
            let shared = self.shared.clone();
            *slot = Some(self.runtime.spawn(run_ticker(shared)));
            debug!("Ticker started");
        } else if !running {
            if let Some(handle) = slot.take() {
                handle.abort();
                debug!("Ticker stopped");
            }
        }
    }
}

impl Drop for FocusTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker_slot().take() {
            handle.abort();
        }
    }
}

async fn run_ticker(shared: Arc<Shared>) {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !shared.is_running() {
            break;
        }
        shared.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::StoreResult;
    use crate::persistence::MemoryStore;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};

    /// Records whether the session lock was held while saving
    #[derive(Default)]
    struct LockCheckingStore {
        shared: OnceLock<Weak<Shared>>,
        saves: AtomicUsize,
        saved_while_locked: AtomicBool,
    }

    impl StateStore for LockCheckingStore {
        fn load(&self) -> StoreResult<Option<Value>> {
            Ok(None)
        }

        fn save(&self, _record: &Value) -> StoreResult<()> {
            if let Some(shared) = self.shared.get().and_then(Weak::upgrade) {
                if shared.state.try_lock().is_err() {
                    self.saved_while_locked.store(true, Ordering::SeqCst);
                }
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn timer(state: SessionState) -> (FocusTimer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at_noon(2026, 6, 1).unwrap());
        let timer = FocusTimer::new(state, store.clone(), clock, Handle::current());
        (timer, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_counts_down_while_running() {
        let (timer, _) = timer(SessionState::default());
        timer.start();
        assert!(timer.ticker_active());
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(timer.snapshot().time_remaining(), 1500 - 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_ticks() {
        let (timer, _) = timer(SessionState::default());
        timer.start();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        timer.pause();
        assert!(!timer.ticker_active());
        let frozen = timer.snapshot().time_remaining();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(timer.snapshot().time_remaining(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_ticker() {
        let (timer, _) = timer(SessionState::default());
        timer.start();
        timer.start();
        timer.pause();
        timer.start();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(timer.snapshot().time_remaining(), 1500 - 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_completes_exactly_once() {
        let (timer, _) = timer(SessionState::new(1, 1, 2));
        let mut events = timer.subscribe();
        timer.start();
        tokio::time::sleep(Duration::from_millis(60_500)).await;

        let state = timer.snapshot();
        assert_eq!(state.timer_mode(), TimerMode::Break);
        assert!(state.is_running());

        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::FocusCompleted { .. }) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_settles_and_stops() {
        let (timer, store) = timer(SessionState::new(1, 1, 2));
        timer.start();
        // focus 60 s, break 60 s, focus 60 s
        tokio::time::sleep(Duration::from_millis(185_000)).await;

        let state = timer.snapshot();
        assert!(!state.is_running());
        assert_eq!(state.affection(), 1);
        assert_eq!(state.total_focus_minutes(), 2);
        assert_eq!(state.sessions_completed(), 2);
        assert!(!timer.ticker_active());

        let saved = store.record().unwrap();
        assert_eq!(saved["totalFocusMinutes"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_forward_credits_elapsed_only() {
        let (timer, _) = timer(SessionState::new(25, 5, 1));
        timer.start();
        tokio::time::sleep(Duration::from_millis(150_500)).await;
        let events = timer.fast_forward();
        assert!(events.contains(&SessionEvent::FocusCompleted {
            cycle: 1,
            credited_seconds: 150
        }));
        let state = timer.snapshot();
        assert_eq!(state.total_focus_minutes(), 2);
        assert_eq!(state.affection(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_not_saved() {
        let (timer, store) = timer(SessionState::default());
        timer.start();
        let saves = store.save_count();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(store.save_count(), saves);
        timer.set_pomodoro_cycles(2);
        assert_eq!(store.save_count(), saves + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_at_zero_completes_imported_phase() {
        let (timer, _) = timer(SessionState::new(1, 1, 2));
        timer.load_state(&serde_json::json!({ "timeRemaining": 0 }));
        assert_eq!(timer.formatted_time(), "00:00");

        let events = timer.start();
        assert!(events.contains(&SessionEvent::FocusCompleted {
            cycle: 1,
            credited_seconds: 60
        }));
        let state = timer.snapshot();
        assert_eq!(state.timer_mode(), TimerMode::Break);
        assert_eq!(state.time_remaining(), 60);
        assert!(state.is_running());

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        let state = timer.snapshot();
        assert_eq!(state.timer_mode(), TimerMode::Focus);
        assert_eq!(state.current_cycle(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_paused_ticks_completes_phase() {
        let (timer, _) = timer(SessionState::new(1, 1, 2));
        for _ in 0..75 {
            timer.tick();
        }
        let state = timer.snapshot();
        assert_eq!(state.time_remaining(), 0);
        assert_eq!(state.timer_mode(), TimerMode::Focus);
        assert!(!timer.ticker_active());

        let mut events = timer.subscribe();
        timer.start();
        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::FocusCompleted { .. }) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(timer.snapshot().timer_mode(), TimerMode::Break);
        assert!(timer.ticker_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_happen_outside_the_state_lock() {
        let store = Arc::new(LockCheckingStore::default());
        let clock = Arc::new(FixedClock::at_noon(2026, 6, 1).unwrap());
        let timer = FocusTimer::new(SessionState::new(1, 1, 1), store.clone(), clock, Handle::current());
        store.shared.set(Arc::downgrade(&timer.shared)).ok();

        timer.set_pomodoro_cycles(2);
        timer.start();
        tokio::time::sleep(Duration::from_millis(60_500)).await;

        assert!(store.saves.load(Ordering::SeqCst) >= 2);
        assert!(!store.saved_while_locked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_record_is_not_written() {
        let (timer, store) = timer(SessionState::default());
        timer.set_pomodoro_cycles(2);
        let saved = store.record();
        timer.shared.persist(1, &serde_json::json!({ "stale": true }));
        assert_eq!(store.record(), saved);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_resets_countdown() {
        let store = Arc::new(MemoryStore::with_record(serde_json::json!({
            "timerMode": "break",
            "breakMinutes": 10,
            "affection": 77,
            "isTimerRunning": true,
        })));
        let clock = Arc::new(FixedClock::at_noon(2026, 6, 1).unwrap());
        let timer = FocusTimer::restore(SessionState::default(), store, clock, Handle::current());
        let state = timer.snapshot();
        assert!(!state.is_running());
        assert_eq!(state.timer_mode(), TimerMode::Break);
        assert_eq!(state.time_remaining(), 600);
        assert_eq!(state.affection(), 77);
        assert!(!timer.ticker_active());
    }
}
