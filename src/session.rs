//! Pomodoro session state machine
//!
//! All session state lives in [`SessionState`] and changes only through
//! [`SessionState::apply`], one [`SessionAction`] at a time. Each action maps
//! to exactly one handler; the handler returns the [`SessionEvent`]s the
//! caller should react to (chime, celebration, persistence).
//!
//! ```text
//!            complete_focus (cycle < cycles)
//!   Focus(c) ------------------------------> Break(c)
//!      ^                                        |
//!      |        complete_break                  |
//!      +------------ Focus(c + 1) <-------------+
//!
//!   Focus(cycles) --complete_focus--> settle run --> Focus(1), stopped
//! ```
//!
//! Rewards are deferred: focus time accumulates across the cycles of a run
//! and is only settled (affection, streak, heatmap, session record) when the
//! final focus phase completes.
//!
//! `tick` never completes a phase by itself. When it brings `time_remaining`
//! to zero it returns [`SessionEvent::PhaseExhausted`] and the coordinator
//! decides whether to complete.

use crate::config::TimerConfig;
use crate::record::SessionPatch;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Settled minutes are converted to affection at this rate (floored)
const AFFECTION_NUMERATOR: u64 = 4;
const AFFECTION_DENOMINATOR: u64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    #[default]
    Focus,
    Break,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Focus => "focus",
            TimerMode::Break => "break",
        }
    }
}

/// Activity for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub minutes: u64,
    pub sessions: u64,
}

/// One settled run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    /// Minutes
    pub duration: u64,
    pub completed: bool,
}

/// Affection earned for `minutes` of settled focus
pub fn affection_for(minutes: u64) -> u64 {
    if minutes == 0 {
        0
    } else {
        let earned = u128::from(minutes) * u128::from(AFFECTION_NUMERATOR) / u128::from(AFFECTION_DENOMINATOR);
        (earned as u64).max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Start,
    Pause,
    /// Stop and restart the run from cycle 1 without settling
    Reset,
    Tick,
    /// Credit `completed_focus_seconds` (clamped, default the full phase)
    CompleteFocusPhase { completed_focus_seconds: Option<i64> },
    CompleteBreakPhase,
    /// Complete whichever phase is current
    CompletePhase { completed_focus_seconds: Option<i64> },
    SetPomodoroMinutes(u32),
    SetBreakMinutes(u32),
    SetPomodoroCycles(u32),
    LoadState(SessionPatch),
}

/// What a finished run paid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub minutes: u64,
    pub pomodoros: u64,
    pub affection_gain: u64,
    pub streak: u32,
    pub completion_mark: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A tick brought the current phase to zero
    PhaseExhausted { mode: TimerMode },
    FocusCompleted { cycle: u32, credited_seconds: u64 },
    /// A break ended; `cycle` is the focus cycle now starting
    BreakCompleted { cycle: u32 },
    RunSettled(Settlement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub(crate) timer_mode: TimerMode,
    pub(crate) pomodoro_minutes: u32,
    pub(crate) break_minutes: u32,
    pub(crate) pomodoro_cycles: u32,
    pub(crate) current_cycle: u32,
    pub(crate) time_remaining: u32,
    pub(crate) is_running: bool,
    pub(crate) cycle_accumulated_focus_seconds: u64,
    pub(crate) cycle_accumulated_pomodoros: u64,
    pub(crate) affection: u64,
    pub(crate) total_focus_minutes: u64,
    pub(crate) sessions_completed: u64,
    pub(crate) current_streak: u32,
    pub(crate) longest_streak: u32,
    pub(crate) last_session_date: Option<NaiveDate>,
    pub(crate) last_cycle_completion_mark: i64,
    pub(crate) heatmap_data: Vec<HeatmapDay>,
    pub(crate) sessions: Vec<FocusSession>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(25, 5, 4)
    }
}

impl SessionState {
    /// Fresh state: focus mode, cycle 1, stopped, full focus phase remaining
    pub fn new(pomodoro_minutes: u32, break_minutes: u32, pomodoro_cycles: u32) -> Self {
        Self {
            timer_mode: TimerMode::Focus,
            pomodoro_minutes,
            break_minutes,
            pomodoro_cycles,
            current_cycle: 1,
            time_remaining: pomodoro_minutes.saturating_mul(60),
            is_running: false,
            cycle_accumulated_focus_seconds: 0,
            cycle_accumulated_pomodoros: 0,
            affection: 0,
            total_focus_minutes: 0,
            sessions_completed: 0,
            current_streak: 0,
            longest_streak: 0,
            last_session_date: None,
            last_cycle_completion_mark: 0,
            heatmap_data: Vec::new(),
            sessions: Vec::new(),
        }
    }

    pub fn from_config(config: &TimerConfig) -> Self {
        Self::new(config.pomodoro_minutes, config.break_minutes, config.cycles)
    }

    pub fn timer_mode(&self) -> TimerMode {
        self.timer_mode
    }

    pub fn pomodoro_minutes(&self) -> u32 {
        self.pomodoro_minutes
    }

    pub fn break_minutes(&self) -> u32 {
        self.break_minutes
    }

    pub fn pomodoro_cycles(&self) -> u32 {
        self.pomodoro_cycles
    }

    pub fn current_cycle(&self) -> u32 {
        self.current_cycle
    }

    /// Seconds left in the current phase
    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn cycle_accumulated_focus_seconds(&self) -> u64 {
        self.cycle_accumulated_focus_seconds
    }

    pub fn cycle_accumulated_pomodoros(&self) -> u64 {
        self.cycle_accumulated_pomodoros
    }

    pub fn affection(&self) -> u64 {
        self.affection
    }

    pub fn total_focus_minutes(&self) -> u64 {
        self.total_focus_minutes
    }

    pub fn sessions_completed(&self) -> u64 {
        self.sessions_completed
    }

    pub fn current_streak(&self) -> u32 {
        self.current_streak
    }

    pub fn longest_streak(&self) -> u32 {
        self.longest_streak
    }

    pub fn last_session_date(&self) -> Option<NaiveDate> {
        self.last_session_date
    }

    /// Millisecond stamp of the last settled run (0 if none)
    pub fn last_cycle_completion_mark(&self) -> i64 {
        self.last_cycle_completion_mark
    }

    pub fn heatmap_data(&self) -> &[HeatmapDay] {
        &self.heatmap_data
    }

    pub fn sessions(&self) -> &[FocusSession] {
        &self.sessions
    }

    /// Configured length of a phase in seconds
    pub fn phase_duration(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.pomodoro_minutes.saturating_mul(60),
            TimerMode::Break => self.break_minutes.saturating_mul(60),
        }
    }

    /// `MM:SS` of the time remaining
    pub fn formatted_time(&self) -> String {
        format!("{:02}:{:02}", self.time_remaining / 60, self.time_remaining % 60)
    }

    /// Fraction of the current phase already elapsed, in [0, 1]
    pub fn progress(&self) -> f64 {
        let total = self.phase_duration(self.timer_mode);
        if total == 0 {
            return 1.0;
        }
        (1.0 - self.time_remaining as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Focus seconds elapsed in the current focus phase
    pub fn elapsed_focus_seconds(&self) -> u32 {
        match self.timer_mode {
            TimerMode::Focus => self.phase_duration(TimerMode::Focus).saturating_sub(self.time_remaining),
            TimerMode::Break => 0,
        }
    }

    /// Minutes across the session log and the affection they earned
    pub fn history_totals(&self) -> (u64, u64) {
        self.sessions.iter().fold((0, 0), |(minutes, affection), s| {
            (
                minutes.saturating_add(s.duration),
                affection.saturating_add(affection_for(s.duration)),
            )
        })
    }

    /// Minutes per day over the seven days ending `today`, oldest first
    pub fn weekly_minutes(&self, today: NaiveDate) -> Vec<(NaiveDate, u64)> {
        (0..7)
            .rev()
            .filter_map(|back| today.checked_sub_days(chrono::Days::new(back)))
            .map(|date| {
                let minutes = self
                    .sessions
                    .iter()
                    .filter(|s| s.start_time.with_timezone(&Local).date_naive() == date)
                    .fold(0u64, |total, s| total.saturating_add(s.duration));
                (date, minutes)
            })
            .collect()
    }

    /// Apply one action at `now`
    pub fn apply(&mut self, action: SessionAction, now: DateTime<Local>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match action {
            SessionAction::Start => self.is_running = true,
            SessionAction::Pause => self.is_running = false,
            SessionAction::Reset => self.reset(),
            SessionAction::Tick => self.tick(&mut events),
            SessionAction::CompleteFocusPhase {
                completed_focus_seconds,
            } => {
                if self.timer_mode == TimerMode::Focus {
                    self.complete_focus(completed_focus_seconds, now, &mut events);
                } else {
                    debug!("Focus completion ignored during a break");
                }
            }
            SessionAction::CompleteBreakPhase => {
                if self.timer_mode == TimerMode::Break {
                    self.complete_break(&mut events);
                } else {
                    debug!("Break completion ignored during focus");
                }
            }
            SessionAction::CompletePhase {
                completed_focus_seconds,
            } => match self.timer_mode {
                TimerMode::Focus => self.complete_focus(completed_focus_seconds, now, &mut events),
                TimerMode::Break => self.complete_break(&mut events),
            },
            SessionAction::SetPomodoroMinutes(minutes) => {
                self.pomodoro_minutes = minutes;
                if self.timer_mode == TimerMode::Focus && !self.is_running {
                    self.time_remaining = self.phase_duration(TimerMode::Focus);
                }
            }
            SessionAction::SetBreakMinutes(minutes) => {
                self.break_minutes = minutes;
                if self.timer_mode == TimerMode::Break && !self.is_running {
                    self.time_remaining = self.phase_duration(TimerMode::Break);
                }
            }
            SessionAction::SetPomodoroCycles(cycles) => {
                self.pomodoro_cycles = cycles;
                self.current_cycle = self.current_cycle.min(cycles).max(1);
            }
            SessionAction::LoadState(patch) => self.load(patch),
        }
        events
    }

    fn reset(&mut self) {
        self.is_running = false;
        self.current_cycle = 1;
        self.cycle_accumulated_focus_seconds = 0;
        self.cycle_accumulated_pomodoros = 0;
        self.time_remaining = self.phase_duration(self.timer_mode);
    }

    fn tick(&mut self, events: &mut Vec<SessionEvent>) {
        if self.time_remaining == 0 {
            return;
        }
        self.time_remaining -= 1;
        if self.time_remaining == 0 {
            events.push(SessionEvent::PhaseExhausted {
                mode: self.timer_mode,
            });
        }
    }

    fn complete_focus(&mut self, completed: Option<i64>, now: DateTime<Local>, events: &mut Vec<SessionEvent>) {
        let full = self.phase_duration(TimerMode::Focus) as i64;
        let credited = completed.unwrap_or(full).clamp(0, full) as u64;

        self.cycle_accumulated_focus_seconds = self.cycle_accumulated_focus_seconds.saturating_add(credited);
        self.cycle_accumulated_pomodoros = self.cycle_accumulated_pomodoros.saturating_add(1);
        events.push(SessionEvent::FocusCompleted {
            cycle: self.current_cycle,
            credited_seconds: credited,
        });

        if self.current_cycle < self.pomodoro_cycles {
            // The break keeps the cycle number of the focus phase it follows
            self.timer_mode = TimerMode::Break;
            self.time_remaining = self.phase_duration(TimerMode::Break);
            self.is_running = true;
            debug!(
                "Focus {}/{} done, break started",
                self.current_cycle, self.pomodoro_cycles
            );
            return;
        }

        let settlement = self.settle(now);
        events.push(SessionEvent::RunSettled(settlement));
    }

    fn settle(&mut self, now: DateTime<Local>) -> Settlement {
        let minutes = self.cycle_accumulated_focus_seconds / 60;
        let pomodoros = self.cycle_accumulated_pomodoros;
        let affection_gain = affection_for(minutes);

        let today = now.date_naive();
        let yesterday = today.pred_opt();
        let streak = match self.last_session_date {
            Some(last) if last == today => self.current_streak,
            Some(last) if Some(last) == yesterday => self.current_streak.saturating_add(1),
            _ => 1,
        };

        match self.heatmap_data.iter_mut().find(|d| d.date == today) {
            Some(day) => {
                day.minutes = day.minutes.saturating_add(minutes);
                day.sessions = day.sessions.saturating_add(pomodoros);
            }
            None => self.heatmap_data.push(HeatmapDay {
                date: today,
                minutes,
                sessions: pomodoros,
            }),
        }

        // Monotonic even if the wall clock steps backwards
        let mark = now
            .timestamp_millis()
            .max(self.last_cycle_completion_mark.saturating_add(1));
        self.sessions.push(FocusSession {
            id: mark.to_string(),
            start_time: now.with_timezone(&Utc),
            duration: minutes,
            completed: true,
        });

        self.affection = self.affection.saturating_add(affection_gain);
        self.total_focus_minutes = self.total_focus_minutes.saturating_add(minutes);
        self.sessions_completed = self.sessions_completed.saturating_add(pomodoros);
        self.current_streak = streak;
        self.longest_streak = self.longest_streak.max(streak);
        self.last_session_date = Some(today);
        self.last_cycle_completion_mark = mark;

        self.timer_mode = TimerMode::Focus;
        self.current_cycle = 1;
        self.time_remaining = self.phase_duration(TimerMode::Focus);
        self.is_running = false;
        self.cycle_accumulated_focus_seconds = 0;
        self.cycle_accumulated_pomodoros = 0;

        info!(
            "Run settled: {} min, {} pomodoros, +{} affection, streak {}",
            minutes, pomodoros, affection_gain, streak
        );
        Settlement {
            minutes,
            pomodoros,
            affection_gain,
            streak,
            completion_mark: mark,
        }
    }

    fn complete_break(&mut self, events: &mut Vec<SessionEvent>) {
        self.timer_mode = TimerMode::Focus;
        self.current_cycle = self.current_cycle.saturating_add(1).min(self.pomodoro_cycles);
        self.time_remaining = self.phase_duration(TimerMode::Focus);
        self.is_running = true;
        events.push(SessionEvent::BreakCompleted {
            cycle: self.current_cycle,
        });
    }

    fn load(&mut self, patch: SessionPatch) {
        let time_remaining = patch.time_remaining;
        patch.apply_to(self);
        self.is_running = false;
        self.current_cycle = self.current_cycle.clamp(1, self.pomodoro_cycles.max(1));
        let phase = self.phase_duration(self.timer_mode);
        self.time_remaining = time_remaining.map_or(phase, |t| t.min(phase));
        debug!(
            "State loaded: {} affection, {} sessions",
            self.affection,
            self.sessions.len()
        );
    }
}
