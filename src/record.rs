//! Persisted session record and defensive state import
//!
//! [`PersistedSession`] is the pure-data projection of a [`SessionState`]
//! written to storage: everything except the countdown (`isTimerRunning`,
//! `timeRemaining`), which is rebuilt from the mode and configured durations
//! on load.
//!
//! [`SessionPatch`] is the other direction. It is parsed from arbitrary JSON
//! (a saved record, a backup file, a hand-edited export) and never fails:
//!
//! - numbers are coerced (`"12"` and `true` are numbers, negatives clamp to 0)
//! - a corrupt field is treated as absent, except `affection` which falls
//!   back to 0
//! - malformed collections become empty; malformed entries are skipped
//! - dates accept `2026-10-18` and `Sun Oct 18 2026`
//! - phase lengths are capped at [`MAX_PHASE_MINUTES`]

use crate::session::{FocusSession, HeatmapDay, SessionState, TimerMode};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Longest focus or break phase an import may set (one day)
pub const MAX_PHASE_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub affection: u64,
    pub total_focus_minutes: u64,
    pub sessions_completed: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_session_date: Option<NaiveDate>,
    pub pomodoro_minutes: u32,
    pub break_minutes: u32,
    pub pomodoro_cycles: u32,
    pub current_cycle: u32,
    pub timer_mode: TimerMode,
    pub last_cycle_completion_mark: i64,
    pub cycle_accumulated_focus_seconds: u64,
    pub cycle_accumulated_pomodoros: u64,
    pub sessions: Vec<FocusSession>,
    pub heatmap_data: Vec<HeatmapDay>,
}

impl From<&SessionState> for PersistedSession {
    fn from(state: &SessionState) -> Self {
        Self {
            affection: state.affection,
            total_focus_minutes: state.total_focus_minutes,
            sessions_completed: state.sessions_completed,
            current_streak: state.current_streak,
            longest_streak: state.longest_streak,
            last_session_date: state.last_session_date,
            pomodoro_minutes: state.pomodoro_minutes,
            break_minutes: state.break_minutes,
            pomodoro_cycles: state.pomodoro_cycles,
            current_cycle: state.current_cycle,
            timer_mode: state.timer_mode,
            last_cycle_completion_mark: state.last_cycle_completion_mark,
            cycle_accumulated_focus_seconds: state.cycle_accumulated_focus_seconds,
            cycle_accumulated_pomodoros: state.cycle_accumulated_pomodoros,
            sessions: state.sessions.clone(),
            heatmap_data: state.heatmap_data.clone(),
        }
    }
}

impl PersistedSession {
    pub fn to_json(&self) -> Value {
        // Plain structs of numbers, strings and dates always serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A full or partial state overwrite; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub affection: Option<u64>,
    pub total_focus_minutes: Option<u64>,
    pub sessions_completed: Option<u64>,
    pub current_streak: Option<u32>,
    pub longest_streak: Option<u32>,
    /// `Some(None)` clears the date
    pub last_session_date: Option<Option<NaiveDate>>,
    pub pomodoro_minutes: Option<u32>,
    pub break_minutes: Option<u32>,
    pub pomodoro_cycles: Option<u32>,
    pub current_cycle: Option<u32>,
    pub timer_mode: Option<TimerMode>,
    pub time_remaining: Option<u32>,
    pub last_cycle_completion_mark: Option<i64>,
    pub cycle_accumulated_focus_seconds: Option<u64>,
    pub cycle_accumulated_pomodoros: Option<u64>,
    pub sessions: Option<Vec<FocusSession>>,
    pub heatmap_data: Option<Vec<HeatmapDay>>,
}

impl From<PersistedSession> for SessionPatch {
    fn from(record: PersistedSession) -> Self {
        Self {
            affection: Some(record.affection),
            total_focus_minutes: Some(record.total_focus_minutes),
            sessions_completed: Some(record.sessions_completed),
            current_streak: Some(record.current_streak),
            longest_streak: Some(record.longest_streak),
            last_session_date: Some(record.last_session_date),
            pomodoro_minutes: Some(record.pomodoro_minutes),
            break_minutes: Some(record.break_minutes),
            pomodoro_cycles: Some(record.pomodoro_cycles),
            current_cycle: Some(record.current_cycle),
            timer_mode: Some(record.timer_mode),
            time_remaining: None,
            last_cycle_completion_mark: Some(record.last_cycle_completion_mark),
            cycle_accumulated_focus_seconds: Some(record.cycle_accumulated_focus_seconds),
            cycle_accumulated_pomodoros: Some(record.cycle_accumulated_pomodoros),
            sessions: Some(record.sessions),
            heatmap_data: Some(record.heatmap_data),
        }
    }
}

impl SessionPatch {
    /// Parse any JSON value; anything unusable is simply absent
    ///
    /// Backup files that nest the lifetime stats under `"stats"` are
    /// accepted too.
    pub fn from_json(value: &Value) -> Self {
        let Some(root) = value.as_object() else {
            return Self::default();
        };
        let stats = root.get("stats").and_then(Value::as_object);
        let field = |name| lookup(root, stats, name);

        Self {
            affection: field("affection").map(|v| count(v).unwrap_or(0)),
            total_focus_minutes: field("totalFocusMinutes").and_then(count),
            sessions_completed: field("sessionsCompleted").and_then(count),
            current_streak: field("currentStreak").and_then(count_u32),
            longest_streak: field("longestStreak").and_then(count_u32),
            last_session_date: field("lastSessionDate").and_then(|v| match v {
                Value::Null => Some(None),
                other => parse_date(other).map(Some),
            }),
            pomodoro_minutes: field("pomodoroMinutes").and_then(phase_minutes),
            break_minutes: field("breakMinutes").and_then(phase_minutes),
            pomodoro_cycles: field("pomodoroCycles").and_then(positive),
            current_cycle: field("currentCycle").and_then(positive),
            timer_mode: field("timerMode").and_then(|v| match v.as_str()? {
                "focus" => Some(TimerMode::Focus),
                "break" => Some(TimerMode::Break),
                _ => None,
            }),
            time_remaining: field("timeRemaining").and_then(count_u32),
            last_cycle_completion_mark: field("lastCycleCompletionMark")
                .and_then(number)
                .map(|n| n.max(0.0) as i64),
            cycle_accumulated_focus_seconds: field("cycleAccumulatedFocusSeconds").and_then(count),
            cycle_accumulated_pomodoros: field("cycleAccumulatedPomodoros").and_then(count),
            sessions: field("sessions").map(parse_sessions),
            heatmap_data: field("heatmapData").map(parse_heatmap),
        }
    }

    /// Overwrite every field present in the patch
    pub fn apply_to(self, state: &mut SessionState) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut state.affection, self.affection);
        set(&mut state.total_focus_minutes, self.total_focus_minutes);
        set(&mut state.sessions_completed, self.sessions_completed);
        set(&mut state.current_streak, self.current_streak);
        set(&mut state.longest_streak, self.longest_streak);
        set(&mut state.last_session_date, self.last_session_date);
        set(&mut state.pomodoro_minutes, self.pomodoro_minutes);
        set(&mut state.break_minutes, self.break_minutes);
        set(&mut state.pomodoro_cycles, self.pomodoro_cycles);
        set(&mut state.current_cycle, self.current_cycle);
        set(&mut state.timer_mode, self.timer_mode);
        set(&mut state.last_cycle_completion_mark, self.last_cycle_completion_mark);
        set(
            &mut state.cycle_accumulated_focus_seconds,
            self.cycle_accumulated_focus_seconds,
        );
        set(&mut state.cycle_accumulated_pomodoros, self.cycle_accumulated_pomodoros);
        set(&mut state.sessions, self.sessions);
        set(&mut state.heatmap_data, self.heatmap_data);
    }
}

fn lookup<'a>(root: &'a Map<String, Value>, stats: Option<&'a Map<String, Value>>, name: &str) -> Option<&'a Value> {
    root.get(name).or_else(|| stats.and_then(|s| s.get(name)))
}

/// Loose numeric coercion; `None` for null, NaN, objects and junk strings
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Non-negative whole number, negatives clamped to 0
fn count(value: &Value) -> Option<u64> {
    number(value).map(|n| n.max(0.0).floor() as u64)
}

fn count_u32(value: &Value) -> Option<u32> {
    count(value).map(|n| n.min(u32::MAX as u64) as u32)
}

/// Strictly positive whole number (durations, cycle counts)
fn positive(value: &Value) -> Option<u32> {
    count_u32(value).filter(|n| *n > 0)
}

fn phase_minutes(value: &Value) -> Option<u32> {
    positive(value).map(|n| n.min(MAX_PHASE_MINUTES))
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%a %b %d %Y"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_f64()? as i64),
        _ => None,
    }
}

fn parse_sessions(value: &Value) -> Vec<FocusSession> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let id = match obj.get("id")? {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(FocusSession {
                id,
                start_time: parse_timestamp(obj.get("startTime")?)?,
                duration: obj.get("duration").and_then(count).unwrap_or(0),
                completed: obj.get("completed").and_then(Value::as_bool).unwrap_or(true),
            })
        })
        .collect()
}

/// Entries with the same date are merged
fn parse_heatmap(value: &Value) -> Vec<HeatmapDay> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    let mut days: Vec<HeatmapDay> = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(date) = obj.get("date").and_then(parse_date) else {
            continue;
        };
        let minutes = obj.get("minutes").and_then(count).unwrap_or(0);
        let sessions = obj.get("sessions").and_then(count).unwrap_or(0);
        match days.iter_mut().find(|d| d.date == date) {
            Some(day) => {
                day.minutes = day.minutes.saturating_add(minutes);
                day.sessions = day.sessions.saturating_add(sessions);
            }
            None => days.push(HeatmapDay {
                date,
                minutes,
                sessions,
            }),
        }
    }
    days
}
