/// End-to-end tests for the session machine and its persisted record
///
/// Drives whole runs tick by tick through the public API and checks the
/// invariants that must hold at every step, then round-trips the record
/// through JSON the way export and import do.

use chrono::{DateTime, Duration, Local, TimeZone};
use focus_companion::record::{PersistedSession, SessionPatch};
use focus_companion::session::{
    affection_for, SessionAction, SessionEvent, SessionState, TimerMode,
};
use serde_json::json;

fn noon(day: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 3, day, 12, 0, 0)
        .single()
        .expect("valid local time")
}

/// Tick until the run settles, checking invariants on the way
fn run_to_settlement(state: &mut SessionState, now: DateTime<Local>) -> Vec<SessionEvent> {
    let mut all = Vec::new();
    state.apply(SessionAction::Start, now);
    for _ in 0..100_000 {
        assert!(state.time_remaining() <= state.phase_duration(state.timer_mode()));
        assert!(state.current_cycle() >= 1 && state.current_cycle() <= state.pomodoro_cycles());

        let mut events = state.apply(SessionAction::Tick, now);
        let exhausted = events
            .iter()
            .any(|e| matches!(e, SessionEvent::PhaseExhausted { .. }));
        if exhausted {
            events.extend(state.apply(
                SessionAction::CompletePhase {
                    completed_focus_seconds: None,
                },
                now,
            ));
        }
        let settled = events
            .iter()
            .any(|e| matches!(e, SessionEvent::RunSettled(_)));
        all.extend(events);
        if settled {
            return all;
        }
    }
    panic!("run never settled");
}

#[test]
fn test_runs_of_every_length_settle_once() {
    for cycles in 1..=4u32 {
        let mut state = SessionState::new(1, 1, cycles);
        let events = run_to_settlement(&mut state, noon(10));

        let focus_done = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::FocusCompleted { .. }))
            .count();
        let breaks_done = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::BreakCompleted { .. }))
            .count();
        assert_eq!(focus_done, cycles as usize);
        assert_eq!(breaks_done, cycles as usize - 1);

        assert_eq!(state.total_focus_minutes(), cycles as u64);
        assert_eq!(state.sessions_completed(), cycles as u64);
        assert_eq!(state.affection(), affection_for(cycles as u64));
        assert_eq!(state.sessions().len(), 1);
        assert!(!state.is_running());
        assert_eq!(state.timer_mode(), TimerMode::Focus);
        assert_eq!(state.current_cycle(), 1);
        assert_eq!(state.cycle_accumulated_focus_seconds(), 0);
    }
}

#[test]
fn test_streak_over_a_week() {
    let mut state = SessionState::new(1, 1, 1);
    // 10, 11, 12 then a gap, then 14 twice
    for day in [10, 11, 12] {
        run_to_settlement(&mut state, noon(day));
    }
    assert_eq!(state.current_streak(), 3);

    run_to_settlement(&mut state, noon(14));
    assert_eq!(state.current_streak(), 1);
    run_to_settlement(&mut state, noon(14) + Duration::hours(2));
    assert_eq!(state.current_streak(), 1);
    assert_eq!(state.longest_streak(), 3);

    let day14 = state
        .heatmap_data()
        .iter()
        .find(|d| d.date == noon(14).date_naive())
        .expect("heatmap day");
    assert_eq!(day14.minutes, 2);
    assert_eq!(day14.sessions, 2);

    let week = state.weekly_minutes(noon(14).date_naive());
    assert_eq!(week.len(), 7);
    assert_eq!(week.iter().map(|(_, m)| m).sum::<u64>(), 5);
}

#[test]
fn test_export_import_round_trip() {
    let mut state = SessionState::new(1, 1, 2);
    run_to_settlement(&mut state, noon(20));
    run_to_settlement(&mut state, noon(21));
    state.apply(SessionAction::Start, noon(21));
    for _ in 0..30 {
        state.apply(SessionAction::Tick, noon(21));
    }
    state.apply(
        SessionAction::CompleteFocusPhase {
            completed_focus_seconds: Some(30),
        },
        noon(21),
    );

    let exported = PersistedSession::from(&state).to_json();
    let text = serde_json::to_string(&exported).expect("serialize");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("parse");

    let mut fresh = SessionState::default();
    fresh.apply(
        SessionAction::LoadState(SessionPatch::from_json(&parsed)),
        noon(22),
    );

    assert_eq!(PersistedSession::from(&fresh), PersistedSession::from(&state));
    assert!(!fresh.is_running());
    assert_eq!(fresh.timer_mode(), TimerMode::Break);
    assert_eq!(fresh.time_remaining(), 60);
}

#[test]
fn test_import_repairs_hostile_record() {
    let record = json!({
        "affection": "lots",
        "totalFocusMinutes": -40,
        "sessionsCompleted": "12",
        "pomodoroMinutes": 0,
        "pomodoroCycles": 3,
        "currentCycle": 9,
        "timerMode": "nap",
        "lastSessionDate": "Sun Mar 01 2026",
        "sessions": [
            {"id": 1, "startTime": 1767225600000i64, "duration": 25, "completed": true},
            {"id": "broken"},
        ],
        "heatmapData": "nope",
    });

    let mut state = SessionState::default();
    state.apply(
        SessionAction::LoadState(SessionPatch::from_json(&record)),
        noon(2),
    );

    assert_eq!(state.affection(), 0);
    assert_eq!(state.total_focus_minutes(), 0);
    assert_eq!(state.sessions_completed(), 12);
    assert_eq!(state.pomodoro_minutes(), 25);
    assert_eq!(state.pomodoro_cycles(), 3);
    assert_eq!(state.current_cycle(), 3);
    assert_eq!(state.timer_mode(), TimerMode::Focus);
    assert_eq!(
        state.last_session_date(),
        chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
    );
    assert_eq!(state.sessions().len(), 1);
    assert!(state.heatmap_data().is_empty());

    // A streak continues from the imported date
    let mut state = state;
    state.apply(SessionAction::SetPomodoroCycles(1), noon(2));
    state.apply(SessionAction::SetPomodoroMinutes(1), noon(2));
    run_to_settlement(&mut state, noon(2));
    assert_eq!(state.current_streak(), 1);
}
