//! Integration tests for adaptive baseline learning.

use carepulse_core::baseline::SIGMA_FLOOR_MINUTES;
use carepulse_core::{
    Baseline, BaselinePatch, Database, Engine, EventSource, EventType, InboundEvent, SelfReport,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn event(event_id: &str, event_type: EventType, report: Option<SelfReport>) -> InboundEvent {
    InboundEvent {
        event_id: event_id.to_string(),
        user_id: "user-1".to_string(),
        event_type,
        client_ts: None,
        client_tz: None,
        ui_session_id: None,
        source: EventSource::Scheduler,
        self_report: report,
        payload: None,
    }
}

/// Prompt the user, then answer after `silence` minutes.
fn prompt_and_answer(engine: &mut Engine, n: usize, at: DateTime<Utc>, silence: i64) -> DateTime<Utc> {
    engine
        .ingest(&event(&format!("prompt-{n}"), EventType::PopupShown, None), at)
        .unwrap();
    let answered = at + Duration::minutes(silence);
    engine
        .ingest(
            &event(&format!("answer-{n}"), EventType::CheckIn, Some(SelfReport::Normal)),
            answered,
        )
        .unwrap();
    answered
}

#[test]
fn test_reestimation_needs_three_samples() {
    let mut engine = Engine::with_database(Database::open_memory().unwrap());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let t1 = prompt_and_answer(&mut engine, 1, t0, 30);
    let t2 = prompt_and_answer(&mut engine, 2, t1 + Duration::hours(2), 45);

    // Two samples: the learned profile keeps its defaults.
    let baseline = engine.database().get_baseline("user-1").unwrap().unwrap();
    assert_eq!(baseline.silence_mean_minutes, 45.0);
    assert_eq!(baseline.silence_std_minutes, 20.0);

    prompt_and_answer(&mut engine, 3, t2 + Duration::hours(2), 60);

    // Third sample: mean and population deviation of [30, 45, 60].
    let baseline = engine.database().get_baseline("user-1").unwrap().unwrap();
    assert!((baseline.silence_mean_minutes - 45.0).abs() < 1e-9);
    assert!((baseline.silence_std_minutes - 150.0_f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_identical_samples_hit_sigma_floor() {
    let mut engine = Engine::with_database(Database::open_memory().unwrap());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let mut at = t0;
    for n in 1..=4 {
        at = prompt_and_answer(&mut engine, n, at, 40) + Duration::hours(2);
    }

    let baseline = engine.database().get_baseline("user-1").unwrap().unwrap();
    assert_eq!(baseline.silence_mean_minutes, 40.0);
    // Zero spread in the data, but the floor holds the denominator up.
    assert_eq!(baseline.silence_std_minutes, SIGMA_FLOOR_MINUTES);
}

#[test]
fn test_sub_floor_sigma_heals_during_ingestion() {
    let db = Database::open_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let mut corrupt = Baseline::defaults("user-1", t0 - Duration::days(1));
    corrupt.silence_std_minutes = 0.25;
    db.upsert_baseline(&corrupt).unwrap();

    let mut engine = Engine::with_database(db);
    engine
        .ingest(&event("open", EventType::AppOpened, None), t0)
        .unwrap();

    let healed = engine.database().get_baseline("user-1").unwrap().unwrap();
    assert_eq!(healed.silence_std_minutes, SIGMA_FLOOR_MINUTES);
}

#[test]
fn test_threshold_override_moves_escalation_gate() {
    let mut engine = Engine::with_database(Database::open_memory().unwrap());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let patch = BaselinePatch {
        silence_threshold: Some(3),
        ..Default::default()
    };
    engine.set_baseline("user-1", &patch, t0 - Duration::hours(1)).unwrap();

    engine
        .ingest(
            &event("cry", EventType::CheckIn, Some(SelfReport::Emergency)),
            t0,
        )
        .unwrap();
    engine
        .ingest(
            &event("dismiss-1", EventType::PopupDismissed, None),
            t0 + Duration::minutes(5),
        )
        .unwrap();
    let second = engine
        .ingest(
            &event("dismiss-2", EventType::PopupDismissed, None),
            t0 + Duration::minutes(40),
        )
        .unwrap();

    // Two unanswered prompts meet the default gate but not the raised one.
    assert!(!second.actions.escalation_created);
    assert!(engine.database().list_escalations("user-1").unwrap().is_empty());

    let third = engine
        .ingest(
            &event("dismiss-3", EventType::PopupDismissed, None),
            t0 + Duration::minutes(45),
        )
        .unwrap();
    assert!(third.actions.escalation_created);
}

#[test]
fn test_late_rows_feed_the_sample_window() {
    let mut engine = Engine::with_database(Database::open_memory().unwrap());
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let t1 = prompt_and_answer(&mut engine, 1, t0, 30);
    let t2 = prompt_and_answer(&mut engine, 2, t1 + Duration::hours(2), 30);

    // A prompt answered out of order: the answer reaches the server
    // after a newer event has already advanced the clock.
    engine
        .ingest(
            &event("prompt-3", EventType::PopupShown, None),
            t2 + Duration::hours(2),
        )
        .unwrap();
    engine
        .ingest(
            &event("newer", EventType::AppOpened, None),
            t2 + Duration::hours(3),
        )
        .unwrap();
    let mut stale_answer = event("answer-3", EventType::CheckIn, Some(SelfReport::Normal));
    stale_answer.client_ts = Some((t2 + Duration::hours(2) + Duration::minutes(30)).timestamp_millis());
    let outcome = engine
        .ingest(&stale_answer, t2 + Duration::hours(3) + Duration::minutes(1))
        .unwrap();
    assert!(outcome.actions.out_of_order);

    // Still only two samples applied to state, but the fourth check-in
    // finds three in the log and re-estimates.
    let t4 = t2 + Duration::hours(5);
    prompt_and_answer(&mut engine, 4, t4, 30);

    let baseline = engine.database().get_baseline("user-1").unwrap().unwrap();
    assert_eq!(baseline.silence_mean_minutes, 30.0);
    assert_eq!(baseline.silence_std_minutes, SIGMA_FLOOR_MINUTES);
}
