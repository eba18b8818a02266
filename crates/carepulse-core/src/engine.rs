//! Event ingestion orchestrator.
//!
//! [`Engine::ingest`] is the single entry point for client events. Each
//! call runs inside one immediate SQLite transaction: idempotency check,
//! ordering check, state transition, baseline re-estimation, schedule
//! and score recomputation, and escalation evaluation all commit
//! together or not at all. Collaborators (mission tracker, caregiver
//! notifier) are invoked only after the commit succeeds, so their
//! failures can never poison ingestion.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::{Baseline, BaselinePatch, ESTIMATE_WINDOW_DAYS};
use crate::connection::resolve_alert_target;
use crate::error::{DatabaseError, Result, ValidationError};
use crate::escalation::{should_escalate, Escalation, EscalationStatus};
use crate::event::{EventRecord, EventType, InboundEvent};
use crate::notify::{CaregiverNotifier, LogNotifier};
use crate::schedule::compute_schedule;
use crate::scoring::compute_score;
use crate::state::EngineState;
use crate::storage::Database;
use crate::streak::{MissionTracker, NoopMissionTracker, SqliteMissionTracker, DAILY_CHECK_IN_MISSION};

/// What the engine did with one event, beyond the state itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionFlags {
    /// The event id was already committed; nothing changed.
    pub idempotent: bool,

    /// The event arrived with an effective time older than the newest
    /// accepted event and was logged without being applied.
    pub out_of_order: bool,

    /// A new escalation row was created by this event.
    pub escalation_created: bool,

    /// Id of the escalation created by this event, if any.
    pub escalation_id: Option<String>,
}

/// Response to one ingested event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Committed engine state after the event.
    pub state: EngineState,

    /// Alert probability score of the committed state.
    pub aps: f64,

    /// Urgency tier of the committed state.
    pub tier: u8,

    /// Reason codes. For an out-of-order event this carries an extra
    /// `order=late` entry that is not part of the committed state.
    pub reasons: Vec<String>,

    pub actions: ActionFlags,
}

/// The escalation engine: storage plus collaborator seams.
pub struct Engine {
    db: Database,
    tracker: Box<dyn MissionTracker>,
    notifier: Box<dyn CaregiverNotifier>,
}

impl Engine {
    /// Open the engine against the default database location, wired to
    /// the SQLite mission tracker and the log notifier.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        let db = Database::open()?;
        let tracker = SqliteMissionTracker::open()?;
        Ok(Self {
            db,
            tracker: Box::new(tracker),
            notifier: Box::new(LogNotifier),
        })
    }

    /// Engine over an existing database with no-op collaborators.
    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            tracker: Box::new(NoopMissionTracker),
            notifier: Box::new(LogNotifier),
        }
    }

    /// Engine with explicit collaborator implementations.
    pub fn with_collaborators(
        db: Database,
        tracker: Box<dyn MissionTracker>,
        notifier: Box<dyn CaregiverNotifier>,
    ) -> Self {
        Self { db, tracker, notifier }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Ingest one client event.
    ///
    /// Replays of an already committed event id return the committed
    /// state unchanged. Events whose effective time is older than the
    /// newest accepted event are logged for audit and baseline
    /// estimation but never mutate state.
    ///
    /// # Errors
    /// Returns an error if validation or storage fails; a storage error
    /// rolls the whole event back.
    pub fn ingest(&mut self, event: &InboundEvent, now: DateTime<Utc>) -> Result<IngestOutcome> {
        event.validate()?;

        let tx = self.db.begin_immediate().map_err(DatabaseError::from)?;

        // Replay: the committed row wins, including its user id.
        if let Some(existing) = self.db.find_event(&event.event_id)? {
            let state = self
                .db
                .get_state(&existing.user_id)?
                .unwrap_or_else(|| EngineState::new(&existing.user_id, now));
            log::debug!("event {} replayed for {}", event.event_id, existing.user_id);
            return Ok(IngestOutcome {
                aps: state.aps,
                tier: state.tier,
                reasons: state.reasons.clone(),
                state,
                actions: ActionFlags {
                    idempotent: true,
                    out_of_order: !existing.accepted,
                    ..ActionFlags::default()
                },
            });
        }

        let user_id = event.user_id.clone();
        let mut baseline = self.db.ensure_baseline(&user_id, now)?;
        let mut state = self
            .db
            .get_state(&user_id)?
            .unwrap_or_else(|| EngineState::new(&user_id, now));

        let t = event.effective_time(now);
        let silence_minutes = if event.event_type == EventType::CheckIn {
            silence_since_ask(&state, t)
        } else {
            None
        };

        // Ordering: strictly older than the newest accepted event means
        // log-only. The row still feeds baseline estimation.
        if let Some(last) = state.last_event_ts {
            if t < last {
                self.db.insert_event(&log_record(event, t, now, silence_minutes, false))?;
                tx.commit().map_err(DatabaseError::from)?;
                log::info!(
                    "late event {} for {} logged without applying ({} < {})",
                    event.event_id,
                    user_id,
                    t.to_rfc3339(),
                    last.to_rfc3339()
                );
                let mut reasons = state.reasons.clone();
                reasons.push("order=late".to_string());
                return Ok(IngestOutcome {
                    aps: state.aps,
                    tier: state.tier,
                    reasons,
                    state,
                    actions: ActionFlags {
                        out_of_order: true,
                        ..ActionFlags::default()
                    },
                });
            }
        }

        state.apply_event(event.event_type, event.self_report, t);
        self.db.insert_event(&log_record(event, t, now, silence_minutes, true))?;

        if event.event_type == EventType::CheckIn {
            let since = t - Duration::days(ESTIMATE_WINDOW_DAYS);
            let samples = self.db.silence_samples(&user_id, since)?;
            if baseline.reestimate(&samples, now) {
                self.db.upsert_baseline(&baseline)?;
                log::info!(
                    "baseline for {} re-estimated from {} samples: mean={:.1} std={:.1}",
                    user_id,
                    samples.len(),
                    baseline.silence_mean_minutes,
                    baseline.silence_std_minutes
                );
            }
        }

        let plan = compute_schedule(now, &state, &baseline)?;
        state.next_ask_at = Some(plan.next_ask_at);
        state.cooldown_until = plan.cooldown_until;

        let score = compute_score(now, &state, &baseline);
        state.aps = score.aps;
        state.tier = score.tier;
        state.reasons = score.reasons.clone();

        let mut actions = ActionFlags::default();
        let mut notice: Option<(String, String, String)> = None;
        if should_escalate(now, &state, &baseline, &score) {
            if let Some(episode_id) = state.episode_id.clone() {
                if self.db.find_escalation_by_episode(&episode_id)?.is_none() {
                    let mut escalation =
                        Escalation::new(&user_id, &episode_id, score.reasons.clone(), now);
                    let connections = self.db.list_connections(&user_id)?;
                    if let Some(target) = resolve_alert_target(&connections) {
                        escalation.mark_sent(target, now);
                        notice = Some((
                            target.id.clone(),
                            target.caregiver_id.clone(),
                            format!(
                                "{} needs attention: alert tier {} with {} unanswered prompts",
                                user_id, score.tier, state.silence_count
                            ),
                        ));
                    } else {
                        log::warn!("escalation for {user_id} has no caregiver able to receive it");
                    }
                    self.db.insert_escalation(&escalation)?;
                    log::info!(
                        "escalation {} created for {} (episode {}, status {:?})",
                        escalation.id,
                        user_id,
                        episode_id,
                        escalation.status
                    );
                    actions.escalation_created = true;
                    actions.escalation_id = Some(escalation.id);
                }
            }
        }

        state.updated_at = now;
        self.db.upsert_state(&state)?;
        tx.commit().map_err(DatabaseError::from)?;
        log::debug!(
            "event {} applied for {} (status {:?}, aps {:.3}, tier {})",
            event.event_id,
            user_id,
            state.status,
            state.aps,
            state.tier
        );

        // Past here nothing may fail the ingest; collaborator errors are
        // logged and dropped.
        if event.event_type == EventType::CheckIn {
            if let Err(e) = self
                .tracker
                .record_progress(&user_id, DAILY_CHECK_IN_MISSION, 1, now)
            {
                log::warn!("mission tracker failed for {user_id}: {e}");
            }
        }
        if let Some((connection_id, caregiver_id, message)) = notice {
            if let Err(e) = self.notifier.notify(&connection_id, &caregiver_id, &message) {
                log::warn!("caregiver notification failed for {user_id}: {e}");
            }
        }

        Ok(IngestOutcome {
            aps: state.aps,
            tier: state.tier,
            reasons: state.reasons.clone(),
            state,
            actions,
        })
    }

    /// Acknowledge an escalation on behalf of a caregiver.
    ///
    /// Acknowledging an already acknowledged escalation is a no-op
    /// success. A pending escalation that never reached a caregiver may
    /// still be acknowledged.
    ///
    /// # Errors
    /// Returns `DatabaseError::NotFound` for an unknown escalation and
    /// `ValidationError::NotPermitted` if the caregiver holds no
    /// accepted connection with acknowledgement rights.
    pub fn ack_escalation(
        &mut self,
        escalation_id: &str,
        caregiver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Escalation> {
        let tx = self.db.begin_immediate().map_err(DatabaseError::from)?;

        let mut escalation = self
            .db
            .get_escalation(escalation_id)?
            .ok_or_else(|| DatabaseError::NotFound(format!("escalation {escalation_id}")))?;

        if escalation.status == EscalationStatus::Acknowledged {
            return Ok(escalation);
        }

        let connections = self.db.list_connections(&escalation.user_id)?;
        if !connections.iter().any(|c| c.permits_acknowledge(caregiver_id)) {
            return Err(ValidationError::NotPermitted(format!(
                "caregiver {caregiver_id} cannot acknowledge for {}",
                escalation.user_id
            ))
            .into());
        }

        self.db
            .mark_escalation_acknowledged(escalation_id, caregiver_id, now)?;
        tx.commit().map_err(DatabaseError::from)?;
        log::info!("escalation {escalation_id} acknowledged by {caregiver_id}");

        escalation.status = EscalationStatus::Acknowledged;
        escalation.acknowledged_at = Some(now);
        escalation.acknowledged_by = Some(caregiver_id.to_string());
        Ok(escalation)
    }

    /// Apply explicit baseline overrides for a user.
    ///
    /// # Errors
    /// Returns an error if any override value is out of range.
    pub fn set_baseline(
        &mut self,
        user_id: &str,
        patch: &BaselinePatch,
        now: DateTime<Utc>,
    ) -> Result<Baseline> {
        let tx = self.db.begin_immediate().map_err(DatabaseError::from)?;
        let mut baseline = self.db.ensure_baseline(user_id, now)?;
        baseline.apply(patch, now)?;
        self.db.upsert_baseline(&baseline)?;
        tx.commit().map_err(DatabaseError::from)?;
        log::info!("baseline for {user_id} updated");
        Ok(baseline)
    }
}

/// Minutes from the last emergency prompt to `at`, when a prompt
/// reference exists and does not postdate the event.
fn silence_since_ask(state: &EngineState, at: DateTime<Utc>) -> Option<f64> {
    let ask = state.emergency_last_ask_at?;
    let minutes = at.signed_duration_since(ask).num_milliseconds() as f64 / 60_000.0;
    (minutes >= 0.0).then_some(minutes)
}

/// Build the log row for an inbound event.
fn log_record(
    event: &InboundEvent,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    silence_minutes: Option<f64>,
    accepted: bool,
) -> EventRecord {
    EventRecord {
        id: 0,
        event_id: event.event_id.clone(),
        user_id: event.user_id.clone(),
        event_type: event.event_type,
        occurred_at,
        client_tz: event.client_tz.clone(),
        ui_session_id: event.ui_session_id.clone(),
        source: event.source,
        self_report: event.self_report,
        silence_minutes,
        payload: event.payload.clone(),
        accepted,
        recorded_at,
    }
}
