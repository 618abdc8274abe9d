//! Drip sequencer: scheduled tick and manual start.
//!
//! Progress is never stored as a counter. The number of `drip_email` logs for
//! a protocol is the step pointer, and a log is only appended after the
//! provider accepted the email. The store's unique index on
//! `(protocol_id, step_number)` keeps concurrent workers from recording a step
//! twice; the in-process claim set keeps this process from dispatching it twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use uuid::Uuid;

use super::catalog::{due_step, DripTemplate, DueStep, CATALOG};
use super::error::{DripError, StartError};
use super::sender::{CommunicationSender, OutboundEmail, SendReceipt};
use super::types::*;
use crate::clock::{add_days, earliest_supported_date, is_supported_date, Clock};
use crate::config::DripConfig;
use crate::db::{DatabaseError, EligibilityQuery, LogStore, ProtocolStore};
use crate::models::enums::{LogKind, ProgramCategory};
use crate::models::{DripCandidate, LogPayload, Patient, Protocol, ProtocolLogEntry, ProtocolUpdate};

pub struct DripSequencer {
    logs: Arc<dyn LogStore>,
    protocols: Arc<dyn ProtocolStore>,
    eligibility: Arc<dyn EligibilityQuery>,
    sender: Arc<dyn CommunicationSender>,
    clock: Arc<dyn Clock>,
    config: DripConfig,
    in_flight: Mutex<HashSet<Uuid>>,
}

/// Releases a protocol claim when dropped.
struct Claim<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    protocol_id: Uuid,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.protocol_id);
    }
}

impl DripSequencer {
    /// Build a sequencer over one store that provides every collaborator.
    pub fn new<S>(
        store: Arc<S>,
        sender: Arc<dyn CommunicationSender>,
        clock: Arc<dyn Clock>,
        config: DripConfig,
    ) -> Self
    where
        S: LogStore + ProtocolStore + EligibilityQuery + 'static,
    {
        Self::from_parts(store.clone(), store.clone(), store, sender, clock, config)
    }

    pub fn from_parts(
        logs: Arc<dyn LogStore>,
        protocols: Arc<dyn ProtocolStore>,
        eligibility: Arc<dyn EligibilityQuery>,
        sender: Arc<dyn CommunicationSender>,
        clock: Arc<dyn Clock>,
        config: DripConfig,
    ) -> Self {
        Self {
            logs,
            protocols,
            eligibility,
            sender,
            clock,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    fn claim(&self, protocol_id: Uuid) -> Option<Claim<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.insert(protocol_id).then(|| Claim {
            set: &self.in_flight,
            protocol_id,
        })
    }

    /// Day-offset anchor: the manual-start date if any, else the creation
    /// date in the practice zone.
    pub fn anchor_date(&self, protocol: &Protocol) -> NaiveDate {
        protocol
            .drip_start_date
            .unwrap_or_else(|| self.clock.local_date(protocol.created_at))
    }

    async fn dispatch(&self, email: &OutboundEmail) -> Result<SendReceipt, DripError> {
        let timeout = self.config.dispatch_timeout;
        match tokio::time::timeout(timeout, self.sender.send(email)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DripError::DispatchTimeout(timeout.as_millis())),
        }
    }

    fn compose(template: &DripTemplate, patient: &Patient, to: &str) -> OutboundEmail {
        OutboundEmail {
            to: to.to_string(),
            subject: template.subject.to_string(),
            html: template.render(patient.salutation()),
        }
    }

    /// Process every eligible protocol once as of `as_of` (default today).
    /// Only candidate selection can fail the whole tick; per-protocol
    /// failures are reported in the results.
    pub async fn run_tick(&self, as_of: Option<NaiveDate>) -> Result<TickReport, DripError> {
        let today = as_of.unwrap_or_else(|| self.today());
        let window_start = add_days(today, -self.config.lookback_days)
            .filter(|d| is_supported_date(*d))
            .unwrap_or_else(earliest_supported_date);
        let since = self.clock.start_of_day(window_start);

        let candidates = self.eligibility.drip_candidates(since).map_err(|e| {
            tracing::error!(error = %e, "Drip tick: candidate query failed");
            e
        })?;
        tracing::info!(date = %today, candidates = candidates.len(), "Drip tick starting");

        let results: Vec<ProtocolTickResult> = stream::iter(candidates)
            .map(|candidate| async move { self.process(&candidate, today).await })
            .buffer_unordered(self.config.tick_concurrency.max(1))
            .collect()
            .await;

        let report = TickReport::new(today, results);
        tracing::info!(
            date = %today,
            protocols_checked = report.protocols_checked,
            emails_sent = report.emails_sent,
            unrecorded_sends = report.unrecorded_sends,
            "Drip tick finished"
        );
        Ok(report)
    }

    /// Advance one protocol by at most one step.
    pub async fn process(&self, candidate: &DripCandidate, today: NaiveDate) -> ProtocolTickResult {
        let protocol = &candidate.protocol;
        let outcome = match self.claim(protocol.id) {
            Some(_claim) => self.advance(candidate, today).await,
            None => {
                tracing::debug!(protocol_id = %protocol.id, "Drip: protocol already in flight");
                StepOutcome::InFlight
            }
        };
        ProtocolTickResult {
            protocol_id: protocol.id,
            patient_id: candidate.patient.id,
            outcome,
        }
    }

    async fn advance(&self, candidate: &DripCandidate, today: NaiveDate) -> StepOutcome {
        let protocol = &candidate.protocol;
        let patient = &candidate.patient;

        let emails_sent = match self.logs.count_logs(&protocol.id, LogKind::DripEmail) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(protocol_id = %protocol.id, error = %e, "Drip: log count failed");
                return StepOutcome::Error { error: e.to_string() };
            }
        };

        let template = match due_step(emails_sent, self.anchor_date(protocol), today) {
            DueStep::Complete => return StepOutcome::Complete,
            DueStep::NotYetDue { template, due_on } => {
                return StepOutcome::NotYetDue {
                    step_number: template.step_number,
                    due_on,
                }
            }
            DueStep::Due(template) => template,
        };

        let Some(to) = patient.contact_email() else {
            return StepOutcome::Error {
                error: "patient has no email address".into(),
            };
        };

        let email = Self::compose(template, patient, to);
        if let Err(e) = self.dispatch(&email).await {
            tracing::warn!(
                protocol_id = %protocol.id,
                step_number = template.step_number,
                error = %e,
                "Drip: dispatch failed, will retry next tick"
            );
            return StepOutcome::SendFailed {
                step_number: template.step_number,
                error: e.to_string(),
            };
        }

        let entry = drip_entry(protocol, template, today);
        match self.logs.append_log(&entry) {
            Ok(()) => {
                tracing::info!(
                    protocol_id = %protocol.id,
                    step_number = template.step_number,
                    subject = template.subject,
                    "Drip email sent"
                );
                StepOutcome::Sent {
                    step_number: template.step_number,
                    subject: template.subject.to_string(),
                }
            }
            Err(DatabaseError::DuplicateStep { .. }) => {
                tracing::warn!(
                    protocol_id = %protocol.id,
                    step_number = template.step_number,
                    "Drip: step recorded by a concurrent worker after this dispatch"
                );
                StepOutcome::AlreadyRecorded {
                    step_number: template.step_number,
                }
            }
            Err(e) => {
                tracing::error!(
                    protocol_id = %protocol.id,
                    step_number = template.step_number,
                    error = %e,
                    "Drip: email sent but not recorded; step may be sent again (at-least-once)"
                );
                StepOutcome::RecordFailed {
                    step_number: template.step_number,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Manual start: send step 0 now and re-anchor the remaining steps to
    /// today.
    pub async fn start_sequence(&self, protocol_id: &Uuid) -> Result<StartedSequence, StartError> {
        let protocol = self.protocols.get_protocol(protocol_id)?;
        if protocol.category != ProgramCategory::WeightLoss {
            return Err(reject(&protocol, StartRejection::NotWeightLoss));
        }

        let patient = self.protocols.get_patient(&protocol.patient_id)?;
        let Some(to) = patient.contact_email() else {
            return Err(reject(&protocol, StartRejection::NoEmail));
        };

        let Some(_claim) = self.claim(protocol.id) else {
            return Err(reject(&protocol, StartRejection::AlreadyStarted));
        };

        if self.logs.count_logs(&protocol.id, LogKind::DripEmail)? > 0 {
            return Err(reject(&protocol, StartRejection::AlreadyStarted));
        }
        if self.logs.count_patient_logs(&patient.id, LogKind::DripEmail)? > 0 {
            return Err(reject(&protocol, StartRejection::AlreadyReceivedElsewhere));
        }

        let today = self.today();
        let template = &CATALOG[0];
        let email = Self::compose(template, &patient, to);
        self.dispatch(&email).await.map_err(|e| {
            tracing::warn!(protocol_id = %protocol.id, error = %e, "Drip start: dispatch failed");
            e
        })?;

        let entry = drip_entry(&protocol, template, today);
        let update = ProtocolUpdate {
            drip_start_date: Some(today),
            ..Default::default()
        };
        let stored = match self.protocols.log_and_update(&entry, &update) {
            Ok(stored) => stored,
            Err(DatabaseError::DuplicateStep { .. }) => {
                tracing::warn!(
                    protocol_id = %protocol.id,
                    "Drip start: step 0 recorded by a concurrent worker after this dispatch"
                );
                return Err(StartError::Rejected(StartRejection::AlreadyStarted));
            }
            Err(e) => {
                tracing::error!(
                    protocol_id = %protocol.id,
                    error = %e,
                    "Drip start: email sent but not recorded; step may be sent again (at-least-once)"
                );
                return Err(e.into());
            }
        };

        tracing::info!(protocol_id = %protocol.id, "Drip sequence started manually");
        Ok(StartedSequence {
            protocol_id: protocol.id,
            step_number: template.step_number,
            subject: template.subject.to_string(),
            drip_start_date: stored.drip_start_date.unwrap_or(today),
        })
    }
}

fn reject(protocol: &Protocol, reason: StartRejection) -> StartError {
    tracing::info!(protocol_id = %protocol.id, reason = reason.as_str(), "Drip start rejected");
    StartError::Rejected(reason)
}

fn drip_entry(protocol: &Protocol, template: &DripTemplate, today: NaiveDate) -> ProtocolLogEntry {
    ProtocolLogEntry::new(
        protocol.id,
        protocol.patient_id,
        today,
        LogPayload::DripEmail {
            step_number: template.step_number,
            subject: template.subject.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    use crate::clock::FixedClock;
    use crate::db::fixtures::*;
    use crate::db::SqliteStore;
    use crate::drip::sender::{SendError, SendFuture};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<OutboundEmail>>,
        failing: Mutex<HashSet<String>>,
        delay: Option<Duration>,
    }

    impl RecordingSender {
        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn fail_for(&self, to: &str) {
            self.failing.lock().unwrap().insert(to.to_string());
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn subjects(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|e| e.subject.clone()).collect()
        }
    }

    impl CommunicationSender for RecordingSender {
        fn send<'a>(&'a self, email: &'a OutboundEmail) -> SendFuture<'a> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.failing.lock().unwrap().contains(&email.to) {
                    return Err(SendError::Rejected {
                        status: 500,
                        body: "provider down".into(),
                    });
                }
                self.sent.lock().unwrap().push(email.clone());
                Ok(SendReceipt::default())
            })
        }
    }

    /// Delegates to SQLite but refuses every append.
    struct BrokenAppend(Arc<SqliteStore>);

    impl LogStore for BrokenAppend {
        fn append_log(&self, _entry: &ProtocolLogEntry) -> Result<(), DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        fn query_logs(&self, id: &Uuid, kind: Option<LogKind>) -> Result<Vec<ProtocolLogEntry>, DatabaseError> {
            self.0.query_logs(id, kind)
        }
        fn count_logs(&self, id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError> {
            self.0.count_logs(id, kind)
        }
        fn count_patient_logs(&self, id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError> {
            self.0.count_patient_logs(id, kind)
        }
        fn count_logs_between(
            &self,
            id: &Uuid,
            kind: LogKind,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<u32, DatabaseError> {
            self.0.count_logs_between(id, kind, from, to)
        }
        fn latest_log_date(&self, id: &Uuid, kind: LogKind) -> Result<Option<NaiveDate>, DatabaseError> {
            self.0.latest_log_date(id, kind)
        }
    }

    fn config() -> DripConfig {
        DripConfig {
            dispatch_timeout: Duration::from_secs(2),
            ..DripConfig::default()
        }
    }

    fn sequencer(store: &Arc<SqliteStore>, sender: &Arc<RecordingSender>, today: NaiveDate) -> DripSequencer {
        DripSequencer::new(
            store.clone(),
            sender.clone(),
            Arc::new(FixedClock::on_date(today, chrono_tz::America::Los_Angeles)),
            config(),
        )
    }

    fn seed(store: &SqliteStore, email: &str, created: chrono::DateTime<chrono::Utc>) -> Protocol {
        let patient = seed_patient(store, Some(email));
        let protocol = weight_loss_protocol(&patient, created);
        store.insert_protocol(&protocol).unwrap();
        protocol
    }

    fn sent_count(store: &SqliteStore, protocol: &Protocol) -> u32 {
        store.count_logs(&protocol.id, LogKind::DripEmail).unwrap()
    }

    fn only_outcome(report: &TickReport) -> &StepOutcome {
        assert_eq!(report.results.len(), 1, "expected one result: {report:?}");
        &report.results[0].outcome
    }

    #[tokio::test]
    async fn sends_one_step_per_day_until_complete() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, date(2026, 3, 2));

        let report = seq.run_tick(Some(date(2026, 3, 2))).await.unwrap();
        assert!(matches!(only_outcome(&report), StepOutcome::Sent { step_number: 0, .. }));
        assert_eq!(report.emails_sent, 1);

        let report = seq.run_tick(Some(date(2026, 3, 2))).await.unwrap();
        assert_eq!(
            only_outcome(&report),
            &StepOutcome::NotYetDue { step_number: 1, due_on: date(2026, 3, 3) }
        );

        for (day, step) in [(3, 1u8), (4, 2), (5, 3)] {
            let report = seq.run_tick(Some(date(2026, 3, day))).await.unwrap();
            match only_outcome(&report) {
                StepOutcome::Sent { step_number, .. } => assert_eq!(*step_number, step),
                other => panic!("day {day}: unexpected {other:?}"),
            }
        }

        let report = seq.run_tick(Some(date(2026, 3, 6))).await.unwrap();
        assert_eq!(only_outcome(&report), &StepOutcome::Complete);
        assert_eq!(sent_count(&store, &protocol), 4);
        assert_eq!(
            sender.subjects(),
            CATALOG.iter().map(|t| t.subject.to_string()).collect::<Vec<_>>()
        );

        let html = &sender.sent.lock().unwrap()[0].html;
        assert!(html.contains("Dana"));
    }

    #[tokio::test]
    async fn late_ticks_catch_up_without_skipping() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, date(2026, 3, 6));

        // Every step is overdue on day 4, but each tick advances exactly one.
        for expected in 0u8..4 {
            let report = seq.run_tick(Some(date(2026, 3, 6))).await.unwrap();
            match only_outcome(&report) {
                StepOutcome::Sent { step_number, .. } => assert_eq!(*step_number, expected),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(sent_count(&store, &protocol), u32::from(expected) + 1);
        }
    }

    #[tokio::test]
    async fn dispatch_failure_leaves_step_pending() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, date(2026, 3, 2));

        sender.fail_for("dana@example.com");
        let report = seq.run_tick(None).await.unwrap();
        assert!(matches!(only_outcome(&report), StepOutcome::SendFailed { step_number: 0, .. }));
        assert_eq!(report.emails_sent, 0);
        assert_eq!(sent_count(&store, &protocol), 0);

        sender.heal();
        let report = seq.run_tick(None).await.unwrap();
        assert!(matches!(only_outcome(&report), StepOutcome::Sent { step_number: 0, .. }));
        assert_eq!(sent_count(&store, &protocol), 1);
    }

    #[tokio::test]
    async fn dispatch_timeout_counts_as_failure() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::slow(Duration::from_secs(10)));
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = DripSequencer::new(
            store.clone(),
            sender.clone(),
            Arc::new(FixedClock::on_date(date(2026, 3, 2), chrono_tz::America::Los_Angeles)),
            DripConfig {
                dispatch_timeout: Duration::from_millis(50),
                ..DripConfig::default()
            },
        );

        let report = seq.run_tick(None).await.unwrap();
        match only_outcome(&report) {
            StepOutcome::SendFailed { error, .. } => assert!(error.contains("timed out")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sent_count(&store, &protocol), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_tick() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let failing = seed(&store, "broken@example.com", ts(2026, 3, 2));
        let healthy = seed(&store, "ok@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, date(2026, 3, 2));

        sender.fail_for("broken@example.com");
        let report = seq.run_tick(None).await.unwrap();
        assert_eq!(report.protocols_checked, 2);
        assert_eq!(report.emails_sent, 1);
        assert_eq!(sent_count(&store, &failing), 0);
        assert_eq!(sent_count(&store, &healthy), 1);
    }

    #[tokio::test]
    async fn unreadable_protocol_does_not_block_the_tick() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let corrupt = seed(&store, "corrupt@example.com", ts(2026, 3, 2));
        let healthy = seed(&store, "ok@example.com", ts(2026, 3, 2));
        store.with_conn(|conn| {
            conn.execute(
                "UPDATE protocols SET scheduled_days = '[\"funday\"]' WHERE id = ?1",
                [corrupt.id.to_string()],
            )
            .unwrap();
        });
        let seq = sequencer(&store, &sender, date(2026, 3, 2));

        let report = seq.run_tick(None).await.unwrap();
        assert!(matches!(only_outcome(&report), StepOutcome::Sent { step_number: 0, .. }));
        assert_eq!(report.results[0].protocol_id, healthy.id);
        assert_eq!(sent_count(&store, &healthy), 1);
        assert_eq!(sent_count(&store, &corrupt), 0);
    }

    #[tokio::test]
    async fn extreme_lookback_does_not_panic() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = DripSequencer::new(
            store.clone(),
            sender.clone(),
            Arc::new(FixedClock::on_date(date(2026, 3, 2), chrono_tz::America::Los_Angeles)),
            DripConfig {
                lookback_days: i64::MAX,
                ..config()
            },
        );

        let report = seq.run_tick(None).await.unwrap();
        assert_eq!(report.emails_sent, 1);
        assert_eq!(sent_count(&store, &protocol), 1);
    }

    #[tokio::test]
    async fn concurrent_ticks_in_one_process_send_once() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::slow(Duration::from_millis(100)));
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, date(2026, 3, 2));

        let (a, b) = tokio::join!(seq.run_tick(None), seq.run_tick(None));
        let outcomes = [only_outcome(&a.unwrap()).clone(), only_outcome(&b.unwrap()).clone()];
        assert!(outcomes.contains(&StepOutcome::InFlight));
        assert!(outcomes.iter().any(|o| matches!(o, StepOutcome::Sent { step_number: 0, .. })));
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
        assert_eq!(sent_count(&store, &protocol), 1);
    }

    #[tokio::test]
    async fn separate_workers_record_each_step_once() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::slow(Duration::from_millis(50)));
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        // Two sequencers share the store but not their in-flight sets.
        let first = sequencer(&store, &sender, date(2026, 3, 2));
        let second = sequencer(&store, &sender, date(2026, 3, 2));

        let (a, b) = tokio::join!(first.run_tick(None), second.run_tick(None));
        let outcomes = [only_outcome(&a.unwrap()).clone(), only_outcome(&b.unwrap()).clone()];
        assert!(outcomes.iter().any(|o| matches!(o, StepOutcome::Sent { step_number: 0, .. })));
        assert!(outcomes.contains(&StepOutcome::AlreadyRecorded { step_number: 0 }));

        let logs = store.query_logs(&protocol.id, Some(LogKind::DripEmail)).unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn record_failure_is_reported() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = DripSequencer::from_parts(
            Arc::new(BrokenAppend(store.clone())),
            store.clone(),
            store.clone(),
            sender.clone(),
            Arc::new(FixedClock::on_date(date(2026, 3, 2), chrono_tz::America::Los_Angeles)),
            config(),
        );

        let report = seq.run_tick(None).await.unwrap();
        assert!(matches!(only_outcome(&report), StepOutcome::RecordFailed { step_number: 0, .. }));
        assert_eq!(report.emails_sent, 1);
        assert_eq!(report.unrecorded_sends, 1);
        assert_eq!(sent_count(&store, &protocol), 0);
    }

    #[tokio::test]
    async fn manual_start_reanchors_sequence() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let today = date(2026, 3, 22);
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, today);

        let started = seq.start_sequence(&protocol.id).await.unwrap();
        assert_eq!(started.step_number, 0);
        assert_eq!(started.drip_start_date, today);
        assert_eq!(store.get_protocol(&protocol.id).unwrap().drip_start_date, Some(today));

        // Step 1 is due tomorrow, not immediately.
        let report = seq.run_tick(Some(today)).await.unwrap();
        assert_eq!(
            only_outcome(&report),
            &StepOutcome::NotYetDue { step_number: 1, due_on: date(2026, 3, 23) }
        );
        let report = seq.run_tick(Some(date(2026, 3, 23))).await.unwrap();
        assert!(matches!(only_outcome(&report), StepOutcome::Sent { step_number: 1, .. }));
    }

    #[tokio::test]
    async fn manual_start_rejections() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let seq = sequencer(&store, &sender, date(2026, 3, 22));

        let patient = seed_patient(&store, Some("hrt@example.com"));
        let hrt = Protocol {
            category: ProgramCategory::Hrt,
            ..weight_loss_protocol(&patient, ts(2026, 3, 1))
        };
        store.insert_protocol(&hrt).unwrap();
        assert!(matches!(
            seq.start_sequence(&hrt.id).await,
            Err(StartError::Rejected(StartRejection::NotWeightLoss))
        ));

        let emailless = seed_patient(&store, None);
        let no_email = weight_loss_protocol(&emailless, ts(2026, 3, 1));
        store.insert_protocol(&no_email).unwrap();
        assert!(matches!(
            seq.start_sequence(&no_email.id).await,
            Err(StartError::Rejected(StartRejection::NoEmail))
        ));

        let started = seed(&store, "started@example.com", ts(2026, 3, 1));
        store.append_log(&drip_log(&started, 0, date(2026, 3, 1))).unwrap();
        assert!(matches!(
            seq.start_sequence(&started.id).await,
            Err(StartError::Rejected(StartRejection::AlreadyStarted))
        ));

        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lifetime_one_sequence_per_patient() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let seq = sequencer(&store, &sender, date(2026, 3, 22));

        let patient = seed_patient(&store, Some("dana@example.com"));
        let earlier = weight_loss_protocol(&patient, ts(2025, 9, 1));
        let renewal = weight_loss_protocol(&patient, ts(2026, 3, 20));
        store.insert_protocol(&earlier).unwrap();
        store.insert_protocol(&renewal).unwrap();
        for step in 0..4 {
            store.append_log(&drip_log(&earlier, step, date(2025, 9, 1))).unwrap();
        }

        let result = seq.start_sequence(&renewal.id).await;
        assert!(matches!(
            result,
            Err(StartError::Rejected(StartRejection::AlreadyReceivedElsewhere))
        ));
        assert_eq!(sent_count(&store, &renewal), 0);
    }

    #[tokio::test]
    async fn manual_start_dispatch_failure_is_retryable() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let protocol = seed(&store, "dana@example.com", ts(2026, 3, 2));
        let seq = sequencer(&store, &sender, date(2026, 3, 22));

        sender.fail_for("dana@example.com");
        let err = seq.start_sequence(&protocol.id).await.unwrap_err();
        assert!(matches!(err, StartError::Drip(DripError::Dispatch(_))));

        let stored = store.get_protocol(&protocol.id).unwrap();
        assert_eq!(stored.drip_start_date, None);
        assert_eq!(sent_count(&store, &protocol), 0);
    }

    #[tokio::test]
    async fn unknown_protocol_start_is_not_found() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let seq = sequencer(&store, &sender, date(2026, 3, 22));
        let err = seq.start_sequence(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            StartError::Drip(DripError::Database(DatabaseError::NotFound { .. }))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn progress_is_monotonic_and_bounded(
            steps in proptest::collection::vec((0i64..3, any::<bool>()), 1..12),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let store = Arc::new(SqliteStore::open_in_memory().unwrap());
                let sender = Arc::new(RecordingSender::default());
                let created = ts(2026, 3, 2);
                let protocol = seed(&store, "dana@example.com", created);
                let seq = sequencer(&store, &sender, date(2026, 3, 2));

                let mut day = date(2026, 3, 2);
                let mut previous = 0;
                for (advance, fail) in steps {
                    day = add_days(day, advance).unwrap();
                    if fail {
                        sender.fail_for("dana@example.com");
                    } else {
                        sender.heal();
                    }
                    let report = seq.run_tick(Some(day)).await.unwrap();
                    let count = sent_count(&store, &protocol);
                    prop_assert!(count >= previous);
                    prop_assert!(count <= previous + 1);
                    prop_assert!(count <= 4);

                    let anchor = created.date_naive();
                    if let Some(StepOutcome::Sent { step_number, .. }) =
                        report.results.first().map(|r| &r.outcome)
                    {
                        let elapsed = (day - anchor).num_days();
                        prop_assert!(elapsed >= i64::from(*step_number));
                    }
                    previous = count;
                }

                let logs = store.query_logs(&protocol.id, Some(LogKind::DripEmail)).unwrap();
                let mut steps_seen: Vec<u8> = logs
                    .iter()
                    .filter_map(|l| match l.payload {
                        LogPayload::DripEmail { step_number, .. } => Some(step_number),
                        _ => None,
                    })
                    .collect();
                steps_seen.sort_unstable();
                let expected: Vec<u8> = (0..steps_seen.len() as u8).collect();
                prop_assert_eq!(steps_seen, expected);
                Ok(())
            })?;
        }
    }

    #[test]
    fn anchor_uses_practice_local_creation_date() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let seq = sequencer(&store, &sender, date(2026, 3, 3));
        let patient = seed_patient(&store, Some("dana@example.com"));

        // 03:00 UTC on March 3rd is the evening of March 2nd in Los Angeles.
        let created = ts(2026, 3, 3) - ChronoDuration::hours(15);
        let protocol = weight_loss_protocol(&patient, created);
        assert_eq!(seq.anchor_date(&protocol), date(2026, 3, 2));

        let manual = Protocol {
            drip_start_date: Some(date(2026, 3, 20)),
            ..protocol
        };
        assert_eq!(seq.anchor_date(&manual), date(2026, 3, 20));
    }
}
