//! Trial session state machine
//!
//! ```text
//! Idle --start--> Running --finish--> Finished
//! ```
//!
//! `Finished` is terminal. Operations called in the wrong state fail with
//! [`TrialError::InvalidSessionState`] and leave the session untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::DEFAULT_TICK_INTERVAL_MS;
use crate::entropy::EntropyEngine;
use crate::error::TrialError;
use crate::store::AnimalLookup;
use crate::trial::clock::{Clock, MonotonicClock};
use crate::trial::ticker::ElapsedTicker;
use crate::types::{EventSequence, TrialRecord, TrialStatus};

/// One timed observation run for one subject
pub struct TrialSession {
    subject_id: String,
    date: String,
    attempt: String,
    events: EventSequence,
    entropy: Option<f64>,
    status: TrialStatus,
    started_at: Option<Instant>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    ticker: Option<ElapsedTicker>,
}

impl Default for TrialSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialSession")
            .field("subject_id", &self.subject_id)
            .field("date", &self.date)
            .field("attempt", &self.attempt)
            .field("events", &self.events.len())
            .field("entropy", &self.entropy)
            .field("status", &self.status)
            .field("ticking", &self.ticker.is_some())
            .finish()
    }
}

impl TrialSession {
    /// Create an idle session on the process monotonic clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock))
    }

    /// Create an idle session on a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            subject_id: String::new(),
            date: String::new(),
            attempt: String::new(),
            events: EventSequence::new(),
            entropy: None,
            status: TrialStatus::Idle,
            started_at: None,
            clock,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            ticker: None,
        }
    }

    /// Set the display ticker interval used by [`start`](Self::start)
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Begin the trial for a registered subject
    pub fn start<L: AnimalLookup + ?Sized>(
        &mut self,
        lookup: &L,
        subject_id: &str,
        date: &str,
        attempt: &str,
    ) -> Result<(), TrialError> {
        self.require(TrialStatus::Idle, "start")?;

        if lookup.get_subject(subject_id)?.is_none() {
            return Err(TrialError::SubjectNotFound(subject_id.to_string()));
        }

        let started_at = self.clock.now();
        self.subject_id = subject_id.to_string();
        self.date = date.to_string();
        self.attempt = attempt.to_string();
        self.events = EventSequence::new();
        self.entropy = None;
        self.started_at = Some(started_at);
        self.status = TrialStatus::Running;
        self.ticker = ElapsedTicker::spawn(started_at, Arc::clone(&self.clock), self.tick_interval);

        info!(subject_id, date, attempt, "trial started");
        Ok(())
    }

    /// Record a behavior at the current elapsed time. Returns the elapsed time.
    pub fn record_event(&mut self, label: impl Into<String>) -> Result<Duration, TrialError> {
        let started_at = self.running_since("record an event")?;
        let label = label.into();
        let elapsed = self.clock.now().saturating_duration_since(started_at);

        self.events.push(elapsed, label.as_str())?;
        debug!(label = %label, elapsed_ms = elapsed.as_millis() as u64, count = self.events.len(), "event recorded");
        Ok(elapsed)
    }

    /// Close the trial, compute its entropy and stop the display ticker
    pub fn finish(&mut self) -> Result<TrialRecord, TrialError> {
        self.running_since("finish")?;

        let entropy = EntropyEngine::compute(&self.events.labels());
        self.entropy = Some(entropy);
        self.status = TrialStatus::Finished;
        self.ticker = None;

        info!(
            subject_id = %self.subject_id,
            events = self.events.len(),
            entropy,
            "trial finished"
        );

        Ok(TrialRecord {
            subject_id: self.subject_id.clone(),
            date: self.date.clone(),
            attempt: self.attempt.clone(),
            events: self.events.clone(),
            entropy,
        })
    }

    /// Discard the session without finishing it
    pub fn abandon(mut self) {
        if self.status == TrialStatus::Running {
            info!(
                subject_id = %self.subject_id,
                events = self.events.len(),
                "trial abandoned"
            );
        }
        self.ticker = None;
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn attempt(&self) -> &str {
        &self.attempt
    }

    pub fn events(&self) -> &EventSequence {
        &self.events
    }

    /// Entropy score, present once finished
    pub fn entropy(&self) -> Option<f64> {
        self.entropy
    }

    /// Elapsed time read directly from the clock while running
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.status, self.started_at) {
            (TrialStatus::Running, Some(started_at)) => {
                Some(self.clock.now().saturating_duration_since(started_at))
            }
            _ => None,
        }
    }

    /// Latest value published by the display ticker
    pub fn display_elapsed(&self) -> Option<Duration> {
        self.ticker.as_ref().map(ElapsedTicker::latest)
    }

    /// Subscribe to display ticker updates
    pub fn subscribe_elapsed(&self) -> Option<watch::Receiver<Duration>> {
        self.ticker.as_ref().map(ElapsedTicker::subscribe)
    }

    fn require(&self, expected: TrialStatus, operation: &'static str) -> Result<(), TrialError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TrialError::InvalidSessionState {
                operation,
                status: self.status,
            })
        }
    }

    fn running_since(&self, operation: &'static str) -> Result<Instant, TrialError> {
        match (self.status, self.started_at) {
            (TrialStatus::Running, Some(started_at)) => Ok(started_at),
            (status, _) => Err(TrialError::InvalidSessionState { operation, status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::trial::clock::ManualClock;
    use crate::types::Subject;
    use pretty_assertions::assert_eq;

    fn registry() -> MemoryStore {
        MemoryStore::with_subjects([Subject::new("R-1", "Wistar rat")])
    }

    fn session_on(clock: &ManualClock) -> TrialSession {
        TrialSession::with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = TrialSession::new();
        assert_eq!(session.status(), TrialStatus::Idle);
        assert!(session.events().is_empty());
        assert_eq!(session.entropy(), None);
        assert_eq!(session.elapsed(), None);
    }

    #[test]
    fn test_start_unknown_subject() {
        let mut session = TrialSession::new();
        let err = session
            .start(&registry(), "R-404", "2024-05-02", "1")
            .unwrap_err();

        assert!(matches!(err, TrialError::SubjectNotFound(ref id) if id == "R-404"));
        assert_eq!(session.status(), TrialStatus::Idle);
        assert_eq!(session.subject_id(), "");
    }

    #[test]
    fn test_full_lifecycle() {
        let clock = ManualClock::new();
        let mut session = session_on(&clock);
        session.start(&registry(), "R-1", "2024-05-02 09:30", "1").unwrap();
        assert_eq!(session.status(), TrialStatus::Running);

        clock.advance(Duration::from_secs(3));
        assert_eq!(session.record_event("sniffing").unwrap(), Duration::from_secs(3));
        clock.advance(Duration::from_millis(4_200));
        assert_eq!(
            session.record_event("grooming").unwrap(),
            Duration::from_millis(7_200)
        );

        let record = session.finish().unwrap();
        assert_eq!(session.status(), TrialStatus::Finished);
        assert_eq!(record.subject_id, "R-1");
        assert_eq!(record.date, "2024-05-02 09:30");
        assert_eq!(record.attempt, "1");
        assert_eq!(record.events.labels(), vec!["sniffing", "grooming"]);
        assert_eq!(record.events.as_slice()[1].elapsed_display(), "0:00:07");
        assert_eq!(record.entropy, EntropyEngine::compute(&["sniffing", "grooming"]));
        assert_eq!(session.entropy(), Some(record.entropy));
    }

    #[test]
    fn test_finish_without_events() {
        let mut session = TrialSession::new();
        session.start(&registry(), "R-1", "d", "1").unwrap();
        let record = session.finish().unwrap();
        assert!(record.events.is_empty());
        assert_eq!(record.entropy, 0.0);
    }

    #[test]
    fn test_idle_session_rejects_operations() {
        let mut session = TrialSession::new();

        assert!(matches!(
            session.record_event("grooming"),
            Err(TrialError::InvalidSessionState {
                status: TrialStatus::Idle,
                ..
            })
        ));
        assert!(matches!(
            session.finish(),
            Err(TrialError::InvalidSessionState {
                status: TrialStatus::Idle,
                ..
            })
        ));
        assert_eq!(session.status(), TrialStatus::Idle);
        assert!(session.events().is_empty());
    }

    #[test]
    fn test_finished_session_is_frozen() {
        let mut session = TrialSession::new();
        session.start(&registry(), "R-1", "d", "1").unwrap();
        session.record_event("freezing").unwrap();
        let record = session.finish().unwrap();

        assert!(matches!(
            session.record_event("grooming"),
            Err(TrialError::InvalidSessionState {
                status: TrialStatus::Finished,
                ..
            })
        ));
        assert!(matches!(
            session.finish(),
            Err(TrialError::InvalidSessionState { .. })
        ));
        assert!(matches!(
            session.start(&registry(), "R-1", "d", "2"),
            Err(TrialError::InvalidSessionState { .. })
        ));

        assert_eq!(session.events(), &record.events);
        assert_eq!(session.entropy(), Some(record.entropy));
        assert_eq!(session.attempt(), "1");
    }

    #[test]
    fn test_running_session_rejects_second_start() {
        let mut session = TrialSession::new();
        session.start(&registry(), "R-1", "d", "1").unwrap();
        let err = session.start(&registry(), "R-1", "d", "2").unwrap_err();

        assert!(matches!(
            err,
            TrialError::InvalidSessionState {
                operation: "start",
                status: TrialStatus::Running
            }
        ));
        assert_eq!(session.attempt(), "1");
    }

    #[test]
    fn test_no_ticker_without_runtime() {
        let mut session = TrialSession::new();
        session.start(&registry(), "R-1", "d", "1").unwrap();
        assert!(session.subscribe_elapsed().is_none());
        assert!(session.display_elapsed().is_none());
        assert!(session.elapsed().is_some());
    }

    #[tokio::test]
    async fn test_ticker_runs_while_running() {
        let clock = ManualClock::new();
        let mut session = session_on(&clock).with_tick_interval(Duration::from_millis(5));
        session.start(&registry(), "R-1", "d", "1").unwrap();
        clock.advance(Duration::from_secs(12));

        let mut rx = session.subscribe_elapsed().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Duration::from_secs(12));
        // display refresh never touches the event log
        assert!(session.events().is_empty());
    }

    async fn assert_ticker_stops(mut rx: watch::Receiver<Duration>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.changed().await.is_ok() {}
        })
        .await
        .expect("ticker outlived its session");
    }

    #[tokio::test]
    async fn test_finish_stops_ticker() {
        let mut session = TrialSession::new().with_tick_interval(Duration::from_millis(5));
        session.start(&registry(), "R-1", "d", "1").unwrap();
        let rx = session.subscribe_elapsed().unwrap();

        session.finish().unwrap();
        assert!(session.subscribe_elapsed().is_none());
        assert_ticker_stops(rx).await;
    }

    #[tokio::test]
    async fn test_drop_stops_ticker() {
        let mut session = TrialSession::new().with_tick_interval(Duration::from_millis(5));
        session.start(&registry(), "R-1", "d", "1").unwrap();
        let rx = session.subscribe_elapsed().unwrap();

        drop(session);
        assert_ticker_stops(rx).await;
    }

    #[tokio::test]
    async fn test_abandon_stops_ticker() {
        let mut session = TrialSession::new().with_tick_interval(Duration::from_millis(5));
        session.start(&registry(), "R-1", "d", "1").unwrap();
        session.record_event("grooming").unwrap();
        let rx = session.subscribe_elapsed().unwrap();

        session.abandon();
        assert_ticker_stops(rx).await;
    }
}
