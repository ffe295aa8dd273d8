//! Trial coordinator
//!
//! Drives one trial at a time against a subject registry and an experiment store:
//! start → record → finish → persist. Use this when a host needs the whole flow;
//! [`TrialSession`] alone is enough for hosts that persist trials themselves.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{StudyConfig, VocabularyPolicy};
use crate::error::TrialError;
use crate::store::{AnimalLookup, ExperimentStore};
use crate::trial::clock::{Clock, MonotonicClock};
use crate::trial::session::TrialSession;
use crate::types::{StoredTrial, TrialId, TrialRecord, TrialStatus};

/// Stateful trial driver bound to a store
pub struct Laboratory<S> {
    store: S,
    vocabulary: VocabularyPolicy,
    tick_interval: Duration,
    clock: Arc<dyn Clock>,
    active: Option<TrialSession>,
    last_finished: Option<TrialRecord>,
}

impl<S> Laboratory<S>
where
    S: AnimalLookup + ExperimentStore,
{
    /// Create a laboratory with the given store and study settings
    pub fn new(store: S, config: &StudyConfig) -> Self {
        Self {
            store,
            vocabulary: config.vocabulary(),
            tick_interval: config.tick_interval(),
            clock: Arc::new(MonotonicClock),
            active: None,
            last_finished: None,
        }
    }

    /// Replace the time source for future trials
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a trial. Fails if one is already running.
    pub fn start_trial(
        &mut self,
        subject_id: &str,
        date: &str,
        attempt: &str,
    ) -> Result<(), TrialError> {
        if self.active.is_some() {
            return Err(TrialError::InvalidSessionState {
                operation: "start",
                status: TrialStatus::Running,
            });
        }

        let mut session = TrialSession::with_clock(Arc::clone(&self.clock))
            .with_tick_interval(self.tick_interval);
        session.start(&self.store, subject_id, date, attempt)?;
        self.active = Some(session);
        Ok(())
    }

    /// Record a behavior in the running trial
    pub fn record(&mut self, label: &str) -> Result<Duration, TrialError> {
        let session = self.active.as_mut().ok_or(TrialError::InvalidSessionState {
            operation: "record an event",
            status: TrialStatus::Idle,
        })?;

        if !self.vocabulary.allows(label) {
            warn!(label, "label rejected by study vocabulary");
            return Err(TrialError::ValidationError(format!(
                "'{}' is not in the study vocabulary",
                label
            )));
        }

        session.record_event(label)
    }

    /// Finish the running trial and persist it
    ///
    /// If the store rejects the record, the error is returned and the record stays
    /// available from [`last_finished`](Self::last_finished) for a later
    /// [`persist`](Self::persist).
    pub fn finish_trial(&mut self) -> Result<(TrialId, TrialRecord), TrialError> {
        let mut session = self.active.take().ok_or(TrialError::InvalidSessionState {
            operation: "finish",
            status: TrialStatus::Idle,
        })?;

        let record = session.finish()?;
        self.last_finished = Some(record.clone());
        let id = self.persist(&record)?;
        Ok((id, record))
    }

    /// Save a finished record
    pub fn persist(&mut self, record: &TrialRecord) -> Result<TrialId, TrialError> {
        let id = self.store.save_trial(record)?;
        info!(trial_id = %id, subject_id = %record.subject_id, "trial persisted");
        Ok(id)
    }

    /// Drop the running trial without saving. Returns whether one was running.
    pub fn abandon_trial(&mut self) -> bool {
        match self.active.take() {
            Some(session) => {
                session.abandon();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// The running session, if any
    pub fn active(&self) -> Option<&TrialSession> {
        self.active.as_ref()
    }

    /// Most recently finished record
    pub fn last_finished(&self) -> Option<&TrialRecord> {
        self.last_finished.as_ref()
    }

    /// Elapsed time of the running trial, as last published by the display ticker,
    /// falling back to a direct clock read
    pub fn elapsed(&self) -> Option<Duration> {
        let session = self.active.as_ref()?;
        session.display_elapsed().or_else(|| session.elapsed())
    }

    pub fn subscribe_elapsed(&self) -> Option<watch::Receiver<Duration>> {
        self.active.as_ref()?.subscribe_elapsed()
    }

    /// All stored trials
    pub fn history(&self) -> Result<Vec<StoredTrial>, TrialError> {
        Ok(self.store.list_trials()?)
    }

    /// One stored trial
    pub fn trial(&self, id: TrialId) -> Result<Option<StoredTrial>, TrialError> {
        Ok(self.store.get_trial(id)?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
