//! In-memory store
//!
//! Keeps subjects and trials in insertion order. The whole store serializes to JSON
//! so embedded hosts can persist it however they like.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{AnimalLookup, ExperimentStore, SubjectRegistry};
use crate::types::{StoredTrial, Subject, TrialId, TrialRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrialRow {
    id: TrialId,
    record: TrialRecord,
}

/// Subject registry and trial store held in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    subjects: Vec<Subject>,
    trials: Vec<TrialRow>,
    /// Last assigned trial id
    last_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with subjects
    pub fn with_subjects(subjects: impl IntoIterator<Item = Subject>) -> Self {
        Self {
            subjects: subjects.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    /// Load store state from JSON
    ///
    /// The id counter resumes after the highest stored trial id even if the saved
    /// counter is behind.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut store: Self = serde_json::from_str(json)?;
        let max_id = store.trials.iter().map(|t| t.id.0).max().unwrap_or(0);
        store.last_id = store.last_id.max(max_id);
        Ok(store)
    }

    /// Serialize store state to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn species_of(&self, subject_id: &str) -> Option<String> {
        self.subjects
            .iter()
            .find(|s| s.id == subject_id)
            .map(|s| s.species.clone())
    }

    fn joined(&self, row: &TrialRow) -> StoredTrial {
        StoredTrial {
            id: row.id,
            record: row.record.clone(),
            species: self.species_of(&row.record.subject_id),
        }
    }
}

impl AnimalLookup for MemoryStore {
    fn get_subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
        Ok(self.subjects.iter().find(|s| s.id == id).cloned())
    }
}

impl SubjectRegistry for MemoryStore {
    fn add_subject(&mut self, subject: &Subject) -> Result<(), StoreError> {
        if self.subjects.iter().any(|s| s.id == subject.id) {
            return Err(StoreError::DuplicateSubject(subject.id.clone()));
        }
        self.subjects.push(subject.clone());
        Ok(())
    }

    fn update_subject(&mut self, subject: &Subject) -> Result<(), StoreError> {
        let existing = self
            .subjects
            .iter_mut()
            .find(|s| s.id == subject.id)
            .ok_or_else(|| StoreError::SubjectMissing(subject.id.clone()))?;
        *existing = subject.clone();
        Ok(())
    }

    fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        Ok(self.subjects.clone())
    }
}

impl ExperimentStore for MemoryStore {
    fn save_trial(&mut self, record: &TrialRecord) -> Result<TrialId, StoreError> {
        self.last_id += 1;
        let id = TrialId(self.last_id);
        self.trials.push(TrialRow {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn list_trials(&self) -> Result<Vec<StoredTrial>, StoreError> {
        Ok(self.trials.iter().map(|row| self.joined(row)).collect())
    }

    fn get_trial(&self, id: TrialId) -> Result<Option<StoredTrial>, StoreError> {
        Ok(self
            .trials
            .iter()
            .find(|row| row.id == id)
            .map(|row| self.joined(row)))
    }
}
