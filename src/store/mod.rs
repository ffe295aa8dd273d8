//! Subject registry and trial persistence
//!
//! The trial core only sees the [`AnimalLookup`] and [`ExperimentStore`] traits. Two
//! implementations ship with the crate: [`MemoryStore`] (JSON-serializable, used in
//! tests and embedded hosts) and [`SqliteStore`] (the on-disk database).

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::{StoredTrial, Subject, TrialId, TrialRecord};

/// Read-only access to registered subjects
pub trait AnimalLookup {
    /// Look up a subject by id; `Ok(None)` when not registered
    fn get_subject(&self, id: &str) -> Result<Option<Subject>, StoreError>;
}

/// Subject registry maintenance
pub trait SubjectRegistry: AnimalLookup {
    /// Register a new subject. Fails if the id is already taken.
    fn add_subject(&mut self, subject: &Subject) -> Result<(), StoreError>;

    /// Replace the species/age/weight/notes of an existing subject
    fn update_subject(&mut self, subject: &Subject) -> Result<(), StoreError>;

    /// All subjects in registration order
    fn list_subjects(&self) -> Result<Vec<Subject>, StoreError>;
}

/// Persistence for finished trials
pub trait ExperimentStore {
    /// Persist a finished trial and return its new id
    fn save_trial(&mut self, record: &TrialRecord) -> Result<TrialId, StoreError>;

    /// All trials in id order, joined with the subject's species
    fn list_trials(&self) -> Result<Vec<StoredTrial>, StoreError>;

    /// A single trial; `Ok(None)` when the id is unknown
    fn get_trial(&self, id: TrialId) -> Result<Option<StoredTrial>, StoreError>;
}
