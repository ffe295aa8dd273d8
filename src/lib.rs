//! RatRopy - behavioral entropy scoring for rodent open-field trials
//!
//! An observer records discrete behaviors while a trial runs; each is timestamped
//! against a monotonic clock. Finishing the trial scores the sequence with a
//! first- through third-order Shannon entropy measure and persists it alongside the
//! subject's record.
//!
//! ## Modules
//!
//! - **Entropy**: deterministic H1 + H2 + H3 scoring of any label sequence
//! - **Trial**: the Idle → Running → Finished session state machine and its display ticker
//! - **Store**: subject registry and experiment storage (in-memory or SQLite)
//! - **Report**: text and JSON trial reports

pub mod config;
pub mod entropy;
pub mod error;
pub mod report;
pub mod store;
pub mod trial;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{ReportFormat, StudyConfig, VocabularyPolicy};
pub use entropy::{EntropyBreakdown, EntropyEngine};
pub use error::{ConfigError, StoreError, TrialError};
pub use store::{AnimalLookup, ExperimentStore, MemoryStore, SqliteStore, SubjectRegistry};
pub use trial::{Clock, ElapsedTicker, Laboratory, ManualClock, MonotonicClock, TrialSession};
pub use types::{
    EventRecord, EventSequence, StoredTrial, Subject, TrialId, TrialRecord, TrialStatus,
};

/// RatRopy version embedded in reports
pub const RATROPY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for JSON reports
pub const PRODUCER_NAME: &str = "ratropy";
