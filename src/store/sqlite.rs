//! SQLite-backed store
//!
//! Two tables: `animals` (the subject registry) and `experiments` (finished trials).
//! Trial events are stored as a JSON array of `[elapsed, label]` pairs.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{AnimalLookup, ExperimentStore, SubjectRegistry};
use crate::types::{EventSequence, StoredTrial, Subject, TrialId, TrialRecord};

// Trials may reference subjects that were never registered (or were removed), so
// the animal_id reference is documentary only.
const SCHEMA: &str = "
    PRAGMA foreign_keys = OFF;
    CREATE TABLE IF NOT EXISTS animals (
        id TEXT PRIMARY KEY,
        species TEXT,
        age TEXT,
        weight TEXT,
        info TEXT
    );
    CREATE TABLE IF NOT EXISTS experiments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        animal_id TEXT,
        date TEXT,
        attempt TEXT,
        events TEXT,
        entropy REAL,
        FOREIGN KEY (animal_id) REFERENCES animals (id)
    );
";

const SELECT_TRIALS: &str = "
    SELECT experiments.id, experiments.animal_id, experiments.date, experiments.attempt,
           experiments.events, experiments.entropy, animals.species
    FROM experiments
    LEFT JOIN animals ON experiments.animal_id = animals.id
";

/// Raw `experiments` row before the events column is decoded
struct TrialRow {
    id: i64,
    subject_id: String,
    date: String,
    attempt: String,
    events: String,
    entropy: f64,
    species: Option<String>,
}

impl TrialRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            date: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            attempt: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            events: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "[]".to_string()),
            entropy: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
            species: row.get(6)?,
        })
    }

    fn decode(self) -> Result<StoredTrial, StoreError> {
        let events: EventSequence =
            serde_json::from_str(&self.events).map_err(|e| StoreError::Corrupt {
                id: self.id,
                reason: format!("events column: {}", e),
            })?;
        Ok(StoredTrial {
            id: TrialId(self.id),
            record: TrialRecord {
                subject_id: self.subject_id,
                date: self.date,
                attempt: self.attempt,
                events,
                entropy: self.entropy,
            },
            species: self.species,
        })
    }
}

/// Subject registry and trial store in a SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!(path = %path.display(), "opening trial database");
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init()?;
        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Number of stored trials
    pub fn trial_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM experiments", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl AnimalLookup for SqliteStore {
    fn get_subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
        let subject = self
            .conn
            .query_row(
                "SELECT id, species, age, weight, info FROM animals WHERE id = ?1",
                params![id],
                subject_from_row,
            )
            .optional()?;
        Ok(subject)
    }
}

impl SubjectRegistry for SqliteStore {
    fn add_subject(&mut self, subject: &Subject) -> Result<(), StoreError> {
        if self.get_subject(&subject.id)?.is_some() {
            return Err(StoreError::DuplicateSubject(subject.id.clone()));
        }
        self.conn.execute(
            "INSERT INTO animals (id, species, age, weight, info) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                subject.id,
                subject.species,
                subject.age,
                subject.weight,
                subject.notes
            ],
        )?;
        Ok(())
    }

    fn update_subject(&mut self, subject: &Subject) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE animals SET species = ?1, age = ?2, weight = ?3, info = ?4 WHERE id = ?5",
            params![
                subject.species,
                subject.age,
                subject.weight,
                subject.notes,
                subject.id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::SubjectMissing(subject.id.clone()));
        }
        Ok(())
    }

    fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, species, age, weight, info FROM animals ORDER BY rowid")?;
        let subjects = stmt
            .query_map([], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }
}

impl ExperimentStore for SqliteStore {
    fn save_trial(&mut self, record: &TrialRecord) -> Result<TrialId, StoreError> {
        let events = serde_json::to_string(&record.events)?;
        self.conn.execute(
            "INSERT INTO experiments (animal_id, date, attempt, events, entropy)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.subject_id,
                record.date,
                record.attempt,
                events,
                record.entropy
            ],
        )?;
        let id = TrialId(self.conn.last_insert_rowid());
        debug!(trial_id = %id, subject_id = %record.subject_id, "trial row inserted");
        Ok(id)
    }

    fn list_trials(&self) -> Result<Vec<StoredTrial>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY experiments.id", SELECT_TRIALS))?;
        let rows = stmt
            .query_map([], TrialRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TrialRow::decode).collect()
    }

    fn get_trial(&self, id: TrialId) -> Result<Option<StoredTrial>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE experiments.id = ?1", SELECT_TRIALS),
                params![id.0],
                TrialRow::from_row,
            )
            .optional()?;
        row.map(TrialRow::decode).transpose()
    }
}

fn subject_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        species: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        age: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        weight: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        notes: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn sample_record(subject_id: &str) -> TrialRecord {
        let mut events = EventSequence::new();
        events.push(Duration::from_secs(4), "sniffing").unwrap();
        events.push(Duration::from_secs(9), "central rearing").unwrap();
        events.push(Duration::from_secs(61), "grooming").unwrap();
        TrialRecord {
            subject_id: subject_id.to_string(),
            date: "2024-05-02 09:30".to_string(),
            attempt: "1".to_string(),
            events,
            entropy: 1.584962500721156,
        }
    }

    fn rat() -> Subject {
        Subject {
            id: "R-1".to_string(),
            species: "Wistar rat".to_string(),
            age: "10 weeks".to_string(),
            weight: "280 g".to_string(),
            notes: "left ear mark".to_string(),
        }
    }

    #[test]
    fn test_subject_crud() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.add_subject(&rat()).unwrap();
        assert!(matches!(
            store.add_subject(&rat()),
            Err(StoreError::DuplicateSubject(_))
        ));

        let mut updated = rat();
        updated.weight = "301 g".to_string();
        store.update_subject(&updated).unwrap();

        assert_eq!(store.get_subject("R-1").unwrap(), Some(updated.clone()));
        assert_eq!(store.list_subjects().unwrap(), vec![updated]);
        assert!(store.get_subject("nope").unwrap().is_none());
        assert!(matches!(
            store.update_subject(&Subject::new("nope", "mouse")),
            Err(StoreError::SubjectMissing(_))
        ));
    }

    #[test]
    fn test_trial_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.add_subject(&rat()).unwrap();

        let id = store.save_trial(&sample_record("R-1")).unwrap();
        let stored = store.get_trial(id).unwrap().unwrap();

        assert_eq!(stored.id, id);
        assert_eq!(stored.record, sample_record("R-1"));
        assert_eq!(stored.species.as_deref(), Some("Wistar rat"));
        assert_eq!(store.trial_count().unwrap(), 1);
    }

    #[test]
    fn test_events_column_format() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.save_trial(&sample_record("R-1")).unwrap();

        let raw: String = store
            .conn
            .query_row(
                "SELECT events FROM experiments WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            raw,
            r#"[["0:00:04","sniffing"],["0:00:09","central rearing"],["0:01:01","grooming"]]"#
        );
    }

    #[test]
    fn test_list_left_joins_missing_subject() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.add_subject(&rat()).unwrap();
        store.save_trial(&sample_record("R-1")).unwrap();
        store.save_trial(&sample_record("unregistered")).unwrap();

        let trials = store.list_trials().unwrap();
        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].id, TrialId(1));
        assert_eq!(trials[0].species.as_deref(), Some("Wistar rat"));
        assert_eq!(trials[1].species, None);
        assert!(store.get_trial(TrialId(42)).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_events_column() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO experiments (animal_id, date, attempt, events, entropy)
                 VALUES ('R-1', 'today', '1', 'not json', 0.0)",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.get_trial(TrialId(1)),
            Err(StoreError::Corrupt { id: 1, .. })
        ));
        // the store itself is still usable
        store.add_subject(&rat()).unwrap();
    }

    #[test]
    fn test_unregistered_subject_trial_is_saved() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let enforced: i64 = store
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enforced, 0);

        let id = store.save_trial(&sample_record("R-77")).unwrap();
        let stored = store.get_trial(id).unwrap().unwrap();
        assert_eq!(stored.record.subject_id, "R-77");
        assert_eq!(stored.species, None);

        // registering the subject later fills in the join
        store.add_subject(&Subject::new("R-77", "Long-Evans rat")).unwrap();
        let stored = store.get_trial(id).unwrap().unwrap();
        assert_eq!(stored.species.as_deref(), Some("Long-Evans rat"));
    }

    #[test]
    fn test_overflowing_elapsed_is_corrupt() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.add_subject(&rat()).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO experiments (animal_id, date, attempt, events, entropy)
                 VALUES ('R-1', 'today', '1', '[[\"18446744073709551615:00:00\",\"a\"]]', 0.0)",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.get_trial(TrialId(1)),
            Err(StoreError::Corrupt { id: 1, .. })
        ));
        assert!(matches!(
            store.list_trials(),
            Err(StoreError::Corrupt { id: 1, .. })
        ));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.add_subject(&rat()).unwrap();
            store.save_trial(&sample_record("R-1")).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_subjects().unwrap().len(), 1);
        assert_eq!(store.list_trials().unwrap().len(), 1);
    }
}
