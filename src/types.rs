//! Core types for RatRopy trials
//!
//! Subjects, recorded events and finished trial records. These are the values that
//! flow between the trial session, the entropy engine and the external stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::TrialError;

const SECS_PER_DAY: u64 = 86_400;

/// Animal subject referenced by a trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Registry identifier (accession number)
    pub id: String,
    /// Species or strain
    pub species: String,
    /// Age, free-form (e.g. "12 weeks")
    #[serde(default)]
    pub age: String,
    /// Weight, free-form (e.g. "240 g")
    #[serde(default)]
    pub weight: String,
    /// Additional notes
    #[serde(default)]
    pub notes: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, species: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            species: species.into(),
            age: String::new(),
            weight: String::new(),
            notes: String::new(),
        }
    }
}

/// Lifecycle state of a trial session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Idle,
    Running,
    Finished,
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrialStatus::Idle => "idle",
            TrialStatus::Running => "running",
            TrialStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// A single behavioral observation
///
/// Persisted as an `[elapsed, label]` pair where `elapsed` uses the `H:MM:SS`
/// clock format (see [`format_elapsed`]). Sub-second precision is not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(String, String)", try_from = "(String, String)")]
pub struct EventRecord {
    /// Time since the session started
    pub elapsed: Duration,
    /// Behavior label, opaque to the engine
    pub label: String,
}

impl EventRecord {
    pub fn new(elapsed: Duration, label: impl Into<String>) -> Self {
        Self {
            elapsed,
            label: label.into(),
        }
    }

    /// Elapsed time in the persisted clock format
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

impl From<EventRecord> for (String, String) {
    fn from(event: EventRecord) -> Self {
        (format_elapsed(event.elapsed), event.label)
    }
}

impl TryFrom<(String, String)> for EventRecord {
    type Error = String;

    fn try_from((elapsed, label): (String, String)) -> Result<Self, Self::Error> {
        Ok(Self {
            elapsed: parse_elapsed(&elapsed)?,
            label,
        })
    }
}

/// Ordered, append-only log of observations
///
/// Elapsed values are non-decreasing in sequence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EventRecord>", into = "Vec<EventRecord>")]
pub struct EventSequence {
    events: Vec<EventRecord>,
}

impl EventSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation, rejecting elapsed values that go backwards
    pub fn push(&mut self, elapsed: Duration, label: impl Into<String>) -> Result<(), TrialError> {
        if let Some(last) = self.last_elapsed() {
            if elapsed < last {
                return Err(TrialError::ValidationError(format!(
                    "elapsed {:?} precedes previous event at {:?}",
                    elapsed, last
                )));
            }
        }
        self.events.push(EventRecord::new(elapsed, label));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRecord> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[EventRecord] {
        &self.events
    }

    /// Labels in recording order
    pub fn labels(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn last_elapsed(&self) -> Option<Duration> {
        self.events.last().map(|e| e.elapsed)
    }
}

impl TryFrom<Vec<EventRecord>> for EventSequence {
    type Error = String;

    fn try_from(events: Vec<EventRecord>) -> Result<Self, Self::Error> {
        if let Some(i) = events.windows(2).position(|w| w[1].elapsed < w[0].elapsed) {
            return Err(format!("event {} is earlier than event {}", i + 1, i));
        }
        Ok(Self { events })
    }
}

impl From<EventSequence> for Vec<EventRecord> {
    fn from(seq: EventSequence) -> Self {
        seq.events
    }
}

impl<'a> IntoIterator for &'a EventSequence {
    type Item = &'a EventRecord;
    type IntoIter = std::slice::Iter<'a, EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// A finished trial, ready to be persisted or reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Subject identifier
    pub subject_id: String,
    /// Trial date, free-form
    pub date: String,
    /// Attempt label (e.g. "1", "retest")
    pub attempt: String,
    /// Observations in recording order
    pub events: EventSequence,
    /// Sequence entropy score
    pub entropy: f64,
}

/// Store-assigned trial identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(pub i64);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted trial joined with the subject's species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrial {
    pub id: TrialId,
    #[serde(flatten)]
    pub record: TrialRecord,
    /// Species of the subject, absent if the subject is no longer registered
    pub species: Option<String>,
}

/// Format a duration as `H:MM:SS`, truncating to whole seconds.
///
/// Durations of a day or more are prefixed with the day count:
/// `1 day, 0:00:03`, `2 days, 3:04:05`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / SECS_PER_DAY;
    let rem = total % SECS_PER_DAY;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        d => format!("{} days, {}", d, clock),
    }
}

/// Parse the output of [`format_elapsed`] back into a duration
pub fn parse_elapsed(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (days, clock) = match s.split_once(", ") {
        Some((day_part, clock)) => {
            let count = day_part
                .strip_suffix(" days")
                .or_else(|| day_part.strip_suffix(" day"))
                .ok_or_else(|| format!("invalid day component in elapsed '{}'", s))?;
            let days: u64 = count
                .parse()
                .map_err(|_| format!("invalid day count in elapsed '{}'", s))?;
            (days, clock)
        }
        None => (0, s),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("expected H:MM:SS, got '{}'", s));
    }
    let hours: u64 = parts[0]
        .parse()
        .map_err(|_| format!("invalid hours in elapsed '{}'", s))?;
    let minutes: u64 = parts[1]
        .parse()
        .map_err(|_| format!("invalid minutes in elapsed '{}'", s))?;
    let seconds: f64 = parts[2]
        .parse()
        .map_err(|_| format!("invalid seconds in elapsed '{}'", s))?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(format!("out-of-range clock value in elapsed '{}'", s));
    }

    let whole = days
        .checked_mul(SECS_PER_DAY)
        .and_then(|d| hours.checked_mul(3600).and_then(|h| d.checked_add(h)))
        .and_then(|dh| dh.checked_add(minutes * 60))
        .ok_or_else(|| format!("elapsed '{}' out of range", s))?;
    Duration::from_secs(whole)
        .checked_add(Duration::from_secs_f64(seconds))
        .ok_or_else(|| format!("elapsed '{}' out of range", s))
}
