//! Trial report rendering
//!
//! Renders a finished trial and its subject into a document. Two formats ship: a
//! plain-text sheet mirroring the paper protocol, and a structured JSON document.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::config::ReportFormat;
use crate::entropy::{EntropyBreakdown, EntropyEngine};
use crate::error::TrialError;
use crate::types::{EventRecord, Subject, TrialRecord};
use crate::{PRODUCER_NAME, RATROPY_VERSION};

/// Renders a trial report document
pub trait ReportExporter {
    /// File extension for rendered documents
    fn extension(&self) -> &'static str;

    /// Render the trial into document bytes
    fn render(&self, trial: &TrialRecord, subject: &Subject) -> Result<Vec<u8>, TrialError>;
}

/// Exporter for the given format
pub fn exporter_for(format: ReportFormat) -> Box<dyn ReportExporter> {
    match format {
        ReportFormat::Text => Box::new(TextReportExporter),
        ReportFormat::Json => Box::new(JsonReportExporter::new()),
    }
}

/// Default report file name: `report_{subject}_{date}.{ext}`, spaces in the date
/// replaced with underscores
pub fn report_filename(subject_id: &str, date: &str, extension: &str) -> String {
    format!("report_{}_{}.{}", subject_id, date.replace(' ', "_"), extension)
}

/// Render a report and write it to `path`
pub fn export_to_path(
    exporter: &dyn ReportExporter,
    trial: &TrialRecord,
    subject: &Subject,
    path: &Path,
) -> Result<(), TrialError> {
    let bytes = exporter.render(trial, subject)?;
    fs::write(path, bytes)
        .map_err(|e| TrialError::Export(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), subject_id = %subject.id, "report written");
    Ok(())
}

/// Plain-text report
pub struct TextReportExporter;

impl TextReportExporter {
    pub fn render_string(&self, trial: &TrialRecord, subject: &Subject) -> String {
        let mut out = String::new();
        out.push_str(&format!("Trial report - {}\n\n", trial.date));
        out.push_str("Subject\n");
        out.push_str(&format!("  Animal: {} ({})\n", subject.id, subject.species));
        out.push_str(&format!("  Age: {}, Weight: {}\n", subject.age, subject.weight));
        if !subject.notes.is_empty() {
            out.push_str(&format!("  Notes: {}\n", subject.notes));
        }
        out.push_str(&format!("  Attempt: {}\n\n", trial.attempt));
        out.push_str(&format!("Entropy: {:.4}\n\n", trial.entropy));
        out.push_str("Behavior history\n");
        if trial.events.is_empty() {
            out.push_str("  (no events recorded)\n");
        }
        for event in &trial.events {
            out.push_str(&format!("  {} - {}\n", event.elapsed_display(), event.label));
        }
        out
    }
}

impl ReportExporter for TextReportExporter {
    fn extension(&self) -> &'static str {
        ReportFormat::Text.extension()
    }

    fn render(&self, trial: &TrialRecord, subject: &Subject) -> Result<Vec<u8>, TrialError> {
        Ok(self.render_string(trial, subject).into_bytes())
    }
}

/// Producer metadata embedded in JSON reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Structured trial report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialReport {
    pub report_id: String,
    pub producer: ReportProducer,
    /// When the report was generated (RFC3339)
    pub generated_at_utc: String,
    pub subject: Subject,
    pub date: String,
    pub attempt: String,
    /// Score as stored with the trial
    pub entropy: f64,
    /// Score rounded for display
    pub entropy_display: String,
    /// Per-order terms recomputed from the events
    pub terms: EntropyBreakdown,
    pub events: Vec<EventRecord>,
}

/// JSON report
pub struct JsonReportExporter {
    instance_id: String,
}

impl Default for JsonReportExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonReportExporter {
    /// Create an exporter with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an exporter with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn build(&self, trial: &TrialRecord, subject: &Subject) -> TrialReport {
        TrialReport {
            report_id: Uuid::new_v4().to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: RATROPY_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            generated_at_utc: Utc::now().to_rfc3339(),
            subject: subject.clone(),
            date: trial.date.clone(),
            attempt: trial.attempt.clone(),
            entropy: trial.entropy,
            entropy_display: format!("{:.4}", trial.entropy),
            terms: EntropyEngine::breakdown(&trial.events.labels()),
            events: trial.events.as_slice().to_vec(),
        }
    }
}

impl ReportExporter for JsonReportExporter {
    fn extension(&self) -> &'static str {
        ReportFormat::Json.extension()
    }

    fn render(&self, trial: &TrialRecord, subject: &Subject) -> Result<Vec<u8>, TrialError> {
        serde_json::to_vec_pretty(&self.build(trial, subject))
            .map_err(|e| TrialError::Export(e.to_string()))
    }
}
