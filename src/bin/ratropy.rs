//! RatRopy CLI - Command-line interface for behavioral trials
//!
//! Commands:
//! - subject: Manage the subject registry
//! - trial: Record a trial interactively (labels or behavior numbers on stdin)
//! - entropy: Score a label sequence without recording it
//! - history: List stored trials
//! - report: Render a stored trial as a report
//! - config: Print the effective study configuration
//! - doctor: Diagnose configuration and database health

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ratropy::report::{exporter_for, export_to_path, report_filename, ReportExporter};
use ratropy::types::format_elapsed;
use ratropy::{
    AnimalLookup, ConfigError, EntropyEngine, ExperimentStore, Laboratory, ReportFormat,
    SqliteStore, StoreError, StudyConfig, Subject, SubjectRegistry, TrialError, TrialId,
    TrialRecord, PRODUCER_NAME, RATROPY_VERSION,
};

/// RatRopy - behavioral entropy scoring for open-field trials
#[derive(Parser)]
#[command(name = "ratropy")]
#[command(version = RATROPY_VERSION)]
#[command(about = "Record behavioral trials and score their entropy", long_about = None)]
struct Cli {
    /// Study configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config and RATROPY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the subject registry
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },

    /// Record a trial interactively
    ///
    /// Each stdin line is a behavior label or its number in the study vocabulary.
    /// `status` prints the elapsed time, `abandon` discards the trial, and `finish`
    /// (or end of input) scores and saves it. Prefix a line with `=` to record it
    /// verbatim, e.g. `=finish` or `=3`.
    Trial {
        /// Subject id
        subject: String,

        /// Trial date (defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Attempt identifier
        #[arg(long, default_value = "1")]
        attempt: String,

        /// Write a report to the working directory after saving
        #[arg(long)]
        report: bool,
    },

    /// Score a label sequence
    Entropy {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored trials
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a stored trial as a report
    Report {
        /// Trial id
        id: i64,

        /// Output file path (use - for stdout); defaults to report_{subject}_{date}.{ext}
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format (defaults to the configured format)
        #[arg(long)]
        format: Option<FormatArg>,
    },

    /// Print the effective study configuration
    Config,

    /// Diagnose configuration and database health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SubjectAction {
    /// Register a new subject
    Add {
        id: String,
        #[arg(long)]
        species: String,
        #[arg(long, default_value = "")]
        age: String,
        #[arg(long, default_value = "")]
        weight: String,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Update fields of an existing subject
    Update {
        id: String,
        #[arg(long)]
        species: Option<String>,
        #[arg(long)]
        age: Option<String>,
        #[arg(long)]
        weight: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// List registered subjects
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one subject as JSON
    Show { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Plain-text sheet
    Text,
    /// Structured JSON document
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ratropy=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), RatropyCliError> {
    let config = load_config(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Commands::Subject { action } => cmd_subject(&config, action),
        Commands::Trial {
            subject,
            date,
            attempt,
            report,
        } => cmd_trial(&config, &subject, date, &attempt, report),
        Commands::Entropy { input, json } => cmd_entropy(&input, json),
        Commands::History { json } => cmd_history(&config, json),
        Commands::Report { id, output, format } => {
            let format = format.map(ReportFormat::from).unwrap_or(config.report_format);
            cmd_report(&config, TrialId(id), output.as_deref(), format)
        }
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
        Commands::Doctor { json } => cmd_doctor(&config, cli.config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<StudyConfig, RatropyCliError> {
    let mut config = match path {
        Some(path) => StudyConfig::load(path)?,
        None => StudyConfig::default(),
    }
    .with_env_overrides();

    if let Some(db) = db {
        config.database_path = db;
    }
    Ok(config)
}

fn open_store(config: &StudyConfig) -> Result<SqliteStore, RatropyCliError> {
    Ok(SqliteStore::open(&config.database_path)?)
}

fn cmd_subject(config: &StudyConfig, action: SubjectAction) -> Result<(), RatropyCliError> {
    let mut store = open_store(config)?;

    match action {
        SubjectAction::Add {
            id,
            species,
            age,
            weight,
            notes,
        } => {
            let subject = Subject {
                id,
                species,
                age,
                weight,
                notes,
            };
            store.add_subject(&subject)?;
            println!("Registered {} ({})", subject.id, subject.species);
        }
        SubjectAction::Update {
            id,
            species,
            age,
            weight,
            notes,
        } => {
            let mut subject = store
                .get_subject(&id)?
                .ok_or_else(|| RatropyCliError::NotFound(format!("subject {}", id)))?;
            if let Some(species) = species {
                subject.species = species;
            }
            if let Some(age) = age {
                subject.age = age;
            }
            if let Some(weight) = weight {
                subject.weight = weight;
            }
            if let Some(notes) = notes {
                subject.notes = notes;
            }
            store.update_subject(&subject)?;
            println!("Updated {}", subject.id);
        }
        SubjectAction::List { json } => {
            let subjects = store.list_subjects()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
            } else if subjects.is_empty() {
                println!("No subjects registered");
            } else {
                for s in &subjects {
                    println!("{}\t{}\t{}\t{}", s.id, s.species, s.age, s.weight);
                }
            }
        }
        SubjectAction::Show { id } => {
            let subject = store
                .get_subject(&id)?
                .ok_or_else(|| RatropyCliError::NotFound(format!("subject {}", id)))?;
            println!("{}", serde_json::to_string_pretty(&subject)?);
        }
    }

    Ok(())
}

fn cmd_trial(
    config: &StudyConfig,
    subject_id: &str,
    date: Option<String>,
    attempt: &str,
    report: bool,
) -> Result<(), RatropyCliError> {
    // The display ticker needs a runtime to live on while stdin blocks this thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()?;
    let _guard = runtime.enter();

    let mut lab = Laboratory::new(open_store(config)?, config);
    let date = date.unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M").to_string());
    lab.start_trial(subject_id, &date, attempt)?;

    if atty::is(atty::Stream::Stdin) {
        print_vocabulary(config);
    }

    let mut stdout = io::stdout();
    for line in io::stdin().lock().lines() {
        match parse_trial_input(&line?, config) {
            TrialInput::Skip => continue,
            TrialInput::Finish => break,
            TrialInput::Abandon => {
                lab.abandon_trial();
                eprintln!("Trial abandoned");
                return Ok(());
            }
            TrialInput::Status => {
                let elapsed = lab.elapsed().unwrap_or_default();
                let count = lab.active().map(|s| s.events().len()).unwrap_or(0);
                eprintln!("{} elapsed, {} events", format_elapsed(elapsed), count);
            }
            TrialInput::Help => print_vocabulary(config),
            TrialInput::UnknownIndex(input) => {
                eprintln!("No behavior #{} in the study vocabulary", input);
            }
            TrialInput::Record(label) => match lab.record(&label) {
                Ok(elapsed) => {
                    writeln!(stdout, "{} {}", format_elapsed(elapsed), label)?;
                    stdout.flush()?;
                }
                Err(TrialError::ValidationError(msg)) => eprintln!("{}", msg),
                Err(e) => return Err(e.into()),
            },
        }
    }

    let (id, record) = match lab.finish_trial() {
        Ok(saved) => saved,
        Err(e) => {
            // Keep the observation even when the database refuses it
            if let Some(record) = lab.last_finished() {
                println!("{}", serde_json::to_string(record)?);
            }
            return Err(e.into());
        }
    };

    println!(
        "Trial #{} saved: {} events, entropy {:.4}",
        id,
        record.events.len(),
        record.entropy
    );

    if report {
        let subject = lab
            .store()
            .get_subject(&record.subject_id)?
            .ok_or_else(|| RatropyCliError::NotFound(format!("subject {}", record.subject_id)))?;
        write_report(config.report_format, &record, &subject, None)?;
    }

    Ok(())
}

/// One line of observer input during a trial
#[derive(Debug, PartialEq)]
enum TrialInput {
    Skip,
    Finish,
    Abandon,
    Status,
    Help,
    Record(String),
    /// A number with no behavior at that position
    UnknownIndex(String),
}

/// Interpret a prompt line. A leading `=` bypasses commands and numbering.
fn parse_trial_input(line: &str, config: &StudyConfig) -> TrialInput {
    let input = line.trim();
    if let Some(literal) = input.strip_prefix('=') {
        let literal = literal.trim();
        return if literal.is_empty() {
            TrialInput::Skip
        } else {
            TrialInput::Record(literal.to_string())
        };
    }

    match input {
        "" => TrialInput::Skip,
        "finish" | "done" => TrialInput::Finish,
        "abandon" => TrialInput::Abandon,
        "status" => TrialInput::Status,
        "help" | "?" => TrialInput::Help,
        _ => match config.resolve_label(input) {
            Some(label) => TrialInput::Record(label),
            None => TrialInput::UnknownIndex(input.to_string()),
        },
    }
}

fn print_vocabulary(config: &StudyConfig) {
    eprintln!("Behaviors:");
    for (i, behavior) in config.behaviors.iter().enumerate() {
        eprintln!("  {:>2}. {}", i + 1, behavior);
    }
    eprintln!("Commands: status, abandon, finish (=text records text as-is)");
}

fn cmd_entropy(input: &Path, json: bool) -> Result<(), RatropyCliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let labels = parse_labels(&data)?;
    let breakdown = EntropyEngine::breakdown(&labels);
    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
    } else {
        println!("Events:   {}", breakdown.event_count);
        println!("Distinct: {}", breakdown.distinct_labels);
        println!("H1:       {:.4}", breakdown.h1);
        println!("H2:       {:.4}", breakdown.h2);
        println!("H3:       {:.4}", breakdown.h3);
        println!("Entropy:  {:.4}", breakdown.total);
    }
    Ok(())
}

/// A JSON array of strings, or one label per line
fn parse_labels(data: &str) -> Result<Vec<String>, RatropyCliError> {
    if data.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(data)?);
    }
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn cmd_history(config: &StudyConfig, json: bool) -> Result<(), RatropyCliError> {
    let trials = open_store(config)?.list_trials()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trials)?);
        return Ok(());
    }

    if trials.is_empty() {
        println!("No trials recorded");
    }
    for t in &trials {
        println!(
            "#{}\t{}\t{} ({})\tattempt {}\t{} events\tentropy {:.4}",
            t.id,
            t.record.date,
            t.record.subject_id,
            t.species.as_deref().unwrap_or("unregistered"),
            t.record.attempt,
            t.record.events.len(),
            t.record.entropy
        );
    }
    Ok(())
}

fn cmd_report(
    config: &StudyConfig,
    id: TrialId,
    output: Option<&Path>,
    format: ReportFormat,
) -> Result<(), RatropyCliError> {
    let store = open_store(config)?;
    let trial = store
        .get_trial(id)?
        .ok_or_else(|| RatropyCliError::NotFound(format!("trial {}", id)))?;
    let subject = store
        .get_subject(&trial.record.subject_id)?
        .ok_or_else(|| RatropyCliError::NotFound(format!("subject {}", trial.record.subject_id)))?;

    write_report(format, &trial.record, &subject, output)
}

fn write_report(
    format: ReportFormat,
    record: &TrialRecord,
    subject: &Subject,
    output: Option<&Path>,
) -> Result<(), RatropyCliError> {
    let exporter = exporter_for(format);

    if output.is_some_and(|p| p.to_string_lossy() == "-") {
        let bytes = exporter.render(record, subject)?;
        let mut stdout = io::stdout();
        stdout.write_all(&bytes)?;
        stdout.flush()?;
        return Ok(());
    }

    let path = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(report_filename(
            &record.subject_id,
            &record.date,
            exporter.extension(),
        )),
    };
    export_to_path(exporter.as_ref(), record, subject, &path)?;
    println!("Report written to {}", path.display());
    Ok(())
}

fn cmd_doctor(
    config: &StudyConfig,
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), RatropyCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "ratropy_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("RatRopy version {}", RATROPY_VERSION),
    });

    // Config was already loaded and validated; report where it came from
    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: match config_path {
            Some(path) => format!(
                "{} valid ({} behaviors)",
                path.display(),
                config.behaviors.len()
            ),
            None => format!("Using defaults ({} behaviors)", config.behaviors.len()),
        },
    });

    let db_check = if !config.database_path.exists() {
        DoctorCheck {
            name: "database".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} does not exist yet (created on first use)",
                config.database_path.display()
            ),
        }
    } else {
        match SqliteStore::open(&config.database_path) {
            Ok(store) => match (store.list_subjects(), store.trial_count()) {
                (Ok(subjects), Ok(trials)) => DoctorCheck {
                    name: "database".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "{} ({} subjects, {} trials)",
                        config.database_path.display(),
                        subjects.len(),
                        trials
                    ),
                },
                (Err(e), _) | (_, Err(e)) => DoctorCheck {
                    name: "database".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read database: {}", e),
                },
            },
            Err(e) => DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot open {}: {}", config.database_path.display(), e),
            },
        }
    };
    checks.push(db_check);

    checks.push(stdin_check(atty::is(atty::Stream::Stdin)));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RATROPY_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("RatRopy Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Info => "[INFO]",
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RatropyCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// Trials are recorded from stdin; either mode works, so this only reports which
fn stdin_check(is_tty: bool) -> DoctorCheck {
    let message = if is_tty {
        "stdin is a TTY (interactive recording)"
    } else {
        "stdin is a pipe (scripted recording)"
    };
    DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Info,
        message: message.to_string(),
    }
}

// Error types

#[derive(Debug)]
enum RatropyCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Store(StoreError),
    Trial(TrialError),
    NotFound(String),
    DoctorFailed,
}

impl From<io::Error> for RatropyCliError {
    fn from(e: io::Error) -> Self {
        RatropyCliError::Io(e)
    }
}

impl From<serde_json::Error> for RatropyCliError {
    fn from(e: serde_json::Error) -> Self {
        RatropyCliError::Json(e)
    }
}

impl From<ConfigError> for RatropyCliError {
    fn from(e: ConfigError) -> Self {
        RatropyCliError::Config(e)
    }
}

impl From<StoreError> for RatropyCliError {
    fn from(e: StoreError) -> Self {
        RatropyCliError::Store(e)
    }
}

impl From<TrialError> for RatropyCliError {
    fn from(e: TrialError) -> Self {
        RatropyCliError::Trial(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RatropyCliError> for CliError {
    fn from(e: RatropyCliError) -> Self {
        match e {
            RatropyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RatropyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RatropyCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'ratropy config' to see a valid configuration".to_string()),
            },
            RatropyCliError::Store(StoreError::DuplicateSubject(id)) => CliError {
                code: "DUPLICATE_SUBJECT".to_string(),
                message: format!("Subject {} is already registered", id),
                hint: Some("Use 'ratropy subject update' to change it".to_string()),
            },
            RatropyCliError::Store(e) => CliError {
                code: "STORE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'ratropy doctor' to check the database".to_string()),
            },
            RatropyCliError::Trial(TrialError::SubjectNotFound(id)) => CliError {
                code: "SUBJECT_NOT_FOUND".to_string(),
                message: format!("Subject not found: {}", id),
                hint: Some("Register it with 'ratropy subject add'".to_string()),
            },
            RatropyCliError::Trial(e) => CliError {
                code: "TRIAL_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RatropyCliError::NotFound(what) => CliError {
                code: "NOT_FOUND".to_string(),
                message: format!("No such {}", what),
                hint: Some("Run 'ratropy history' or 'ratropy subject list'".to_string()),
            },
            RatropyCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Debug, serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Debug, PartialEq, serde::Serialize)]
enum CheckStatus {
    Info,
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_trial_input_commands_and_indexes() {
        let config = StudyConfig::default();

        assert_eq!(parse_trial_input("  finish ", &config), TrialInput::Finish);
        assert_eq!(parse_trial_input("status", &config), TrialInput::Status);
        assert_eq!(parse_trial_input("", &config), TrialInput::Skip);
        assert_eq!(
            parse_trial_input("4", &config),
            TrialInput::Record("grooming".to_string())
        );
        assert_eq!(
            parse_trial_input("99", &config),
            TrialInput::UnknownIndex("99".to_string())
        );
        assert_eq!(
            parse_trial_input("tail rattling", &config),
            TrialInput::Record("tail rattling".to_string())
        );
    }

    #[test]
    fn test_trial_input_escape_records_verbatim() {
        let config = StudyConfig::default();

        for word in ["finish", "done", "status", "abandon", "help", "?", "3"] {
            assert_eq!(
                parse_trial_input(&format!("={}", word), &config),
                TrialInput::Record(word.to_string())
            );
        }
        assert_eq!(parse_trial_input("=", &config), TrialInput::Skip);
    }

    #[test]
    fn test_empty_label_input_scores_zero() {
        assert!(parse_labels("").unwrap().is_empty());
        assert!(parse_labels("[]").unwrap().is_empty());
        assert_eq!(EntropyEngine::breakdown(&parse_labels("\n\n").unwrap()).total, 0.0);

        let labels = parse_labels("sniffing\n grooming \n\nsniffing\n").unwrap();
        assert_eq!(labels, vec!["sniffing", "grooming", "sniffing"]);
    }

    #[test]
    fn test_stdin_check_is_informational() {
        for is_tty in [true, false] {
            let check = stdin_check(is_tty);
            assert_eq!(check.status, CheckStatus::Info);
        }
        assert!(stdin_check(false).message.contains("pipe"));
    }
}
