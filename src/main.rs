//! Command-line front end for the dictation pipeline.
//!
//! Prints the `PipelineResult` as JSON on stdout; logs go to stderr. Exits 0
//! when the record is ready, 2 when it awaits human input, 1 on error.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use procscribe::config::{PipelineConfig, APP_NAME, APP_VERSION};
use procscribe::pipeline::extraction::{PatternTable, PatternTableSpec, ProcedureKind};
use procscribe::pipeline::validation::{
    AuditClient, MockAuditClient, OllamaAuditClient, ValidationResult, Validator,
};
use procscribe::pipeline::{Pipeline, ResumeContext, UserOverrides};
use procscribe::record::{FieldPath, Record};

const EXIT_ERROR: i32 = 1;
const EXIT_AWAITING_INPUT: i32 = 2;

#[derive(Parser)]
#[command(
    name = "procscribe",
    version,
    about = "Extract, audit and confirm structured procedure records from dictation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline on a dictation, or resume a paused run.
    Process {
        /// Dictation text file (`-` for stdin).
        #[arg(long)]
        text: PathBuf,
        /// Built-in procedure table to extract with.
        #[arg(long, conflicts_with = "patterns")]
        procedure: Option<ProcedureKind>,
        /// JSON pattern table file instead of a built-in procedure.
        #[arg(long)]
        patterns: Option<PathBuf>,
        /// Prior result JSON to resume from.
        #[arg(long)]
        resume: Option<PathBuf>,
        /// JSON object of dot-path overrides, applied on resume.
        #[arg(long, requires = "resume")]
        overrides: Option<PathBuf>,
        /// Auto-apply threshold for corrections (default from environment or 0.8).
        #[arg(long)]
        threshold: Option<f32>,
        /// Skip the audit service; validation degrades to confidence 0.0.
        #[arg(long)]
        offline: bool,
    },
    /// List built-in procedure tables, or print one as JSON.
    Tables {
        /// Print this procedure's full pattern table.
        #[arg(long)]
        procedure: Option<ProcedureKind>,
    },
}

/// The parts of a prior result needed to resume. Extra keys are ignored, so
/// a saved `PipelineResult` can be passed as-is.
#[derive(Debug, Deserialize)]
struct PriorRun {
    record: Record,
    validation: ValidationResult,
}

#[derive(Serialize)]
struct TableSummary {
    procedure: ProcedureKind,
    fields: usize,
    critical_fields: &'static [&'static str],
}

#[tokio::main]
async fn main() {
    procscribe::init_tracing();

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(EXIT_ERROR);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Process {
            text,
            procedure,
            patterns,
            resume,
            overrides,
            threshold,
            offline,
        } => {
            cmd_process(ProcessArgs {
                text,
                procedure,
                patterns,
                resume,
                overrides,
                threshold,
                offline,
            })
            .await
        }
        Command::Tables { procedure } => cmd_tables(procedure).map(|()| 0),
    }
}

struct ProcessArgs {
    text: PathBuf,
    procedure: Option<ProcedureKind>,
    patterns: Option<PathBuf>,
    resume: Option<PathBuf>,
    overrides: Option<PathBuf>,
    threshold: Option<f32>,
    offline: bool,
}

async fn cmd_process(args: ProcessArgs) -> Result<i32> {
    let mut config = PipelineConfig::from_env();
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    config.validate()?;

    tracing::info!(version = APP_VERSION, offline = args.offline, "Starting {}", APP_NAME);

    let text = read_text(&args.text)?;
    let validator = build_validator(&config, args.offline)?;

    let pipeline = match (args.procedure, &args.patterns) {
        (_, Some(path)) => Pipeline::new(load_table(path)?, validator),
        (Some(kind), None) => Pipeline::for_procedure(kind, validator)?,
        (None, None) => bail!("either --procedure or --patterns is required"),
    }
    .with_threshold(config.threshold)?;

    let resume = match &args.resume {
        Some(path) => {
            let prior = load_prior_run(path)?;
            let overrides = match &args.overrides {
                Some(path) => load_overrides(path)?,
                None => UserOverrides::new(),
            };
            Some(ResumeContext {
                prior_record: prior.record,
                prior_validation: prior.validation,
                overrides,
            })
        }
        None => None,
    };

    let result = pipeline.process(&text, resume).await?;
    println!("{}", serde_json::to_string_pretty(&result).context("serialize result")?);

    Ok(if result.is_ready() { 0 } else { EXIT_AWAITING_INPUT })
}

fn cmd_tables(procedure: Option<ProcedureKind>) -> Result<()> {
    let output = match procedure {
        Some(kind) => serde_json::to_string_pretty(&kind.pattern_table()?.to_spec()),
        None => {
            let summaries = ProcedureKind::ALL
                .iter()
                .map(|&kind| -> Result<TableSummary> {
                    Ok(TableSummary {
                        procedure: kind,
                        fields: kind.pattern_table()?.len(),
                        critical_fields: kind.critical_fields(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            serde_json::to_string_pretty(&summaries)
        }
    }
    .context("serialize tables")?;
    println!("{output}");
    Ok(())
}

fn build_validator(config: &PipelineConfig, offline: bool) -> Result<Validator> {
    let client: Arc<dyn AuditClient> = if offline {
        Arc::new(MockAuditClient::unavailable())
    } else {
        Arc::new(
            OllamaAuditClient::new(&config.ollama_url, &config.model, config.timeout())
                .context("configure audit client")?,
        )
    };
    Ok(Validator::new(client)
        .with_timeout(config.timeout())
        .with_max_retries(config.max_retries))
}

fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read dictation from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn load_table(path: &Path) -> Result<PatternTable> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let spec: PatternTableSpec =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(PatternTable::compile(&spec)?)
}

fn load_prior_run(path: &Path) -> Result<PriorRun> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn load_overrides(path: &Path) -> Result<UserOverrides> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let overrides: UserOverrides =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    for (key, _) in overrides.iter() {
        if FieldPath::parse(key).is_err() {
            tracing::warn!(path = %key, "Override path is invalid and will be skipped");
        }
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn cli_parses_process_arguments() {
        let cli = Cli::try_parse_from([
            "procscribe", "process", "--text", "note.txt", "--procedure", "tavr", "--threshold", "0.9",
        ])
        .unwrap();
        match cli.command {
            Command::Process { procedure, threshold, offline, .. } => {
                assert_eq!(procedure, Some(ProcedureKind::Tavi));
                assert_eq!(threshold, Some(0.9));
                assert!(!offline);
            }
            Command::Tables { .. } => panic!("expected process"),
        }
    }

    #[test]
    fn cli_rejects_procedure_with_patterns() {
        let result = Cli::try_parse_from([
            "procscribe", "process", "--text", "a", "--procedure", "pci", "--patterns", "t.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_requires_resume_for_overrides() {
        let result = Cli::try_parse_from([
            "procscribe", "process", "--text", "a", "--procedure", "pci", "--overrides", "o.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn loads_overrides_file() {
        let file = temp_json(r#"{"sheathSizeFr": 6, "access.primary": ""}"#);
        let overrides = load_overrides(file.path()).unwrap();
        assert_eq!(overrides.len(), 2);
    }

    #[test]
    fn loads_prior_run_from_saved_result() {
        let file = temp_json(
            &json!({
                "runId": "8d0c0f4e-4a39-4d59-8e3a-6f0f6f1b2c3d",
                "status": "awaiting_input",
                "record": {"access": {"primary": "Right radial"}},
                "validation": {
                    "corrections": [],
                    "missingCritical": [{"field": "sheathSizeFr", "critical": true, "reason": "absent"}],
                    "missingOptional": [],
                    "confidence": 0.7
                },
                "pendingReview": []
            })
            .to_string(),
        );
        let prior = load_prior_run(file.path()).unwrap();
        assert_eq!(prior.validation.missing_critical.len(), 1);
        assert_eq!(
            prior.record.get(&FieldPath::parse("access.primary").unwrap()),
            Some(&json!("Right radial"))
        );
    }

    #[test]
    fn loads_pattern_table_file() {
        let file = temp_json(
            r#"{"fields": [{"field": "sheathSizeFr", "rules": [{"pattern": "(\\d+)\\s*fr", "normalizer": "integer"}]}]}"#,
        );
        let table = load_table(file.path()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn bad_pattern_table_is_an_error() {
        let file = temp_json(r#"{"fields": [{"field": "x", "rules": [{"pattern": "(unclosed"}]}]}"#);
        assert!(load_table(file.path()).is_err());
    }

    #[tokio::test]
    async fn offline_run_reports_awaiting_input_for_missing_fields() {
        let config = PipelineConfig::default();
        let validator = build_validator(&config, true).unwrap();
        let pipeline = Pipeline::for_procedure(ProcedureKind::Angiogram, validator).unwrap();
        let result = pipeline.process("Right radial access.", None).await.unwrap();
        assert!(!result.is_ready());
    }
}
