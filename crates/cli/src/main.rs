use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use waffle_aws::{load_sdk_config, BedrockInvoker, SdkConfig, WellArchitectedClient};
use waffle_bedrock::{AdapterSettings, BedrockAdapter};
use waffle_core::config::{Config, LogFormat};
use waffle_core::{CancellationToken, RetryPolicy, ReviewScope};
use waffle_engine::{
    completed_session, recorded_milestone, session_status, EngineOptions, ProgressReporter, ReviewEngine, ReviewOutput, ReviewTarget,
    TerminalReporter,
};
use waffle_iac::{FileLimits, IacAnalyzer};
use waffle_redact::Redactor;
use waffle_session::{FileSessionStore, Sealer, SessionStore, SESSION_KEY_ENV};
use waffle_wafr::{EvaluatorSettings, WafrEvaluator};

mod logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "waffle: automated AWS Well-Architected reviews for Terraform")]
struct Cli {
    /// Config file (YAML). Defaults to ~/.waffle/config.yaml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AWS region for the Well-Architected Tool (and Bedrock unless configured)
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS shared-config profile
    #[arg(long, global = true)]
    profile: Option<String>,

    /// DEBUG, INFO, WARNING or ERROR
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, value_enum, global = true)]
    log_format: Option<Format>,

    /// Where session files are kept
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Format { Json, Text }

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Runner { Auto, Terraform, Tofu }

impl Runner {
    fn preference(self) -> Option<waffle_iac::Runner> {
        match self {
            Runner::Auto => None,
            Runner::Terraform => Some(waffle_iac::Runner::Terraform),
            Runner::Tofu => Some(waffle_iac::Runner::Tofu),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start a new review of a Terraform working directory
    Review {
        #[arg(long)]
        workload_id: String,
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Plan file (JSON export or binary plan)
        #[arg(long)]
        plan: Option<PathBuf>,
        /// workload, pillar or question
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        pillar: Option<String>,
        #[arg(long)]
        question_id: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        milestone_name: Option<String>,
        #[arg(long)]
        model_id: Option<String>,
        #[arg(long, value_enum, default_value_t = Runner::Auto)]
        runner: Runner,
        #[arg(long, default_value_t = false)]
        no_progress: bool,
        /// Write the JSON result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Continue an interrupted or failed review
    Resume {
        session_id: String,
        #[arg(long, value_enum, default_value_t = Runner::Auto)]
        runner: Runner,
        #[arg(long, default_value_t = false)]
        no_progress: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show where a review stands
    Status { session_id: String },
    /// Print the full results of a completed review
    Results {
        session_id: String,
        /// Fetch the recorded milestone back from the Well-Architected Tool
        #[arg(long, default_value_t = false)]
        verify_milestone: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Risk counts for every workload in the account
    Report {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List stored sessions, newest first
    Sessions,
    /// Delete sessions older than the retention period
    Cleanup {
        #[arg(long)]
        older_than_days: Option<i64>,
    },
}

fn apply_overrides(cfg: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(region) = &cli.region {
        if cfg.bedrock.region == cfg.aws.region {
            cfg.bedrock.region = region.clone();
        }
        cfg.aws.region = region.clone();
    }
    if let Some(profile) = &cli.profile {
        cfg.aws.profile = profile.clone();
    }
    if let Some(level) = &cli.log_level {
        cfg.logging.level = level.parse()?;
    }
    if let Some(format) = cli.log_format {
        cfg.logging.format = match format {
            Format::Json => LogFormat::Json,
            Format::Text => LogFormat::Text,
        };
    }
    if let Some(dir) = &cli.session_dir {
        cfg.storage.session_dir = dir.clone();
    }
    if let Cmd::Review { model_id: Some(model), .. } = &cli.cmd {
        cfg.bedrock.model_id = model.clone();
    }
    cfg.validate()?;
    Ok(())
}

fn open_store(cfg: &Config) -> Result<FileSessionStore> {
    let store = FileSessionStore::new(cfg.session_dir());
    if !cfg.security.encrypt_sessions {
        return Ok(store);
    }
    let sealer = Sealer::from_env()
        .with_context(|| format!("security.encrypt_sessions is enabled but {SESSION_KEY_ENV} is not set"))?;
    Ok(store.with_sealer(sealer))
}

fn evaluator_for(cfg: &Config, sdk: &SdkConfig) -> WafrEvaluator {
    WafrEvaluator::new(
        Arc::new(WellArchitectedClient::new(sdk)),
        EvaluatorSettings {
            lens_alias: cfg.wafr.default_lens.clone(),
            region: cfg.aws.region.clone(),
            retry: RetryPolicy::wafr(cfg.bedrock.max_retries),
            ..EvaluatorSettings::default()
        },
    )
}

/// Well-Architected Tool access without the model or IaC side.
async fn build_evaluator(cfg: &Config) -> WafrEvaluator {
    let sdk = load_sdk_config(&cfg.aws.region, Some(cfg.aws.profile.as_str())).await;
    evaluator_for(cfg, &sdk)
}

async fn build_engine(cfg: &Config, runner: Runner) -> Result<ReviewEngine> {
    let profile = Some(cfg.aws.profile.as_str());
    let sdk = load_sdk_config(&cfg.aws.region, profile).await;
    let bedrock_sdk = if cfg.bedrock.region == cfg.aws.region {
        sdk.clone()
    } else {
        load_sdk_config(&cfg.bedrock.region, profile).await
    };

    let adapter = BedrockAdapter::new(Arc::new(BedrockInvoker::new(&bedrock_sdk)), AdapterSettings::from_config(&cfg.bedrock))?;
    let evaluator = evaluator_for(cfg, &sdk);

    let redactor = if cfg.security.redact_sensitive_data { Redactor::new() } else { Redactor::disabled() };
    let limits = FileLimits { max_files: cfg.iac.max_files, max_file_size: cfg.max_file_size_bytes() };
    let mut analyzer = IacAnalyzer::new(Arc::new(redactor), limits);
    if let Some(r) = runner.preference() {
        analyzer = analyzer.with_runner(r);
    }

    Ok(ReviewEngine::new(analyzer, evaluator, Arc::new(open_store(cfg)?))
        .with_adapter(Arc::new(adapter))
        .with_options(EngineOptions::from_config(cfg)))
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, text + "\n").with_context(|| format!("writing {}", path.display()))?;
            info!(file = %path.display(), "wrote output");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut cfg, &cli)?;
    let _guard = logging::init(&cfg.logging, &cfg.log_dir())?;
    for note in &cfg.env_warnings {
        warn!("{note}");
    }
    let cancel = cancel_on_ctrl_c();
    let terminal = TerminalReporter::stderr();

    match cli.cmd {
        Cmd::Review {
            workload_id,
            dir,
            plan,
            scope,
            pillar,
            question_id,
            description,
            milestone_name,
            model_id: _,
            runner,
            no_progress,
            output,
        } => {
            let level = scope.unwrap_or_else(|| cfg.wafr.default_scope.clone());
            let scope = ReviewScope::from_parts(&level, pillar.as_deref(), question_id.as_deref())?;
            let working_directory = dir.canonicalize().with_context(|| format!("resolving {}", dir.display()))?;
            let target = ReviewTarget { working_directory, plan_file: plan, description };

            let mut options = EngineOptions::from_config(&cfg);
            options.milestone_name = milestone_name;
            let engine = build_engine(&cfg, runner).await?.with_options(options);
            let session = engine.initiate_review(&workload_id, scope, &target, &cancel).await?;
            let id = session.session_id.clone();
            info!(session = %id, "review started");

            let reporter: Option<&dyn ProgressReporter> = if no_progress { None } else { Some(&terminal) };
            let done = engine
                .execute_review(session, reporter, &cancel)
                .await
                .with_context(|| format!("review failed; continue with `waffle resume {id}`"))?;
            emit(&ReviewOutput::from_session(&done, false), output.as_deref())?;
            if let Some(adapter) = engine.adapter() {
                let usage = adapter.usage();
                info!(requests = usage.requests, input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, cost_usd = usage.estimated_cost_usd, "model usage");
            }
        }
        Cmd::Resume { session_id, runner, no_progress, output } => {
            let engine = build_engine(&cfg, runner).await?;
            let reporter: Option<&dyn ProgressReporter> = if no_progress { None } else { Some(&terminal) };
            let done = engine
                .resume_session(&session_id, reporter, &cancel)
                .await
                .with_context(|| format!("resuming session {session_id}"))?;
            emit(&ReviewOutput::from_session(&done, false), output.as_deref())?;
        }
        Cmd::Status { session_id } => {
            let store = open_store(&cfg)?;
            emit(&session_status(&store, &session_id).await?, None)?;
        }
        Cmd::Results { session_id, verify_milestone, output } => {
            let store = open_store(&cfg)?;
            let session = completed_session(&store, &session_id).await?;
            let mut out = ReviewOutput::from_session(&session, true);
            if verify_milestone {
                let evaluator = build_evaluator(&cfg).await;
                out.milestone = recorded_milestone(&evaluator, &session, &cancel)
                    .await
                    .with_context(|| format!("looking up the milestone of session {session_id}"))?;
            }
            emit(&out, output.as_deref())?;
        }
        Cmd::Report { output } => {
            let report = build_evaluator(&cfg).await.consolidated_report(&cancel).await?;
            emit(&report, output.as_deref())?;
        }
        Cmd::Sessions => {
            let store = open_store(&cfg)?;
            let sessions: Vec<ReviewOutput> =
                store.list_sessions().await?.iter().map(|s| ReviewOutput::from_session(s, false)).collect();
            emit(&sessions, None)?;
        }
        Cmd::Cleanup { older_than_days } => {
            let days = older_than_days.unwrap_or(cfg.storage.retention_days);
            let removed = open_store(&cfg)?.prune(days).await?;
            emit(&json!({ "removed": removed, "retention_days": days }), None)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waffle_core::config::LogLevel;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "waffle",
            "--region",
            "eu-west-1",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "review",
            "--workload-id",
            "shop",
            "--model-id",
            "anthropic.claude-3-haiku",
        ])
        .unwrap();
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, &cli).unwrap();
        assert_eq!(cfg.aws.region, "eu-west-1");
        assert_eq!(cfg.bedrock.region, "eu-west-1");
        assert_eq!(cfg.logging.level, LogLevel::Debug);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.bedrock.model_id, "anthropic.claude-3-haiku");
    }

    #[test]
    fn explicit_bedrock_region_is_kept() {
        let cli = Cli::try_parse_from(["waffle", "--region", "eu-west-1", "sessions"]).unwrap();
        let mut cfg = Config::default();
        cfg.bedrock.region = "us-west-2".into();
        apply_overrides(&mut cfg, &cli).unwrap();
        assert_eq!(cfg.bedrock.region, "us-west-2");
        assert_eq!(cfg.aws.region, "eu-west-1");
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let cli = Cli::try_parse_from(["waffle", "--log-level", "loud", "status", "abc"]).unwrap();
        assert!(apply_overrides(&mut Config::default(), &cli).is_err());
    }

    #[test]
    fn report_and_milestone_flags_parse() {
        let cli = Cli::try_parse_from(["waffle", "results", "abc", "--verify-milestone"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Results { verify_milestone: true, .. }));
        let cli = Cli::try_parse_from(["waffle", "report", "-o", "report.json"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Report { output: Some(_) }));
    }

    #[tokio::test]
    async fn status_and_results_read_the_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.storage.session_dir = dir.path().to_path_buf();
        let store = open_store(&cfg).unwrap();
        let session = store.create_session("shop", "aws-shop", ReviewScope::Workload).await.unwrap();

        let status = session_status(&store, &session.session_id).await.unwrap();
        assert_eq!(status.workload_id, "shop");
        assert_eq!(status.stages_completed, 0);
        assert!(completed_session(&store, &session.session_id).await.is_err());
    }

    #[test]
    fn encrypted_store_needs_key() {
        let mut cfg = Config::default();
        cfg.security.encrypt_sessions = true;
        if std::env::var(SESSION_KEY_ENV).is_err() {
            assert!(open_store(&cfg).is_err());
        }
    }
}
