use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use contentforge_common::PipelineConfig;
use contentforge_pipeline::orchestrator::UnitResult;
use contentforge_pipeline::{ApprovalDecision, Orchestrator, PipelineRun, RunState, Services};

#[derive(Parser)]
#[command(name = "contentforge", about = "Blog and short-form content production pipeline")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./contentforge.toml")]
    config: PathBuf,

    /// Directory artifacts and the run log are written to
    #[arg(long, default_value = "./output")]
    output: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Approve the first draft that passes fact checking without prompting
    #[arg(long)]
    auto_approve: bool,
}

/// Used when `RUST_LOG` is unset. Covers the pipeline and every vendor client.
const DEFAULT_LOG_FILTER: &str = "contentforge=info,contentforge_pipeline=info,\
    newsapi_client=info,venice_client=info,bannerbear_client=info,pinterest_client=info";

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// `approve`, `reject` or `revise <feedback>`.
fn parse_decision(line: &str) -> Option<ApprovalDecision> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match command.to_lowercase().as_str() {
        "approve" | "a" => Some(ApprovalDecision::Approve),
        "reject" | "r" => Some(ApprovalDecision::Reject),
        "revise" => Some(ApprovalDecision::Revise(rest.trim().to_string())),
        _ => None,
    }
}

fn show_pending(run: &PipelineRun) {
    let snapshot = run.snapshot();
    if let Some(draft) = &snapshot.draft {
        println!("\n===== Draft (revision {}) =====\n{}\n", draft.revision_count, draft.body);
    }
    if let Some(check) = &snapshot.fact_check {
        println!("Fact check: {}% - {}", check.confidence, check.explanation);
    }
    println!("Enter: approve | reject | revise <feedback>");
}

fn report(run: &PipelineRun) {
    let snapshot = run.snapshot();
    for outcome in &snapshot.units {
        match &outcome.result {
            UnitResult::Stored { filename } => println!("{}: stored {filename}", outcome.unit),
            UnitResult::Published { url } => println!("{}: published {url}", outcome.unit),
            UnitResult::Failed(e) => println!("{}: failed: {e}", outcome.unit),
        }
    }
    println!("Run {} finished: {}", snapshot.run_id, snapshot.state);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    info!("contentforge starting");

    let config = PipelineConfig::load(&cli.config)?;
    let orchestrator = Orchestrator::new(Services::from_config(&config));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let mut run = orchestrator
        .start_with_cancel(config, cancel.clone())
        .await
        .context("Run could not start")?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while run.state() == RunState::AwaitingApproval {
        let decision = if cli.auto_approve {
            ApprovalDecision::Approve
        } else {
            show_pending(&run);
            let line = tokio::select! {
                _ = cancel.cancelled() => None,
                line = stdin.next_line() => line?,
            };
            let Some(line) = line else {
                if !cancel.is_cancelled() {
                    warn!("stdin closed while awaiting approval");
                }
                orchestrator.cancel_pending(&mut run)?;
                break;
            };
            match parse_decision(&line) {
                Some(decision) => decision,
                None => {
                    println!("Unrecognised input: {line:?}");
                    continue;
                }
            }
        };

        if let Err(e) = orchestrator.submit_approval_decision(&mut run, decision).await {
            println!("Decision not applied: {e}");
        }
    }

    report(&run);

    let export = run.export();
    export.write_to_dir(&cli.output)?;
    run.run_log().save(&cli.output, run.state().as_str())?;

    if let Some(error) = run.snapshot().error {
        bail!("Run aborted: {error}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_parse_from_stdin_lines() {
        assert_eq!(parse_decision("approve\n"), Some(ApprovalDecision::Approve));
        assert_eq!(parse_decision(" R "), Some(ApprovalDecision::Reject));
        assert_eq!(
            parse_decision("revise  add a second example"),
            Some(ApprovalDecision::Revise("add a second example".into()))
        );
        assert_eq!(parse_decision("revise"), Some(ApprovalDecision::Revise(String::new())));
        assert_eq!(parse_decision("ship it"), None);
    }

    #[test]
    fn default_filter_covers_vendor_clients() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        for target in ["newsapi_client", "venice_client", "bannerbear_client", "pinterest_client"] {
            assert!(DEFAULT_LOG_FILTER.contains(&format!("{target}=info")), "{target}");
        }
    }
}
