use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::{
    config::{self, Settings},
    console,
    gateway::GitCli,
    orchestrator::{self, Collaborators, NoticeKind, Prompter},
    render,
    ui::{CommitMessageSource, TerminalPrompter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SummaryFormat {
    Text,
    Html,
    Json,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Overrides the configured target for this run only.
    pub target: Option<String>,
    pub commit_message: CommitMessageSource,
    pub summary: Option<SummaryFormat>,
    pub html_out: Option<PathBuf>,
    pub timeout: Duration,
}

/// Merge the current branch into the target branch.
///
/// Steps:
/// 1. Resolve the target (flag, else settings).
/// 2. Start the live console on its own thread.
/// 3. Probe and run the orchestrator on this thread.
/// 4. Wait for the console to drain, then show notices and summaries.
///
/// Returns whether the run succeeded (no-ops and cancellation count as success).
pub fn run(repo: &Path, settings: &dyn Settings, opts: MergeOptions) -> Result<bool> {
    let target = config::resolve_target(settings, opts.target.as_deref())?;

    let gateway = GitCli::open(repo)?.with_timeout(opts.timeout);
    tracing::debug!(root = %gateway.root().display(), target = %target, "starting merge");
    let prompter = TerminalPrompter::new(opts.commit_message.clone());

    let (tx, rx) = mpsc::channel();
    let console = console::spawn(rx);

    let result = orchestrator::execute(
        &Collaborators { gateway: &gateway, prompter: &prompter, sink: &tx },
        &target,
    );
    drop(tx);
    if console.join().is_err() {
        tracing::warn!("console thread panicked");
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            prompter.notify(
                NoticeKind::Error,
                &format!("Merge to {} failed", target),
                &format!("operation failed: {:#}", e),
            );
            prompter.flush_notices();
            return Ok(false);
        }
    };
    prompter.flush_notices();

    if let Some(journal) = outcome.journal() {
        match opts.summary {
            Some(SummaryFormat::Text) => {
                println!("\n{}", "Summary".bold());
                print!("{}", render::to_plain_text(journal));
            }
            Some(SummaryFormat::Html) => println!("{}", render::to_html(journal)),
            Some(SummaryFormat::Json) => println!("{}", serde_json::to_string_pretty(journal)?),
            None => {}
        }
        if let Some(path) = &opts.html_out {
            std::fs::write(path, render::to_html(journal))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("  {} summary written to {}", "·".dimmed(), path.display());
        }
    }

    Ok(outcome.is_success())
}
