use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::path::Path;

use crate::{
    config::{self, Settings},
    gateway::{Gateway, GitCli},
    orchestrator::{self, Decision},
    probe::{self, RepositoryState},
};

/// Show what a merge would do right now without changing anything
/// (the probe's silent fetch aside).
pub fn run(repo: &Path, settings: &dyn Settings, target: Option<String>) -> Result<()> {
    let target = config::resolve_target(settings, target.as_deref())?;
    let gateway = GitCli::open(repo)?;
    let current = gateway.current_branch()?;

    let state = if current == target {
        RepositoryState {
            current_branch: current,
            has_uncommitted_changes: gateway.has_uncommitted_changes()?,
            ahead: probe::AheadCount::Unknown,
        }
    } else {
        probe::probe_branch(&gateway, &current)?
    };

    println!(
        "{} {} → {} (uncommitted changes: {}, ahead of remote: {})",
        "→".blue().bold(),
        state.current_branch.yellow(),
        target.cyan(),
        if state.has_uncommitted_changes { "yes".yellow() } else { "no".green() },
        state.ahead.to_string().yellow()
    );

    let plan = match orchestrator::decide(&state, &target) {
        Decision::NoOp(reason) => {
            println!(
                "{} Nothing to do: {}",
                "✓".green().bold(),
                reason.message(&state.current_branch, &target)
            );
            return Ok(());
        }
        Decision::Proceed(plan) => plan,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Step").add_attribute(Attribute::Bold),
            Cell::new("Command").add_attribute(Attribute::Bold),
        ]);

    for (i, step) in plan.steps().iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(step.kind.as_str()).fg(Color::Cyan),
            Cell::new(&step.label),
        ]);
    }

    println!("{}", table);

    if plan.needs_commit {
        println!(
            "  {} you will be asked for a commit message (default: {})",
            "·".dimmed(),
            orchestrator::default_commit_message(&target).dimmed()
        );
    }

    Ok(())
}
