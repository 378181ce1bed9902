//! Live, color-coded transcript of a run.
//!
//! The console owns its own thread and drains a channel of [`LogEvent`]s,
//! so the orchestrator never waits on the terminal.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{IsTerminal, Write};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::journal::LogEntry;
use crate::orchestrator::LogEvent;

pub const START_BANNER: &str = "========== Quick Branch Merge started ==========";
pub const SUCCESS_BANNER: &str = "========== all operations succeeded ✓ ==========";
pub const FAILURE_BANNER: &str = "========== operation failed ✗ ==========";

/// Lines to print for one event. Pure, so the formatting is testable.
pub fn format_event(event: &LogEvent) -> Vec<String> {
    match event {
        LogEvent::RunStarted { current, target } => vec![
            START_BANNER.bold().to_string(),
            format!(
                "{} merging {} into {}",
                "→".blue().bold(),
                current.yellow(),
                target.cyan()
            ),
            String::new(),
        ],
        LogEvent::StepStarted { label, .. } => {
            vec![format!("{} {}", "→".blue().bold(), label.bold())]
        }
        LogEvent::StepFinished(entry) => format_entry(entry),
        LogEvent::RunFinished { success: true } => {
            vec![String::new(), SUCCESS_BANNER.green().bold().to_string()]
        }
        LogEvent::RunFinished { success: false } => {
            vec![String::new(), FAILURE_BANNER.red().bold().to_string()]
        }
    }
}

fn format_entry(entry: &LogEntry) -> Vec<String> {
    let mut lines = Vec::new();
    if entry.is_success() {
        lines.push(format!("{} {}", "✓".green().bold(), entry.label.green()));
    } else {
        lines.push(format!("{} {}", "✗".red().bold(), entry.label.red()));
    }
    if entry.has_output() {
        for line in entry.output.trim_end().lines() {
            lines.push(format!("  {}", line.dimmed()));
        }
    }
    lines
}

/// Printer for the consumer thread. Every line goes to `out`; the spinner,
/// when there is one, is suspended around each write so it never eats a line.
struct Console<W: Write> {
    out: W,
    spinner: Option<ProgressBar>,
    /// Where a spinner draws, or `None` for plain output.
    spinner_target: Option<fn() -> ProgressDrawTarget>,
}

impl<W: Write> Console<W> {
    fn new(out: W, spinner_target: Option<fn() -> ProgressDrawTarget>) -> Self {
        Self { out, spinner: None, spinner_target }
    }

    fn print(&mut self, line: &str) {
        let out = &mut self.out;
        let result = match &self.spinner {
            Some(pb) => pb.suspend(|| writeln!(out, "{}", line)),
            None => writeln!(out, "{}", line),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    fn handle(&mut self, event: &LogEvent) {
        for line in format_event(event) {
            self.print(&line);
        }

        match event {
            LogEvent::RunStarted { .. } => {
                if let Some(target) = self.spinner_target {
                    let pb = ProgressBar::with_draw_target(None, target());
                    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                        pb.set_style(style);
                    }
                    pb.enable_steady_tick(Duration::from_millis(100));
                    self.spinner = Some(pb);
                }
            }
            LogEvent::StepStarted { label, .. } => {
                if let Some(pb) = &self.spinner {
                    pb.set_message(format!("running {}…", label));
                }
            }
            LogEvent::RunFinished { .. } => self.finish(),
            _ => {}
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
        let _ = self.out.flush();
    }
}

/// Drain `events` on a new thread until every sender is dropped. The
/// spinner shares stdout with the log and only appears on a terminal.
pub fn spawn(events: Receiver<LogEvent>) -> JoinHandle<()> {
    let spinner_target = std::io::stdout()
        .is_terminal()
        .then_some(ProgressDrawTarget::stdout as fn() -> ProgressDrawTarget);
    thread::spawn(move || {
        let mut console = Console::new(std::io::stdout(), spinner_target);
        for event in events {
            console.handle(&event);
        }
        console.finish();
    })
}
