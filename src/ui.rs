use colored::Colorize;
use dialoguer::{Confirm, Input};
use std::cell::RefCell;

use crate::orchestrator::{NoticeKind, Prompter};

/// How the commit message is obtained when there are uncommitted changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitMessageSource {
    /// Ask on the terminal.
    Ask,
    /// Use this message without asking.
    Given(String),
    /// Use the default message without asking.
    AcceptDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

/// [`Prompter`] for an interactive terminal.
///
/// Notices are held back until [`TerminalPrompter::flush_notices`] so they
/// print after the live log instead of interleaving with it.
pub struct TerminalPrompter {
    source: CommitMessageSource,
    notices: RefCell<Vec<Notice>>,
}

impl TerminalPrompter {
    pub fn new(source: CommitMessageSource) -> Self {
        Self { source, notices: RefCell::new(Vec::new()) }
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.notices.borrow_mut().drain(..).collect()
    }

    pub fn flush_notices(&self) {
        for notice in self.take_notices() {
            eprintln!("{}", format_notice(&notice));
        }
    }

    fn ask(&self, default: &str) -> Option<String> {
        let proceed = Confirm::new()
            .with_prompt("Uncommitted changes detected. Commit them before merging?")
            .default(true)
            .interact_opt();
        match proceed {
            Ok(Some(true)) => {}
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "commit prompt unavailable");
                eprintln!(
                    "{} Cannot prompt for a commit message here. Pass {} or {}.",
                    "✗".red().bold(),
                    "--message".bold(),
                    "--yes".bold()
                );
                return None;
            }
        }

        Input::<String>::new()
            .with_prompt("Commit message")
            .default(default.to_string())
            .allow_empty(true)
            .interact_text()
            .map_err(|e| tracing::warn!(error = %e, "commit message prompt failed"))
            .ok()
    }
}

impl Prompter for TerminalPrompter {
    fn commit_message(&self, default: &str) -> Option<String> {
        match &self.source {
            CommitMessageSource::Given(message) => Some(message.clone()),
            CommitMessageSource::AcceptDefault => Some(default.to_string()),
            CommitMessageSource::Ask => self.ask(default),
        }
    }

    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        self.notices.borrow_mut().push(Notice {
            kind,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

pub fn format_notice(notice: &Notice) -> String {
    let icon = match notice.kind {
        NoticeKind::Info => "✓".green().bold(),
        NoticeKind::Warning => "!".yellow().bold(),
        NoticeKind::Error => "✗".red().bold(),
    };
    format!("{} {}: {}", icon, notice.title.bold(), notice.message)
}
