//! Merge the current branch into a target branch on the remote and return
//! to where we started.
//!
//! The run is synchronous and blocking: callers decide which thread it runs
//! on. Progress leaves through a [`LogSink`]; the only thing flowing back in
//! is the commit message from the [`Prompter`].
//!
//! Step order, each one fail-fast:
//! 1. commit (only with uncommitted changes)
//! 2. push current branch (only when it may be ahead of its remote)
//! 3. fetch target
//! 4. checkout target
//! 5. pull target, rolls back on failure
//! 6. merge current into target, no rollback (conflicts stay for the user)
//! 7. push target, rolls back on failure
//! 8. checkout back to the original branch

use anyhow::Result;
use std::sync::mpsc;

use crate::gateway::{self, Gateway, GitOutput, DEFAULT_REMOTE};
use crate::journal::{Journal, LogEntry, StepKind};
use crate::probe::{self, AheadCount, RepositoryState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// The user-facing side of a run: one blocking prompt and fire-and-forget notices.
pub trait Prompter {
    /// Ask for a commit message. `None` means the user declined.
    fn commit_message(&self, default: &str) -> Option<String>;

    fn notify(&self, kind: NoticeKind, title: &str, message: &str);
}

/// Events streamed while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    RunStarted { current: String, target: String },
    StepStarted { kind: StepKind, label: String },
    StepFinished(LogEntry),
    RunFinished { success: bool },
}

/// Consumer of [`LogEvent`]s. Must not block the orchestrator.
pub trait LogSink {
    fn emit(&self, event: LogEvent);
}

impl LogSink for mpsc::Sender<LogEvent> {
    fn emit(&self, event: LogEvent) {
        // A consumer that went away must not fail the run.
        let _ = self.send(event);
    }
}

/// Why a run did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    SameBranch,
    AlreadyInSync,
}

impl NoOpReason {
    pub fn message(&self, current: &str, target: &str) -> String {
        match self {
            NoOpReason::SameBranch => format!("already on '{}', no merge needed", target),
            NoOpReason::AlreadyInSync => {
                format!("'{}' has no local changes and nothing unpushed, already in sync", current)
            }
        }
    }
}

/// Steps chosen for a run, decided once from the probed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub current: String,
    pub target: String,
    pub needs_commit: bool,
    pub needs_push_current: bool,
    /// Remote branch unknown: the push also records the upstream.
    pub set_upstream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoOp(NoOpReason),
    Proceed(Plan),
}

/// A step with the command line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub label: String,
}

pub fn default_commit_message(target: &str) -> String {
    format!("auto commit before merge to {}", target)
}

/// Apply the decision rules to a state snapshot.
pub fn decide(state: &RepositoryState, target: &str) -> Decision {
    if state.current_branch == target {
        return Decision::NoOp(NoOpReason::SameBranch);
    }
    if !state.has_uncommitted_changes && state.ahead.is_zero() {
        return Decision::NoOp(NoOpReason::AlreadyInSync);
    }
    Decision::Proceed(Plan {
        current: state.current_branch.clone(),
        target: target.to_string(),
        needs_commit: state.has_uncommitted_changes,
        needs_push_current: state.has_uncommitted_changes || state.ahead.may_be_ahead(),
        set_upstream: state.ahead == AheadCount::Unknown,
    })
}

impl Plan {
    /// The git command line a step runs, as shown in the transcript.
    pub fn label(&self, kind: StepKind) -> String {
        let (current, target) = (self.current.as_str(), self.target.as_str());
        let args = match kind {
            StepKind::Commit => return "git add -A && git commit".to_string(),
            StepKind::PushCurrent => gateway::push_args(DEFAULT_REMOTE, current, self.set_upstream),
            StepKind::FetchTarget => gateway::fetch_args(DEFAULT_REMOTE, target),
            StepKind::CheckoutTarget => gateway::checkout_args(target),
            StepKind::PullTarget => gateway::pull_args(DEFAULT_REMOTE, target),
            StepKind::MergeIntoTarget => gateway::merge_args(current),
            StepKind::PushTarget => gateway::push_args(DEFAULT_REMOTE, target, false),
            StepKind::CheckoutBack => gateway::checkout_args(current),
        };
        format!("git {}", args.join(" "))
    }

    /// Every step a fully successful run executes, in order.
    pub fn steps(&self) -> Vec<PlannedStep> {
        let mut kinds = Vec::with_capacity(8);
        if self.needs_commit {
            kinds.push(StepKind::Commit);
        }
        if self.needs_push_current {
            kinds.push(StepKind::PushCurrent);
        }
        kinds.extend([
            StepKind::FetchTarget,
            StepKind::CheckoutTarget,
            StepKind::PullTarget,
            StepKind::MergeIntoTarget,
            StepKind::PushTarget,
            StepKind::CheckoutBack,
        ]);
        kinds
            .into_iter()
            .map(|kind| PlannedStep { kind, label: self.label(kind) })
            .collect()
    }

    fn failure_reason(&self, kind: StepKind) -> String {
        match kind {
            StepKind::Commit => "commit failed, check git status".to_string(),
            StepKind::PushCurrent => format!("push of '{}' failed", self.current),
            StepKind::FetchTarget => format!("fetching remote '{}' failed", self.target),
            StepKind::CheckoutTarget => format!("switching to '{}' failed", self.target),
            StepKind::PullTarget => format!("pulling '{}' failed", self.target),
            StepKind::MergeIntoTarget => "merge failed, resolve conflicts manually".to_string(),
            StepKind::PushTarget => format!("pushing to remote '{}' failed", self.target),
            StepKind::CheckoutBack => format!("switching back to '{}' failed", self.current),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    NoOp(NoOpReason),
    /// The user declined the commit prompt. Nothing ran, nothing was shown.
    Cancelled,
    Finished(RunReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub success: bool,
    /// The step whose failure ended the run.
    pub failed_step: Option<StepKind>,
    pub journal: Journal,
}

impl RunOutcome {
    /// False only for a finished run that failed.
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::Finished(report) => report.success,
            RunOutcome::NoOp(_) | RunOutcome::Cancelled => true,
        }
    }

    pub fn journal(&self) -> Option<&Journal> {
        match self {
            RunOutcome::Finished(report) => Some(&report.journal),
            _ => None,
        }
    }
}

/// Everything a run talks to.
pub struct Collaborators<'a> {
    pub gateway: &'a dyn Gateway,
    pub prompter: &'a dyn Prompter,
    pub sink: &'a dyn LogSink,
}

/// Read the current branch, bail out early when it is the target, probe,
/// then run. Errors only come from reading state before anything mutates.
pub fn execute(collab: &Collaborators<'_>, target: &str) -> Result<RunOutcome> {
    let current = collab.gateway.current_branch()?;
    if current == target {
        return Ok(no_op(collab, NoOpReason::SameBranch, &current, target));
    }
    let state = probe::probe_branch(collab.gateway, &current)?;
    tracing::debug!(?state, target, "repository probed");
    Ok(run(collab, &state, target))
}

/// Run the merge for an already probed state.
pub fn run(collab: &Collaborators<'_>, state: &RepositoryState, target: &str) -> RunOutcome {
    let plan = match decide(state, target) {
        Decision::NoOp(reason) => return no_op(collab, reason, &state.current_branch, target),
        Decision::Proceed(plan) => plan,
    };

    let message = if plan.needs_commit {
        let default = default_commit_message(target);
        match collab.prompter.commit_message(&default) {
            None => return RunOutcome::Cancelled,
            Some(m) if m.trim().is_empty() => Some(default),
            Some(m) => Some(m),
        }
    } else {
        None
    };

    collab.sink.emit(LogEvent::RunStarted {
        current: plan.current.clone(),
        target: plan.target.clone(),
    });

    let mut runner = Runner { collab, plan: &plan, journal: Journal::new() };
    let failure = runner.drive(message.as_deref());
    let journal = runner.journal;

    let success = failure.is_none();
    collab.sink.emit(LogEvent::RunFinished { success });

    let title_ok = format!("Merge to {} succeeded", plan.target);
    let title_err = format!("Merge to {} failed", plan.target);
    match &failure {
        None => {
            collab.prompter.notify(
                NoticeKind::Info,
                &title_ok,
                &format!("merged '{}' into remote '{}'", plan.current, plan.target),
            );
            if journal.find(StepKind::CheckoutBack).is_some_and(LogEntry::is_failure) {
                collab.prompter.notify(
                    NoticeKind::Warning,
                    &title_ok,
                    &format!("still on '{}', switch back to '{}' manually", plan.target, plan.current),
                );
            }
        }
        Some(Failure::Step(kind)) => {
            collab.prompter.notify(NoticeKind::Error, &title_err, &plan.failure_reason(*kind));
        }
        Some(Failure::Unexpected(_, err)) => {
            collab.prompter.notify(NoticeKind::Error, &title_err, &format!("operation failed: {}", err));
        }
    }

    RunOutcome::Finished(RunReport {
        success,
        failed_step: failure.map(|f| f.step()),
        journal,
    })
}

fn no_op(collab: &Collaborators<'_>, reason: NoOpReason, current: &str, target: &str) -> RunOutcome {
    collab
        .prompter
        .notify(NoticeKind::Info, "Nothing to merge", &reason.message(current, target));
    RunOutcome::NoOp(reason)
}

enum Failure {
    /// Git ran and reported failure.
    Step(StepKind),
    /// Git could not be run at all.
    Unexpected(StepKind, String),
}

impl Failure {
    fn step(&self) -> StepKind {
        match self {
            Failure::Step(kind) | Failure::Unexpected(kind, _) => *kind,
        }
    }
}

struct Runner<'a, 'c> {
    collab: &'a Collaborators<'c>,
    plan: &'a Plan,
    journal: Journal,
}

impl Runner<'_, '_> {
    /// Run the step sequence. Returns the failure that stopped it, if any.
    fn drive(&mut self, message: Option<&str>) -> Option<Failure> {
        let gw = self.collab.gateway;
        let plan = self.plan;
        let (current, target) = (plan.current.as_str(), plan.target.as_str());

        if let Some(message) = message {
            if let Err(f) = self.step(StepKind::Commit, || gw.commit_all(message)) {
                return Some(f);
            }
        }
        // Nothing has touched the target branch or the checkout yet.
        if self.plan.needs_push_current {
            if let Err(f) = self.step(StepKind::PushCurrent, || gw.push(current, plan.set_upstream)) {
                return Some(f);
            }
        }
        if let Err(f) = self.step(StepKind::FetchTarget, || gw.fetch(target)) {
            return Some(f);
        }
        if let Err(f) = self.step(StepKind::CheckoutTarget, || gw.checkout(target)) {
            return Some(self.after_checkout_attempt(f));
        }
        self.confirm_branch(target);

        if let Err(f) = self.step(StepKind::PullTarget, || gw.pull(target)) {
            self.rollback();
            return Some(f);
        }
        if let Err(f) = self.step(StepKind::MergeIntoTarget, || gw.merge(current)) {
            // A conflicted tree cannot be switched away from safely.
            if matches!(f, Failure::Unexpected(..)) {
                self.rollback();
            }
            return Some(f);
        }
        if let Err(f) = self.step(StepKind::PushTarget, || gw.push(target, false)) {
            self.rollback();
            return Some(f);
        }

        // Remote is already updated; a failed switch back is only a nuisance.
        let _ = self.step(StepKind::CheckoutBack, || gw.checkout(current));
        None
    }

    /// Journal one step, streaming start and finish events.
    fn step(&mut self, kind: StepKind, call: impl FnOnce() -> Result<GitOutput>) -> Result<(), Failure> {
        let label = self.plan.label(kind);
        self.collab.sink.emit(LogEvent::StepStarted { kind, label: label.clone() });

        let (entry, result) = match call() {
            Ok(out) if out.success => (self.journal.record_success(kind, label, out.combined()).clone(), Ok(())),
            Ok(out) => (self.journal.record_failure(kind, label, out.combined()).clone(), Err(Failure::Step(kind))),
            Err(e) => {
                let text = format!("{:#}", e);
                tracing::error!(step = %kind, error = %text, "git could not be run");
                let entry = self.journal.record_failure(kind, label, text.clone()).clone();
                (entry, Err(Failure::Unexpected(kind, text)))
            }
        };

        self.collab.sink.emit(LogEvent::StepFinished(entry));
        result
    }

    /// A checkout that git rejected left us where we were. One that could not
    /// be observed at all might not have, so try to get back.
    fn after_checkout_attempt(&mut self, failure: Failure) -> Failure {
        if matches!(failure, Failure::Unexpected(..)) {
            self.rollback();
        }
        failure
    }

    /// Re-read the branch pointer after switching.
    fn confirm_branch(&self, expected: &str) {
        match self.collab.gateway.current_branch() {
            Ok(branch) if branch == expected => {}
            Ok(branch) => tracing::warn!(expected, actual = %branch, "unexpected branch after checkout"),
            Err(e) => tracing::warn!(error = %e, "could not re-read branch after checkout"),
        }
    }

    /// Best-effort return to the original branch. Its outcome is journaled
    /// but never changes the verdict, which is already a failure.
    fn rollback(&mut self) {
        let gw = self.collab.gateway;
        let current = self.plan.current.clone();
        if self.step(StepKind::CheckoutBack, || gw.checkout(&current)).is_err() {
            tracing::warn!(branch = %current, "rollback checkout failed");
        }
    }
}
