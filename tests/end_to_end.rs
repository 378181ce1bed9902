//! Full merge runs against a real repository with a bare `origin` remote.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::sync::mpsc;
use tempfile::TempDir;

use quick_merge::commands::merge::{self as merge_command, MergeOptions};
use quick_merge::config::MemorySettings;
use quick_merge::gateway::{Gateway, GitCli, DEFAULT_TIMEOUT};
use quick_merge::journal::StepKind;
use quick_merge::orchestrator::{self, Collaborators, LogEvent, NoOpReason, NoticeKind, Prompter, RunOutcome, RunReport};
use quick_merge::probe::{self, AheadCount};
use quick_merge::render;
use quick_merge::ui::CommitMessageSource;

fn git(dir: &Path, args: &[&str]) -> String {
    let out = StdCommand::new("git").args(args).current_dir(dir).output().unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
}

/// Working clone with `main` and `dev` pushed to a bare origin and a
/// pushed `feat/x` branch checked out.
fn make_repo_with_origin() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let origin = dir.path().join("origin.git");
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();

    git(dir.path(), &["init", "--bare", "origin.git"]);
    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.email", "test@example.com"],
        vec!["config", "user.name", "Test"],
        vec!["config", "pull.rebase", "false"],
    ] {
        git(&work, &args);
    }
    git(&work, &["remote", "add", "origin", origin.to_str().unwrap()]);

    commit_file(&work, "README.md", "hello\n", "init");
    git(&work, &["push", "-u", "origin", "main"]);
    git(&work, &["checkout", "-b", "dev"]);
    git(&work, &["push", "-u", "origin", "dev"]);
    git(&work, &["checkout", "-b", "feat/x"]);
    commit_file(&work, "feature.txt", "feature\n", "feature work");
    git(&work, &["push", "-u", "origin", "feat/x"]);

    (dir, work, origin)
}

struct RecordingPrompter {
    answer: Option<&'static str>,
    notices: RefCell<Vec<(NoticeKind, String)>>,
}

impl RecordingPrompter {
    fn new(answer: Option<&'static str>) -> Self {
        Self { answer, notices: RefCell::new(vec![]) }
    }
}

impl Prompter for RecordingPrompter {
    fn commit_message(&self, _default: &str) -> Option<String> {
        self.answer.map(String::from)
    }
    fn notify(&self, kind: NoticeKind, _title: &str, message: &str) {
        self.notices.borrow_mut().push((kind, message.to_string()));
    }
}

fn merge(work: &Path, prompter: &RecordingPrompter, target: &str) -> (RunOutcome, Vec<LogEvent>) {
    let gateway = GitCli::open(work).unwrap();
    let (tx, rx) = mpsc::channel();
    let outcome = orchestrator::execute(
        &Collaborators { gateway: &gateway, prompter, sink: &tx },
        target,
    )
    .unwrap();
    drop(tx);
    (outcome, rx.into_iter().collect())
}

fn finished(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Finished(report) => report,
        other => panic!("expected a finished run, got {:?}", other),
    }
}

fn origin_log(origin: &Path, branch: &str) -> String {
    git(origin, &["log", "--oneline", branch])
}

// ── successful runs ───────────────────────────────────────────────────────

#[test]
fn test_uncommitted_changes_are_committed_merged_and_pushed() {
    let (_dir, work, origin) = make_repo_with_origin();
    std::fs::write(work.join("wip.txt"), "work in progress\n").unwrap();

    let prompter = RecordingPrompter::new(Some("wip: pending change"));
    let (outcome, events) = merge(&work, &prompter, "dev");
    let report = finished(outcome);

    assert!(report.success, "journal:\n{}", render::to_plain_text(&report.journal));
    assert_eq!(
        report.journal.kinds(),
        vec![
            StepKind::Commit,
            StepKind::PushCurrent,
            StepKind::FetchTarget,
            StepKind::CheckoutTarget,
            StepKind::PullTarget,
            StepKind::MergeIntoTarget,
            StepKind::PushTarget,
            StepKind::CheckoutBack,
        ]
    );
    assert!(!report.journal.has_error());

    let gateway = GitCli::open(&work).unwrap();
    assert_eq!(gateway.current_branch().unwrap(), "feat/x", "run must end on the original branch");
    assert!(!gateway.has_uncommitted_changes().unwrap());

    let dev_log = origin_log(&origin, "dev");
    assert!(dev_log.contains("wip: pending change"), "origin/dev log:\n{}", dev_log);
    assert!(dev_log.contains("feature work"));
    assert!(origin_log(&origin, "feat/x").contains("wip: pending change"));

    assert!(matches!(events.last(), Some(LogEvent::RunFinished { success: true })));
}

#[test]
fn test_unpushed_commits_are_pushed_before_merge() {
    let (_dir, work, origin) = make_repo_with_origin();
    commit_file(&work, "more.txt", "more\n", "local only commit");

    let gateway = GitCli::open(&work).unwrap();
    assert_eq!(probe::probe(&gateway).unwrap().ahead, AheadCount::Known(1));

    let prompter = RecordingPrompter::new(None);
    let (outcome, _) = merge(&work, &prompter, "dev");
    let report = finished(outcome);

    assert!(report.success);
    assert!(report.journal.find(StepKind::Commit).is_none());
    assert!(origin_log(&origin, "feat/x").contains("local only commit"));
    assert!(origin_log(&origin, "dev").contains("local only commit"));
}

#[test]
fn test_new_branch_without_remote_is_pushed_with_upstream() {
    let (_dir, work, origin) = make_repo_with_origin();
    git(&work, &["checkout", "-b", "feat/new"]);
    commit_file(&work, "new.txt", "new\n", "brand new branch");

    let gateway = GitCli::open(&work).unwrap();
    assert_eq!(probe::probe(&gateway).unwrap().ahead, AheadCount::Unknown);

    let prompter = RecordingPrompter::new(None);
    let (outcome, _) = merge(&work, &prompter, "dev");
    let report = finished(outcome);

    assert!(report.success, "journal:\n{}", render::to_plain_text(&report.journal));
    assert!(report.journal.find(StepKind::PushCurrent).unwrap().label.contains("--set-upstream"));
    assert!(origin_log(&origin, "feat/new").contains("brand new branch"));

    let upstream = git(&work, &["rev-parse", "--abbrev-ref", "feat/new@{upstream}"]);
    assert_eq!(upstream.trim(), "origin/feat/new");
    assert_eq!(probe::probe(&gateway).unwrap().ahead, AheadCount::Known(0));
}

// ── no-ops and cancellation ───────────────────────────────────────────────

#[test]
fn test_clean_synced_branch_is_noop() {
    let (_dir, work, _origin) = make_repo_with_origin();
    let prompter = RecordingPrompter::new(Some("unused"));
    let (outcome, events) = merge(&work, &prompter, "dev");

    assert_eq!(outcome, RunOutcome::NoOp(NoOpReason::AlreadyInSync));
    assert!(events.is_empty());
    assert_eq!(prompter.notices.borrow().len(), 1);
}

#[test]
fn test_on_target_branch_is_noop() {
    let (_dir, work, _origin) = make_repo_with_origin();
    git(&work, &["checkout", "dev"]);
    std::fs::write(work.join("dirty.txt"), "x").unwrap();

    let prompter = RecordingPrompter::new(Some("unused"));
    let (outcome, _) = merge(&work, &prompter, "dev");
    assert_eq!(outcome, RunOutcome::NoOp(NoOpReason::SameBranch));
    assert!(work.join("dirty.txt").exists(), "nothing may be committed");
}

#[test]
fn test_declined_prompt_leaves_repo_untouched() {
    let (_dir, work, _origin) = make_repo_with_origin();
    std::fs::write(work.join("wip.txt"), "x").unwrap();
    let head_before = git(&work, &["rev-parse", "HEAD"]);

    let prompter = RecordingPrompter::new(None);
    let (outcome, events) = merge(&work, &prompter, "dev");

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(events.is_empty());
    assert!(prompter.notices.borrow().is_empty());
    assert_eq!(git(&work, &["rev-parse", "HEAD"]), head_before);
    assert!(GitCli::open(&work).unwrap().has_uncommitted_changes().unwrap());
}

// ── failures ──────────────────────────────────────────────────────────────

#[test]
fn test_conflicting_merge_stays_on_target() {
    let (_dir, work, origin) = make_repo_with_origin();

    // dev moves README one way on the remote...
    git(&work, &["checkout", "dev"]);
    commit_file(&work, "README.md", "dev version\n", "dev edits readme");
    git(&work, &["push", "origin", "dev"]);
    git(&work, &["reset", "--hard", "HEAD~1"]);

    // ...and the feature branch moves it another way.
    git(&work, &["checkout", "feat/x"]);
    commit_file(&work, "README.md", "feature version\n", "feature edits readme");

    let prompter = RecordingPrompter::new(None);
    let (outcome, _) = merge(&work, &prompter, "dev");
    let report = finished(outcome);

    assert!(!report.success);
    assert_eq!(report.failed_step, Some(StepKind::MergeIntoTarget));
    let merge_entry = report.journal.find(StepKind::MergeIntoTarget).unwrap();
    assert!(merge_entry.output.contains("CONFLICT"), "merge output: {}", merge_entry.output);
    assert!(report.journal.find(StepKind::CheckoutBack).is_none());
    assert!(report.journal.find(StepKind::PushTarget).is_none());

    let gateway = GitCli::open(&work).unwrap();
    assert_eq!(gateway.current_branch().unwrap(), "dev", "conflicted tree stays on the target");
    assert!(!origin_log(&origin, "dev").contains("feature edits readme"));
    assert!(origin_log(&origin, "feat/x").contains("feature edits readme"), "source commits are already pushed");

    let notices = prompter.notices.borrow();
    assert_eq!(notices[0].0, NoticeKind::Error);
    assert!(notices[0].1.contains("resolve conflicts manually"));
}

#[test]
fn test_missing_target_on_remote_fails_at_fetch() {
    let (_dir, work, _origin) = make_repo_with_origin();
    commit_file(&work, "more.txt", "more\n", "local only commit");

    let prompter = RecordingPrompter::new(None);
    let (outcome, _) = merge(&work, &prompter, "no-such-branch");
    let report = finished(outcome);

    assert_eq!(report.failed_step, Some(StepKind::FetchTarget));
    assert!(report.journal.find(StepKind::FetchTarget).unwrap().has_output());
    assert_eq!(GitCli::open(&work).unwrap().current_branch().unwrap(), "feat/x");
}

#[test]
fn test_plain_text_summary_counts_every_entry() {
    let (_dir, work, _origin) = make_repo_with_origin();
    std::fs::write(work.join("wip.txt"), "x").unwrap();

    let prompter = RecordingPrompter::new(Some(""));
    let (outcome, _) = merge(&work, &prompter, "dev");
    let report = finished(outcome);

    let text = render::to_plain_text(&report.journal);
    assert_eq!(render::count_plain_entries(&text), report.journal.len());
    let log = git(&work, &["log", "--oneline", "-5"]);
    assert!(log.contains("auto commit before merge to dev"), "blank message uses default:\n{}", log);
}

#[test]
fn test_merge_command_targets_the_configured_branch() {
    let (dir, work, origin) = make_repo_with_origin();
    std::fs::write(work.join("wip.txt"), "x").unwrap();
    let settings = MemorySettings::new("main").unwrap();
    let html = dir.path().join("summary.html");

    let succeeded = merge_command::run(
        &work,
        &settings,
        MergeOptions {
            target: None,
            commit_message: CommitMessageSource::Given("ship it".into()),
            summary: None,
            html_out: Some(html.clone()),
            timeout: DEFAULT_TIMEOUT,
        },
    )
    .unwrap();

    assert!(succeeded);
    assert!(origin_log(&origin, "main").contains("ship it"));
    assert!(!origin_log(&origin, "dev").contains("ship it"), "dev is not the configured target");
    let page = std::fs::read_to_string(&html).unwrap();
    assert!(page.contains("git pull --no-rebase --no-edit origin main"));
    assert!(page.contains("all operations succeeded"));
}
