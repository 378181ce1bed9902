use anyhow::{bail, Context, Result};
use git2::{Repository, StatusOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period for the pipe reader threads once the child has exited.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Argument lists for the commands a run executes. Shared by [`GitCli`] and
/// the step labels so the transcript shows what actually ran.
pub fn fetch_args<'a>(remote: &'a str, branch: &'a str) -> Vec<&'a str> {
    vec!["fetch", remote, branch]
}

/// `--` keeps a file named like the branch from turning this into a path checkout.
pub fn checkout_args(branch: &str) -> Vec<&str> {
    vec!["checkout", branch, "--"]
}

pub fn pull_args<'a>(remote: &'a str, branch: &'a str) -> Vec<&'a str> {
    vec!["pull", "--no-rebase", "--no-edit", remote, branch]
}

pub fn merge_args(branch: &str) -> Vec<&str> {
    vec!["merge", branch, "--no-edit"]
}

pub fn push_args<'a>(remote: &'a str, branch: &'a str, set_upstream: bool) -> Vec<&'a str> {
    if set_upstream {
        vec!["push", "--set-upstream", remote, branch]
    } else {
        vec!["push", remote, branch]
    }
}

/// Result of one git invocation. A non-zero exit is data, not an `Err`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { success: true, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.into() }
    }

    /// Stdout followed by stderr, each trimmed, blank halves dropped.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Chain a second invocation's output after this one.
    fn then(mut self, next: GitOutput) -> Self {
        self.success = next.success;
        for (acc, more) in [(&mut self.stdout, next.stdout), (&mut self.stderr, next.stderr)] {
            if !more.is_empty() {
                if !acc.is_empty() && !acc.ends_with('\n') {
                    acc.push('\n');
                }
                acc.push_str(&more);
            }
        }
        self
    }
}

/// The version-control operations the merge workflow needs. Every method
/// acts on the single repository the gateway was opened for.
///
/// `Err` is reserved for not being able to talk to git at all (spawn
/// failure, broken pipes, unreadable repository).
pub trait Gateway {
    /// Name of the branch HEAD points at. Detached HEAD is an error.
    fn current_branch(&self) -> Result<String>;

    /// True iff the working tree or index has any pending change.
    fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Stage everything and commit with `message`.
    fn commit_all(&self, message: &str) -> Result<GitOutput>;

    fn fetch(&self, branch: &str) -> Result<GitOutput>;

    /// Same as [`Gateway::fetch`] but the caller does not surface the output.
    fn fetch_silent(&self, branch: &str) -> Result<GitOutput> {
        self.fetch(branch)
    }

    fn checkout(&self, branch: &str) -> Result<GitOutput>;

    fn pull(&self, branch: &str) -> Result<GitOutput>;

    /// Merge `branch` into the checked-out branch with `--no-edit`.
    /// Conflicts are reported as failure, never resolved.
    fn merge(&self, branch: &str) -> Result<GitOutput>;

    /// Push `branch` to the remote, optionally recording it as upstream.
    fn push(&self, branch: &str, set_upstream: bool) -> Result<GitOutput>;

    /// `git rev-list --count <remote>/<branch>..<branch>`, output unparsed.
    fn rev_list_count(&self, branch: &str) -> Result<GitOutput>;
}

/// [`Gateway`] backed by the `git` binary, with git2 for read-only queries.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    remote: String,
    timeout: Duration,
}

impl GitCli {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).context("Not inside a git repository")?;
        let workdir = repo.workdir().context("Bare repositories are not supported")?;
        Ok(Self {
            root: workdir.to_path_buf(),
            remote: DEFAULT_REMOTE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo(&self) -> Result<Repository> {
        Repository::open(&self.root)
            .with_context(|| format!("Failed to open repository at {}", self.root.display()))
    }

    /// Run `git -C <root> <args>` to completion or until the timeout expires.
    fn git(&self, args: &[&str]) -> Result<GitOutput> {
        let started = Instant::now();
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.root)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Helpers git spawns (ssh, remote helpers) join this group.
            cmd.process_group(0);
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to run `git {}`", args.join(" ")))?;

        let stdout_rx = spawn_reader(child.stdout.take());
        let stderr_rx = spawn_reader(child.stderr.take());

        let status = child
            .wait_timeout(self.timeout)
            .with_context(|| format!("Failed to wait for `git {}`", args.join(" ")))?;

        let timed_out = status.is_none();
        if timed_out {
            kill_process_group(&mut child);
        }

        let stdout = stdout_rx.recv_timeout(OUTPUT_COLLECTION_TIMEOUT).unwrap_or_default();
        let mut stderr = stderr_rx.recv_timeout(OUTPUT_COLLECTION_TIMEOUT).unwrap_or_default();

        let success = status.is_some_and(|s| s.success());
        if timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("[git killed after {}s timeout]", self.timeout.as_secs()));
        }

        tracing::debug!(
            args = %args.join(" "),
            success,
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "git finished"
        );

        Ok(GitOutput { success, stdout, stderr })
    }
}

/// Kill `child` and anything it started, then reap it.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            tracing::debug!(error = %e, "killpg failed");
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

impl Gateway for GitCli {
    fn current_branch(&self) -> Result<String> {
        let repo = self.repo()?;
        if repo.head_detached().unwrap_or(false) {
            bail!("HEAD is detached; check out a branch first");
        }
        let head = repo.head().context("No HEAD: is this a fresh repo?")?;
        head.shorthand()
            .map(|s| s.to_string())
            .context("HEAD is detached or has no name")
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let repo = self.repo()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts)).context("Failed to read working tree status")?;
        Ok(statuses.iter().any(|e| e.status() != git2::Status::CURRENT))
    }

    fn commit_all(&self, message: &str) -> Result<GitOutput> {
        let add = self.git(&["add", "-A"])?;
        if !add.success {
            return Ok(add);
        }
        let commit = self.git(&["commit", "-m", message])?;
        Ok(add.then(commit))
    }

    fn fetch(&self, branch: &str) -> Result<GitOutput> {
        self.git(&fetch_args(&self.remote, branch))
    }

    fn checkout(&self, branch: &str) -> Result<GitOutput> {
        self.git(&checkout_args(branch))
    }

    fn pull(&self, branch: &str) -> Result<GitOutput> {
        self.git(&pull_args(&self.remote, branch))
    }

    fn merge(&self, branch: &str) -> Result<GitOutput> {
        self.git(&merge_args(branch))
    }

    fn push(&self, branch: &str, set_upstream: bool) -> Result<GitOutput> {
        self.git(&push_args(&self.remote, branch, set_upstream))
    }

    fn rev_list_count(&self, branch: &str) -> Result<GitOutput> {
        let range = format!("{}/{}..{}", self.remote, branch, branch);
        self.git(&["rev-list", "--count", &range])
    }
}
