//! Repository state snapshot taken before any mutating step of a run.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::gateway::Gateway;

/// Commits on the current branch that its remote counterpart lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AheadCount {
    Known(u64),
    /// Remote branch missing or the comparison failed.
    Unknown,
}

impl AheadCount {
    /// Parse `rev-list --count` output. Garbage degrades to zero.
    pub fn from_rev_list(stdout: &str) -> Self {
        match stdout.trim().parse::<u64>() {
            Ok(n) => AheadCount::Known(n),
            Err(_) => {
                tracing::warn!(output = %stdout.trim(), "unparseable rev-list count, assuming 0");
                AheadCount::Known(0)
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, AheadCount::Known(0))
    }

    /// Unknown counts as ahead.
    pub fn may_be_ahead(&self) -> bool {
        !self.is_zero()
    }
}

impl std::fmt::Display for AheadCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AheadCount::Known(n) => write!(f, "{}", n),
            AheadCount::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryState {
    pub current_branch: String,
    pub has_uncommitted_changes: bool,
    pub ahead: AheadCount,
}

/// Probe the repository, reading the current branch from the gateway.
pub fn probe(gateway: &dyn Gateway) -> Result<RepositoryState> {
    let current = gateway.current_branch()?;
    probe_branch(gateway, &current)
}

/// Probe with an already known current branch.
///
/// Issues a silent fetch of the branch first so the ahead count compares
/// against fresh remote refs; a failed fetch leaves the count possibly stale.
pub fn probe_branch(gateway: &dyn Gateway, current_branch: &str) -> Result<RepositoryState> {
    if current_branch.trim().is_empty() {
        bail!("Current branch name is empty");
    }

    match gateway.fetch_silent(current_branch) {
        Ok(out) if out.success => {}
        Ok(out) => tracing::debug!(branch = current_branch, output = %out.combined(), "silent fetch failed"),
        Err(e) => tracing::debug!(branch = current_branch, error = %e, "silent fetch could not run"),
    }

    let ahead = match gateway.rev_list_count(current_branch) {
        Ok(out) if out.success => AheadCount::from_rev_list(&out.stdout),
        Ok(out) => {
            tracing::debug!(branch = current_branch, output = %out.combined(), "no remote tracking branch");
            AheadCount::Unknown
        }
        Err(e) => {
            tracing::debug!(branch = current_branch, error = %e, "rev-list could not run");
            AheadCount::Unknown
        }
    };

    let has_uncommitted_changes = gateway.has_uncommitted_changes()?;

    Ok(RepositoryState {
        current_branch: current_branch.to_string(),
        has_uncommitted_changes,
        ahead,
    })
}
