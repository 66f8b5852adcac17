//! Workspace bootstrap: bring a freshly mounted pod filesystem to a state
//! where the agent's assigned branch is checked out, regardless of what
//! was already sitting on the volume.
//!
//! Three starting states, each handled differently:
//!
//! - **empty** — nothing on disk yet: authenticated clone, then checkout
//!   (creating the branch if the remote doesn't have it).
//! - **has metadata** (`.git` already present, e.g. a restarted pod reusing
//!   its volume) — authenticated fetch (a fetch failure is a warning, not
//!   fatal: the existing working tree is still usable offline), then
//!   compare/switch the current branch.
//! - **has files, no metadata** (a volume seeded with a tarball of source
//!   but never `git init`-ed) — `git init`, add the remote, authenticated
//!   fetch (fatal here: there is no working tree to fall back on without
//!   it), then reset onto the branch if the remote has it, or commit the
//!   existing files as the start of a new branch.

use std::path::Path;

use crate::config::DispatcherConfig;
use crate::executor::{self, GitResult};

/// Which of the three starting states produced the outcome, and what
/// bootstrap did about it. Mirrors the original's human-readable labels
/// so operators' dashboards built against those strings keep working.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    CheckedOut,
    Created,
    AlreadyOnBranch,
    SwitchedBranch,
    InitializedFromRemote,
    InitializedNewBranch,
}

impl BootstrapOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            BootstrapOutcome::CheckedOut => "checked_out",
            BootstrapOutcome::Created => "created",
            BootstrapOutcome::AlreadyOnBranch => "already_on_branch",
            BootstrapOutcome::SwitchedBranch => "switched_branch",
            BootstrapOutcome::InitializedFromRemote => "initialized_from_remote",
            BootstrapOutcome::InitializedNewBranch => "initialized_new_branch",
        }
    }
}

fn args(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

async fn workspace_state(cwd: &Path) -> WorkspaceState {
    if cwd.join(".git").exists() {
        return WorkspaceState::HasMetadata;
    }
    match tokio::fs::read_dir(cwd).await {
        Ok(mut entries) => {
            if entries.next_entry().await.ok().flatten().is_some() {
                WorkspaceState::HasFilesNoMetadata
            } else {
                WorkspaceState::Empty
            }
        }
        Err(_) => WorkspaceState::Empty,
    }
}

enum WorkspaceState {
    Empty,
    HasMetadata,
    HasFilesNoMetadata,
}

async fn branch_exists_locally(cwd: &Path, branch: &str, config: &DispatcherConfig) -> bool {
    let result = executor::execute(
        &args(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")]),
        cwd,
        config,
    )
    .await;
    result.exit_code == 0
}

async fn branch_exists_on_remote(cwd: &Path, branch: &str, config: &DispatcherConfig) -> bool {
    let result = executor::execute(
        &args(&["ls-remote", "--exit-code", "--heads", "origin", branch]),
        cwd,
        config,
    )
    .await;
    result.exit_code == 0
}

/// Parse the "HEAD branch: <name>" line out of `git remote show origin`;
/// fall back to `main` if it can't be determined.
async fn default_remote_branch(cwd: &Path, config: &DispatcherConfig) -> String {
    let result = executor::execute_with_auth(&args(&["remote", "show", "origin"]), cwd, config).await;
    result
        .stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("HEAD branch: "))
        .map(str::to_string)
        .unwrap_or_else(|| "main".to_string())
}

async fn switch_to_branch(
    cwd: &Path,
    branch: &str,
    config: &DispatcherConfig,
) -> GitResult {
    if branch_exists_locally(cwd, branch, config).await {
        executor::execute(&args(&["checkout", branch]), cwd, config).await
    } else if branch_exists_on_remote(cwd, branch, config).await {
        executor::execute(
            &args(&["checkout", "-b", branch, "--track", &format!("origin/{branch}")]),
            cwd,
            config,
        )
        .await
    } else {
        executor::execute(&args(&["checkout", "-b", branch]), cwd, config).await
    }
}

async fn bootstrap_empty(
    cwd: &Path,
    branch: &str,
    config: &DispatcherConfig,
) -> crate::error::Result<BootstrapOutcome> {
    let clone_result = executor::execute_with_auth(
        &args(&["clone", &config.repo_url, "."]),
        cwd,
        config,
    )
    .await;
    if clone_result.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "clone failed: {}",
            clone_result.combined_output()
        )));
    }

    let existed_on_remote = branch_exists_on_remote(cwd, branch, config).await;
    let switch = switch_to_branch(cwd, branch, config).await;
    if switch.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "checkout failed: {}",
            switch.combined_output()
        )));
    }

    Ok(if existed_on_remote {
        BootstrapOutcome::CheckedOut
    } else {
        BootstrapOutcome::Created
    })
}

async fn bootstrap_has_metadata(
    cwd: &Path,
    branch: &str,
    config: &DispatcherConfig,
) -> crate::error::Result<BootstrapOutcome> {
    let fetch = executor::execute_with_auth(&args(&["fetch", "origin"]), cwd, config).await;
    if fetch.exit_code != 0 {
        tracing::warn!(
            branch,
            output = %fetch.combined_output(),
            "fetch failed while reusing existing workspace metadata; continuing offline"
        );
    }

    let current = executor::current_branch(cwd).await;
    if current.as_deref() == Some(branch) {
        return Ok(BootstrapOutcome::AlreadyOnBranch);
    }

    let switch = switch_to_branch(cwd, branch, config).await;
    if switch.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "branch switch failed: {}",
            switch.combined_output()
        )));
    }
    Ok(BootstrapOutcome::SwitchedBranch)
}

async fn bootstrap_has_files_no_metadata(
    cwd: &Path,
    branch: &str,
    config: &DispatcherConfig,
) -> crate::error::Result<BootstrapOutcome> {
    let init = executor::execute(&args(&["init"]), cwd, config).await;
    if init.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "git init failed: {}",
            init.combined_output()
        )));
    }

    let remote_add =
        executor::execute(&args(&["remote", "add", "origin", &config.repo_url]), cwd, config).await;
    if remote_add.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "adding remote failed: {}",
            remote_add.combined_output()
        )));
    }

    let fetch = executor::execute_with_auth(&args(&["fetch", "origin"]), cwd, config).await;
    if fetch.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "fetch failed: {}",
            fetch.combined_output()
        )));
    }

    if branch_exists_on_remote(cwd, branch, config).await {
        // Mixed reset first: moves HEAD/index to origin/branch's tree but
        // leaves the working tree untouched, so whatever was already on
        // disk shows up as uncommitted modifications rather than being
        // clobbered by checkout. The follow-up checkout then only needs to
        // establish proper branch tracking, not move any files.
        let reset = executor::execute(
            &args(&["reset", &format!("origin/{branch}")]),
            cwd,
            config,
        )
        .await;
        if reset.exit_code != 0 {
            return Err(crate::error::CageError::Bootstrap(format!(
                "reset to origin/{branch} failed: {}",
                reset.combined_output()
            )));
        }

        let checkout = executor::execute(
            &args(&["checkout", "-B", branch, &format!("origin/{branch}")]),
            cwd,
            config,
        )
        .await;
        if checkout.exit_code != 0 {
            return Err(crate::error::CageError::Bootstrap(format!(
                "checkout from remote branch failed: {}",
                checkout.combined_output()
            )));
        }
        return Ok(BootstrapOutcome::InitializedFromRemote);
    }

    let default_branch = default_remote_branch(cwd, config).await;
    let base = executor::execute(
        &args(&["checkout", "-b", &default_branch, "--track", &format!("origin/{default_branch}")]),
        cwd,
        config,
    )
    .await;
    if base.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "checkout of default branch failed: {}",
            base.combined_output()
        )));
    }

    let new_branch = executor::execute(&args(&["checkout", "-b", branch]), cwd, config).await;
    if new_branch.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "creating new branch failed: {}",
            new_branch.combined_output()
        )));
    }

    let add = executor::execute(&args(&["add", "-A"]), cwd, config).await;
    if add.exit_code != 0 {
        return Err(crate::error::CageError::Bootstrap(format!(
            "staging existing files failed: {}",
            add.combined_output()
        )));
    }

    let commit = executor::execute(
        &args(&["commit", "-m", "Initial import of existing workspace files"]),
        cwd,
        config,
    )
    .await;
    if commit.exit_code != 0 && !commit.combined_output().contains("nothing to commit") {
        return Err(crate::error::CageError::Bootstrap(format!(
            "committing existing files failed: {}",
            commit.combined_output()
        )));
    }

    Ok(BootstrapOutcome::InitializedNewBranch)
}

/// Bring `cwd` to a state where `branch` is checked out, regardless of
/// whatever was already on disk.
pub async fn bootstrap_workspace(
    cwd: &Path,
    branch: &str,
    config: &DispatcherConfig,
) -> crate::error::Result<BootstrapOutcome> {
    match workspace_state(cwd).await {
        WorkspaceState::Empty => bootstrap_empty(cwd, branch, config).await,
        WorkspaceState::HasMetadata => bootstrap_has_metadata(cwd, branch, config).await,
        WorkspaceState::HasFilesNoMetadata => {
            bootstrap_has_files_no_metadata(cwd, branch, config).await
        }
    }
}
