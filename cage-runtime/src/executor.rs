//! Invokes `git` with a scoped environment, enforced timeout, and an
//! optionally-authenticated credential helper materialized per invocation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::DispatcherConfig;

/// Hard timeout for a single git invocation (spec §5).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for the lightweight `rev-parse --abbrev-ref HEAD` probe.
const CURRENT_BRANCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a git invocation: combined stdout/stderr plus exit code.
/// Failure modes (timeout, missing binary, other) are folded into a
/// synthetic non-zero result rather than propagated as an error — the
/// dispatcher's outward contract has no room for anything but (body, code).
#[derive(Clone, Debug)]
pub struct GitResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitResult {
    fn synthetic(message: impl Into<String>) -> Self {
        GitResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: message.into(),
        }
    }

    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Build the fixed environment overrides every git invocation gets:
/// author/committer identity, disabled interactive prompts, and the
/// `safe.directory=*` trick (the pod runtime may create the mount root
/// under a different uid than the dispatcher runs as).
fn base_env(config: &DispatcherConfig) -> Vec<(&'static str, String)> {
    vec![
        ("GIT_AUTHOR_NAME", config.git_user_name.clone()),
        ("GIT_AUTHOR_EMAIL", config.git_user_email.clone()),
        ("GIT_COMMITTER_NAME", config.git_user_name.clone()),
        ("GIT_COMMITTER_EMAIL", config.git_user_email.clone()),
        ("GIT_TERMINAL_PROMPT", "0".to_string()),
        ("GIT_CONFIG_COUNT", "1".to_string()),
        ("GIT_CONFIG_KEY_0", "safe.directory".to_string()),
        ("GIT_CONFIG_VALUE_0", "*".to_string()),
    ]
}

async fn run_git(args: &[String], cwd: &Path, env: &[(&'static str, String)]) -> GitResult {
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(cwd)
        .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = match tokio::time::timeout(COMMAND_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return GitResult::synthetic("yolo-cage: git binary not installed");
        }
        Ok(Err(err)) => {
            return GitResult::synthetic(format!("yolo-cage: failed to execute git: {err}"));
        }
        Err(_) => {
            return GitResult::synthetic("yolo-cage: git command timed out after 5 minutes");
        }
    };

    GitResult {
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Execute a git command with no authentication.
pub async fn execute(args: &[String], cwd: &Path, config: &DispatcherConfig) -> GitResult {
    run_git(args, cwd, &base_env(config)).await
}

/// Materialize a per-invocation credential-helper script, unique by
/// filename suffix (spec §9 redesign: the source used a fixed
/// `/tmp/git-askpass.sh` path, which races under concurrency), and remove
/// it on every exit path.
struct AskpassScript {
    path: std::path::PathBuf,
}

impl AskpassScript {
    async fn write(pat: &str) -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("git-askpass-{}.sh", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, format!("#!/bin/sh\necho {pat}\n")).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(Self { path })
    }
}

impl Drop for AskpassScript {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Execute a git command with GitHub PAT authentication via `GIT_ASKPASS`.
pub async fn execute_with_auth(args: &[String], cwd: &Path, config: &DispatcherConfig) -> GitResult {
    let mut env = base_env(config);

    if config.github_pat.is_empty() {
        return run_git(args, cwd, &env).await;
    }

    let script = match AskpassScript::write(&config.github_pat).await {
        Ok(script) => script,
        Err(err) => {
            return GitResult::synthetic(format!(
                "yolo-cage: failed to prepare credential helper: {err}"
            ));
        }
    };
    env.push(("GIT_ASKPASS", script.path.display().to_string()));

    let result = run_git(args, cwd, &env).await;
    drop(script);
    result
}

/// Best-effort lookup of the current branch; `None` on detached HEAD or error.
pub async fn current_branch(cwd: &Path) -> Option<String> {
    let mut command = Command::new("git");
    command
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(CURRENT_BRANCH_TIMEOUT, command.output())
        .await
        .ok()?
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        None
    } else {
        Some(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            workspace_root: "/workspaces".into(),
            repo_url: String::new(),
            git_user_name: "yolo-cage".into(),
            git_user_email: "yolo-cage@localhost".into(),
            github_pat: String::new(),
            version: "0.2.0".into(),
            pre_push_hooks: vec![],
            commit_footer: String::new(),
        }
    }

    #[tokio::test]
    async fn status_on_a_fresh_repo_succeeds() {
        let dir = TempDir::new().unwrap();
        run_git(&["init".to_string()], dir.path(), &base_env(&config())).await;
        let result = execute(&["status".to_string(), "-s".to_string()], dir.path(), &config()).await;
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn missing_workspace_surfaces_nonzero_not_a_panic() {
        let result = execute(
            &["status".to_string()],
            Path::new("/nonexistent/workspace/path"),
            &config(),
        )
        .await;
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn askpass_script_is_removed_after_use() {
        let script = AskpassScript::write("fake-token").await.unwrap();
        let path = script.path.clone();
        assert!(path.exists());
        drop(script);
        assert!(!path.exists());
    }
}
