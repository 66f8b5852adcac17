//! Pre-push hook runner: configured shell commands run in order before a
//! push is allowed onto the network; first failure short-circuits.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const HOOK_TIMEOUT: Duration = Duration::from_secs(120);

struct HookResult {
    success: bool,
    output: String,
}

async fn run_single_hook(hook_cmd: &str, cwd: &Path) -> HookResult {
    tracing::info!(hook = hook_cmd, "running pre-push hook");

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(hook_cmd)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    match tokio::time::timeout(HOOK_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => HookResult {
            success: output.status.success(),
            output: format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
        },
        Ok(Err(err)) => HookResult {
            success: false,
            output: format!("Hook failed: {hook_cmd}: {err}"),
        },
        Err(_) => HookResult {
            success: false,
            output: format!("Hook timed out: {hook_cmd}"),
        },
    }
}

/// Run all configured pre-push hooks in order. Returns `(success,
/// combined_output)`. Empty configuration trivially succeeds.
pub async fn run_pre_push_hooks(cwd: &Path, hooks: &[String]) -> (bool, String) {
    if hooks.is_empty() {
        return (true, String::new());
    }

    let mut outputs = Vec::new();
    for hook_cmd in hooks {
        let result = run_single_hook(hook_cmd, cwd).await;
        if !result.output.is_empty() {
            outputs.push(result.output);
        }
        if !result.success {
            tracing::warn!(hook = hook_cmd.as_str(), "pre-push hook failed");
            return (false, outputs.join("\n"));
        }
    }

    (true, outputs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn empty_hook_list_is_trivial_success() {
        let dir = TempDir::new().unwrap();
        let (success, output) = run_pre_push_hooks(dir.path(), &[]).await;
        assert!(success);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn first_failing_hook_short_circuits_remaining_hooks() {
        let dir = TempDir::new().unwrap();
        let hooks = vec![
            "exit 1".to_string(),
            "echo should-not-run".to_string(),
        ];
        let (success, output) = run_pre_push_hooks(dir.path(), &hooks).await;
        assert!(!success);
        assert!(!output.contains("should-not-run"));
    }

    #[tokio::test]
    async fn all_hooks_passing_concatenates_output() {
        let dir = TempDir::new().unwrap();
        let hooks = vec!["echo one".to_string(), "echo two".to_string()];
        let (success, output) = run_pre_push_hooks(dir.path(), &hooks).await;
        assert!(success);
        assert!(output.contains("one"));
        assert!(output.contains("two"));
    }
}
