//! `gh` CLI execution: authenticated environment plus `--body-file`
//! rewriting so large text bodies never round-trip through argv.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::DispatcherConfig;
use crate::executor::GitResult;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

fn base_env() -> Vec<(&'static str, String)> {
    vec![
        ("GH_PROMPT_DISABLED", "1".to_string()),
        ("GIT_CONFIG_COUNT", "1".to_string()),
        ("GIT_CONFIG_KEY_0", "safe.directory".to_string()),
        ("GIT_CONFIG_VALUE_0", "*".to_string()),
    ]
}

/// Temporary file materialized for a transmitted `--body-file` payload;
/// removed on drop regardless of how the enclosing request exits.
struct TempBodyFile {
    path: PathBuf,
}

impl TempBodyFile {
    async fn write(content: &str) -> std::io::Result<Self> {
        let path =
            std::env::temp_dir().join(format!("gh-body-{}.md", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, content).await?;
        Ok(Self { path })
    }
}

impl Drop for TempBodyFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Rewrite `--body-file <path>` arguments that reference a transmitted
/// file (or stdin, via the conventional `-` path) into a locally
/// materialized temp file. Returns the rewritten argv and the guards
/// that delete the temp files when dropped.
async fn rewrite_args_with_temp_files(
    args: &[String],
    files: &HashMap<String, String>,
    stdin_content: Option<&str>,
) -> std::io::Result<(Vec<String>, Vec<TempBodyFile>)> {
    let mut new_args = Vec::with_capacity(args.len());
    let mut temp_files = Vec::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        if arg == "--body-file" && i + 1 < args.len() {
            let filepath = &args[i + 1];

            if filepath == "-" {
                if let Some(content) = stdin_content {
                    let temp = TempBodyFile::write(content).await?;
                    new_args.push("--body-file".to_string());
                    new_args.push(temp.path.display().to_string());
                    temp_files.push(temp);
                    i += 2;
                    continue;
                }
            } else if let Some(content) = files.get(filepath) {
                let temp = TempBodyFile::write(content).await?;
                new_args.push("--body-file".to_string());
                new_args.push(temp.path.display().to_string());
                temp_files.push(temp);
                i += 2;
                continue;
            }
        }

        new_args.push(arg.clone());
        i += 1;
    }

    Ok((new_args, temp_files))
}

/// Execute a `gh` command with authentication and `--body-file` rewriting.
pub async fn execute(
    args: &[String],
    cwd: &Path,
    config: &DispatcherConfig,
    files: &HashMap<String, String>,
    stdin_content: Option<&str>,
) -> GitResult {
    let mut env = base_env();
    if !config.github_pat.is_empty() {
        env.push(("GITHUB_TOKEN", config.github_pat.clone()));
        env.push(("GH_TOKEN", config.github_pat.clone()));
    }

    let (exec_args, _temp_files) = match rewrite_args_with_temp_files(args, files, stdin_content).await
    {
        Ok(result) => result,
        Err(err) => {
            return GitResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("yolo-cage: failed to stage gh body file: {err}"),
            };
        }
    };

    let mut command = Command::new("gh");
    command
        .args(&exec_args)
        .current_dir(cwd)
        .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = match tokio::time::timeout(COMMAND_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return GitResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: "yolo-cage: gh CLI not installed".to_string(),
            };
        }
        Ok(Err(err)) => {
            return GitResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("yolo-cage: failed to execute gh: {err}"),
            };
        }
        Err(_) => {
            return GitResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: "yolo-cage: gh command timed out after 5 minutes".to_string(),
            };
        }
    };

    // _temp_files drops here, after the process has exited, cleaning up
    // every temp file created for this invocation.
    GitResult {
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
