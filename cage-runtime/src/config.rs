//! Environment-driven configuration, loaded once and cached for the process lifetime.
//!
//! Mirrors the defaults of the original Python `config.py` exactly so that
//! deployments carrying over their ConfigMaps keep working unchanged.

use once_cell::sync::OnceCell;
use std::env;

/// Default trufflehog invocation used when `PRE_PUSH_HOOKS` is unset.
const DEFAULT_PRE_PUSH_HOOK: &str =
    "trufflehog git file://. --max-depth=10 --fail --no-update";

const DEFAULT_VERSION: &str = "0.2.0";

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub workspace_root: String,
    pub repo_url: String,
    pub git_user_name: String,
    pub git_user_email: String,
    pub github_pat: String,
    pub version: String,
    pub pre_push_hooks: Vec<String>,
    pub commit_footer: String,
}

static CONFIG: OnceCell<DispatcherConfig> = OnceCell::new();

impl DispatcherConfig {
    /// Load configuration from the environment. Cached after the first call.
    pub fn load() -> &'static DispatcherConfig {
        CONFIG.get_or_init(Self::from_env)
    }

    fn from_env() -> Self {
        let version =
            env::var("YOLO_CAGE_VERSION").unwrap_or_else(|_| DEFAULT_VERSION.to_string());

        let pre_push_hooks = env::var("PRE_PUSH_HOOKS")
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_else(|| vec![DEFAULT_PRE_PUSH_HOOK.to_string()]);

        let commit_footer = env::var("COMMIT_FOOTER")
            .unwrap_or_else(|_| format!("Built autonomously using yolo-cage v{version}"));

        DispatcherConfig {
            workspace_root: env::var("WORKSPACE_ROOT").unwrap_or_else(|_| "/workspaces".into()),
            repo_url: env::var("REPO_URL").unwrap_or_default(),
            git_user_name: env::var("GIT_USER_NAME").unwrap_or_else(|_| "yolo-cage".into()),
            git_user_email: env::var("GIT_USER_EMAIL")
                .unwrap_or_else(|_| "yolo-cage@localhost".into()),
            github_pat: env::var("GITHUB_PAT").unwrap_or_default(),
            version,
            pre_push_hooks,
            commit_footer,
        }
    }
}
