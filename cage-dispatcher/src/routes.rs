//! HTTP handlers: the dispatcher's entire outward surface.

use std::net::SocketAddr;
use std::path::Path;

use axum::extract::{ConnectInfo, Path as AxPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cage_runtime::classifier::{self, CommandCategory};
use cage_runtime::gh_classifier::{self, GhCommandCategory};
use cage_runtime::{executor, gh_exec, hooks, paths, policy};

use crate::models::{
    BranchQuery, DeletePodQuery, ErrorResponse, GhRequest, GitRequest, HealthResponse,
    PodCreateRequest, RegisterResponse, RegistryResponse,
};
use crate::responses::{command_result, denial};
use crate::state::AppState;

/// The path the agent believes its repository lives at, matching the
/// sandbox image's fixed mount point.
const AGENT_WORKSPACE: &str = "/home/dev/workspace";

fn client_ip(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: state.config.version.clone(),
        commit_footer: state.config.commit_footer.clone(),
    })
}

pub async fn register_pod(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<BranchQuery>,
) -> impl IntoResponse {
    let ip = client_ip(&addr);
    state.registry.register(ip.clone(), query.branch.clone());
    Json(RegisterResponse {
        status: "registered",
        ip,
        branch: Some(query.branch),
    })
}

pub async fn deregister_pod(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let ip = client_ip(&addr);
    let found = state.registry.deregister(&ip).is_some();
    Json(RegisterResponse {
        status: if found { "deregistered" } else { "not_found" },
        ip,
        branch: None,
    })
}

pub async fn list_registry(State(state): State<AppState>) -> impl IntoResponse {
    Json(RegistryResponse {
        registry: state.registry.list_all(),
    })
}

pub async fn bootstrap(
    State(state): State<AppState>,
    Query(query): Query<BranchQuery>,
) -> impl IntoResponse {
    let branch = query.branch;
    tracing::info!(branch, "bootstrap requested");

    let workspace_path = Path::new(&state.config.workspace_root).join(&branch);
    if let Err(err) = tokio::fs::create_dir_all(&workspace_path).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("failed to prepare workspace directory: {err}"),
            }),
        )
            .into_response();
    }

    let lock = state.branch_lock(&branch);
    let _guard = lock.lock().await;

    match cage_runtime::bootstrap::bootstrap_workspace(&workspace_path, &branch, state.config).await
    {
        Ok(outcome) => {
            tracing::info!(branch, outcome = outcome.label(), "bootstrap complete");
            Json(serde_json::json!({ "status": outcome.label(), "branch": branch })).into_response()
        }
        Err(err) => {
            tracing::error!(branch, error = %err, "bootstrap failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn handle_git(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<GitRequest>,
) -> Response {
    let ip = client_ip(&addr);
    let Some(assigned_branch) = state.registry.get_branch(&ip) else {
        tracing::warn!(ip, "unregistered pod attempted git operation");
        return (
            StatusCode::FORBIDDEN,
            "yolo-cage: pod not registered. Contact cluster admin.",
        )
            .into_response();
    };

    let cwd = paths::translate_cwd(
        &request.cwd,
        AGENT_WORKSPACE,
        &state.config.workspace_root,
        &assigned_branch,
    );
    tracing::info!(ip, branch = %assigned_branch, args = ?request.args, "git");

    let lock = state.branch_lock(&assigned_branch);
    let _guard = lock.lock().await;

    let (category, deny_message) = classifier::classify(&request.args);

    match category {
        CommandCategory::Denied => denial(format!("{}\n", deny_message.unwrap_or_default())),
        CommandCategory::Unknown => {
            denial("yolo-cage: unrecognized or disallowed git operation\n")
        }
        CommandCategory::Branch => {
            let warning = match policy::check_branch_switch(&request.args, &assigned_branch) {
                policy::PolicyDecision::Warn(message) => Some(message),
                _ => None,
            };
            let result = executor::execute(&request.args, &cwd, state.config).await;
            let mut output = result.stdout;
            output.push_str(&result.stderr);
            let output = match warning {
                Some(warning) => format!("{warning}\n{output}"),
                None => output,
            };
            command_result(output, result.exit_code)
        }
        CommandCategory::Merge => {
            let current = executor::current_branch(&cwd).await;
            let cmd = classifier::get_subcommand(&request.args).unwrap_or("merge");
            match policy::check_merge_allowed(current.as_deref(), &assigned_branch, cmd) {
                policy::PolicyDecision::Deny(message) => denial(message),
                _ => {
                    let result = executor::execute(&request.args, &cwd, state.config).await;
                    command_result(result.combined_output(), result.exit_code)
                }
            }
        }
        CommandCategory::RemoteWrite => {
            let current = executor::current_branch(&cwd).await;
            match policy::check_push_allowed(&request.args, current.as_deref(), &assigned_branch) {
                policy::PolicyDecision::Deny(message) => denial(message),
                _ => {
                    let (hooks_ok, hook_output) =
                        hooks::run_pre_push_hooks(&cwd, &state.config.pre_push_hooks).await;
                    if !hooks_ok {
                        return denial(format!(
                            "yolo-cage: push rejected by pre-push hooks\n\n{hook_output}"
                        ));
                    }
                    let result = executor::execute_with_auth(&request.args, &cwd, state.config).await;
                    command_result(result.combined_output(), result.exit_code)
                }
            }
        }
        CommandCategory::RemoteRead => {
            let result = executor::execute_with_auth(&request.args, &cwd, state.config).await;
            command_result(result.combined_output(), result.exit_code)
        }
        CommandCategory::Local => {
            let result = executor::execute(&request.args, &cwd, state.config).await;
            command_result(result.combined_output(), result.exit_code)
        }
    }
}

pub async fn handle_gh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<GhRequest>,
) -> Response {
    let ip = client_ip(&addr);
    let Some(assigned_branch) = state.registry.get_branch(&ip) else {
        tracing::warn!(ip, "unregistered pod attempted gh operation");
        return (
            StatusCode::FORBIDDEN,
            "yolo-cage: pod not registered. Contact cluster admin.",
        )
            .into_response();
    };

    let cwd = paths::translate_cwd(
        &request.cwd,
        AGENT_WORKSPACE,
        &state.config.workspace_root,
        &assigned_branch,
    );
    tracing::info!(ip, branch = %assigned_branch, args = ?request.args, "gh");

    let lock = state.branch_lock(&assigned_branch);
    let _guard = lock.lock().await;

    let (category, deny_message) = gh_classifier::classify_gh(&request.args);

    match category {
        GhCommandCategory::Blocked => denial(format!("{}\n", deny_message.unwrap_or_default())),
        GhCommandCategory::Unknown => {
            denial("yolo-cage: unrecognized or disallowed gh operation\n")
        }
        GhCommandCategory::Allowed => {
            let result = gh_exec::execute(
                &request.args,
                &cwd,
                state.config,
                &request.files,
                request.stdin_content.as_deref(),
            )
            .await;
            command_result(result.combined_output(), result.exit_code)
        }
    }
}

pub async fn create_pod(
    State(state): State<AppState>,
    Json(request): Json<PodCreateRequest>,
) -> impl IntoResponse {
    match state.pod_runtime.create_pod(&request.branch).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn list_pods(State(state): State<AppState>) -> impl IntoResponse {
    match state.pod_runtime.list_pods().await {
        Ok(pods) => Json(serde_json::json!({ "pods": pods })).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn get_pod(
    State(state): State<AppState>,
    AxPath(branch): AxPath<String>,
) -> impl IntoResponse {
    match state.pod_runtime.get_pod(&branch).await {
        Ok(Some(pod)) => Json(pod).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no pod found for branch '{branch}'"),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn delete_pod(
    State(state): State<AppState>,
    AxPath(branch): AxPath<String>,
    Query(query): Query<DeletePodQuery>,
) -> impl IntoResponse {
    match state.pod_runtime.delete_pod(&branch).await {
        Ok(true) => {
            if query.clean {
                let workspace_path = Path::new(&state.config.workspace_root).join(&branch);
                if let Err(err) = tokio::fs::remove_dir_all(&workspace_path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(branch, error = %err, "failed to clean workspace after pod delete");
                    }
                }
            }
            Json(serde_json::json!({ "status": "deleted", "branch": branch })).into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no pod found for branch '{branch}'"),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}
