//! Sandbox lifecycle manager: create/list/get/delete a per-branch sandbox
//! against an abstract pod-runtime contract, with one concrete
//! Docker-backed implementation.
//!
//! The contract mirrors what a real cluster API (the original deployment
//! target) exposes: a pod is addressed by the branch it serves, named
//! deterministically so a restart can find its existing pod rather than
//! creating a duplicate.

use std::collections::HashMap;

use async_trait::async_trait;
use docktopus::DockerBuilder;
use docktopus::bollard::container::{InspectContainerOptions, RemoveContainerOptions};
use docktopus::bollard::models::{HostConfig, PortBinding, PortMap};
use docktopus::container::Container;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell as AsyncOnceCell;

use crate::error::{CageError, Result};

/// How long a single pod-runtime operation (create/stop/delete/inspect)
/// may run before it is treated as failed (spec §5).
pub const POD_OPERATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// `yolo-cage-` + lowercased branch with `/` and `_` collapsed to `-`.
/// Grounded verbatim in the original `_sanitize_branch`/`_pod_name`.
pub fn sanitize_branch(branch: &str) -> String {
    branch
        .to_lowercase()
        .chars()
        .map(|c| if c == '/' || c == '_' { '-' } else { c })
        .collect()
}

pub fn pod_name(branch: &str) -> String {
    format!("yolo-cage-{}", sanitize_branch(branch))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodStatus {
    Pending,
    Running,
    Stopped,
    Unknown,
}

impl PodStatus {
    fn from_docker_state(state: &str) -> Self {
        match state {
            "running" => PodStatus::Running,
            "created" | "restarting" => PodStatus::Pending,
            "exited" | "dead" | "paused" => PodStatus::Stopped,
            _ => PodStatus::Unknown,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub branch: String,
    pub status: PodStatus,
    pub ip: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodCreateResponse {
    pub name: String,
    pub branch: String,
    pub status: PodStatus,
    pub message: String,
}

/// The abstract pod-runtime contract. A real deployment substitutes a
/// cluster-API implementation for [`DockerPodRuntime`]; everything above
/// this trait (registry, dispatcher routes) is agnostic to which backs it.
#[async_trait]
pub trait PodRuntime: Send + Sync {
    async fn create_pod(&self, branch: &str) -> Result<PodCreateResponse>;
    async fn list_pods(&self) -> Result<Vec<PodInfo>>;
    async fn get_pod(&self, branch: &str) -> Result<Option<PodInfo>>;
    async fn delete_pod(&self, branch: &str) -> Result<bool>;
}

/// Configuration for the Docker-backed pod runtime, loaded once from the
/// environment. Fields beyond `image`/`docker_host`/`network` exist to
/// parameterize the template per spec §4.8: the shared workspace volume,
/// the dispatcher the agent should point at, and the egress proxy's
/// destination-bypass list.
#[derive(Clone, Debug)]
pub struct DockerPodRuntimeConfig {
    pub image: String,
    pub docker_host: Option<String>,
    pub network: Option<String>,
    pub workspace_root: String,
    pub dispatcher_url: String,
    pub proxy_bypass: Vec<String>,
}

impl DockerPodRuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            image: std::env::var("YOLO_CAGE_POD_IMAGE")
                .unwrap_or_else(|_| "yolo-cage-sandbox:latest".to_string()),
            docker_host: std::env::var("DOCKER_HOST").ok(),
            network: std::env::var("YOLO_CAGE_POD_NETWORK").ok(),
            workspace_root: std::env::var("WORKSPACE_ROOT").unwrap_or_else(|_| "/workspaces".into()),
            dispatcher_url: std::env::var("YOLO_CAGE_DISPATCHER_URL")
                .unwrap_or_else(|_| "http://yolo-cage-dispatcher:8000".to_string()),
            proxy_bypass: std::env::var("PROXY_BYPASS")
                .unwrap_or_else(|_| ".anthropic.com,.claude.com".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

pub struct DockerPodRuntime {
    config: DockerPodRuntimeConfig,
    builder: AsyncOnceCell<DockerBuilder>,
}

impl DockerPodRuntime {
    pub fn new(config: DockerPodRuntimeConfig) -> Self {
        Self {
            config,
            builder: AsyncOnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&DockerBuilder> {
        self.builder
            .get_or_try_init(|| async {
                match self.config.docker_host.as_deref() {
                    Some(host) => DockerBuilder::with_address(host).await.map_err(|err| {
                        CageError::PodRuntime(format!("failed to connect to docker at {host}: {err}"))
                    }),
                    None => DockerBuilder::new().await.map_err(|err| {
                        CageError::PodRuntime(format!("failed to connect to docker: {err}"))
                    }),
                }
            })
            .await
    }

    fn build_labels(branch: &str) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "yolo-cage".to_string());
        labels.insert("yolo-cage/branch".to_string(), branch.to_string());
        labels
    }

    /// The path the agent sees its repository at inside the pod; matches
    /// `AGENT_WORKSPACE` in the dispatcher's path-translation layer.
    const AGENT_WORKSPACE: &'static str = "/home/dev/workspace";

    fn build_docker_config(
        &self,
        branch: &str,
    ) -> docktopus::bollard::container::Config<String> {
        let port_bindings: PortMap = PortMap::from([(
            "8080/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: None,
            }]),
        )]);

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert("8080/tcp".to_string(), HashMap::new());

        // Workspaces are keyed by the raw branch name (matching the
        // dispatcher's own `workspace_root.join(branch)`), not the
        // sanitized pod name.
        let workspace_bind = format!(
            "{}/{}:{}",
            self.config.workspace_root, branch, Self::AGENT_WORKSPACE
        );

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: self.config.network.clone(),
            binds: Some(vec![workspace_bind]),
            ..Default::default()
        };

        docktopus::bollard::container::Config {
            image: Some(self.config.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            labels: Some(Self::build_labels(branch)),
            ..Default::default()
        }
    }

    /// Env handed to the sandbox's main step: branch identity, the
    /// dispatcher to point git/gh shims at, and the proxy's destination
    /// bypass list (spec §4.8's template parameters beyond the volume).
    fn build_env(&self, branch: &str) -> Vec<String> {
        vec![
            format!("YOLO_CAGE_BRANCH={branch}"),
            format!("YOLO_CAGE_DISPATCHER_URL={}", self.config.dispatcher_url),
            format!("YOLO_CAGE_PROXY_BYPASS={}", self.config.proxy_bypass.join(",")),
        ]
    }
}

#[async_trait]
impl PodRuntime for DockerPodRuntime {
    async fn create_pod(&self, branch: &str) -> Result<PodCreateResponse> {
        let name = pod_name(branch);

        if let Some(existing) = self.get_pod(branch).await? {
            return Ok(PodCreateResponse {
                name: existing.name,
                branch: branch.to_string(),
                status: existing.status,
                message: format!(
                    "Pod already exists. Use 'yolo-cage attach {branch}' to connect."
                ),
            });
        }

        let builder = self.client().await?;
        let override_config = self.build_docker_config(branch);

        let mut container = Container::new(builder.client(), self.config.image.clone())
            .with_name(name.clone())
            .env(self.build_env(branch))
            .config_override(override_config);

        tokio::time::timeout(POD_OPERATION_TIMEOUT, container.start(false))
            .await
            .map_err(|_| CageError::Timeout(format!("creating pod '{name}' timed out")))?
            .map_err(|err| CageError::PodRuntime(format!("failed to start pod '{name}': {err}")))?;

        Ok(PodCreateResponse {
            name,
            branch: branch.to_string(),
            status: PodStatus::Pending,
            message: "Pod created. Waiting for it to become ready...".to_string(),
        })
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>> {
        let builder = self.client().await?;
        let containers = tokio::time::timeout(
            POD_OPERATION_TIMEOUT,
            builder.client().list_containers(Some(
                docktopus::bollard::container::ListContainersOptions::<String> {
                    all: true,
                    filters: HashMap::from([(
                        "label".to_string(),
                        vec!["app=yolo-cage".to_string()],
                    )]),
                    ..Default::default()
                },
            )),
        )
        .await
        .map_err(|_| CageError::Timeout("listing pods timed out".to_string()))?
        .map_err(|err| CageError::PodRuntime(format!("failed to list pods: {err}")))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let labels = c.labels.unwrap_or_default();
                let branch = labels
                    .get("yolo-cage/branch")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                PodInfo {
                    name: c.names.unwrap_or_default().into_iter().next().unwrap_or_default(),
                    branch,
                    status: c
                        .state
                        .as_deref()
                        .map(PodStatus::from_docker_state)
                        .unwrap_or(PodStatus::Unknown),
                    ip: c.network_settings.and_then(|n| {
                        n.networks
                            .and_then(|nets| nets.values().next().cloned())
                            .and_then(|n| n.ip_address)
                    }),
                    created_at: c.created.map(|t| t.to_string()),
                }
            })
            .collect())
    }

    async fn get_pod(&self, branch: &str) -> Result<Option<PodInfo>> {
        let name = pod_name(branch);
        let builder = self.client().await?;

        let result = tokio::time::timeout(
            POD_OPERATION_TIMEOUT,
            builder
                .client()
                .inspect_container(&name, None::<InspectContainerOptions>),
        )
        .await
        .map_err(|_| CageError::Timeout(format!("inspecting pod '{name}' timed out")))?;

        match result {
            Ok(inspect) => {
                let labels = inspect
                    .config
                    .as_ref()
                    .and_then(|c| c.labels.clone())
                    .unwrap_or_default();
                let ip = inspect.network_settings.and_then(|n| n.ip_address);
                Ok(Some(PodInfo {
                    name,
                    branch: labels
                        .get("yolo-cage/branch")
                        .cloned()
                        .unwrap_or_else(|| branch.to_string()),
                    status: inspect
                        .state
                        .and_then(|s| s.status)
                        .map(|s| PodStatus::from_docker_state(&s.to_string().to_lowercase()))
                        .unwrap_or(PodStatus::Unknown),
                    ip,
                    created_at: inspect.created,
                }))
            }
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(CageError::PodRuntime(format!(
                "failed to inspect pod '{name}': {err}"
            ))),
        }
    }

    async fn delete_pod(&self, branch: &str) -> Result<bool> {
        let name = pod_name(branch);
        let builder = self.client().await?;

        let result = tokio::time::timeout(
            POD_OPERATION_TIMEOUT,
            builder.client().remove_container(
                &name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            ),
        )
        .await
        .map_err(|_| CageError::Timeout(format!("deleting pod '{name}' timed out")))?;

        match result {
            Ok(()) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(CageError::PodRuntime(format!(
                "failed to delete pod '{name}': {err}"
            ))),
        }
    }
}

fn is_not_found(err: &docktopus::bollard::errors::Error) -> bool {
    matches!(
        err,
        docktopus::bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_slashes_and_underscores_and_lowercases() {
        assert_eq!(sanitize_branch("Feature/My_Branch"), "feature-my-branch");
    }

    #[test]
    fn pod_name_is_prefixed() {
        assert_eq!(pod_name("feature-x"), "yolo-cage-feature-x");
    }

    #[test]
    fn pod_status_maps_docker_states() {
        assert_eq!(PodStatus::from_docker_state("running"), PodStatus::Running);
        assert_eq!(PodStatus::from_docker_state("exited"), PodStatus::Stopped);
        assert_eq!(PodStatus::from_docker_state("created"), PodStatus::Pending);
        assert_eq!(PodStatus::from_docker_state("weird"), PodStatus::Unknown);
    }

    fn test_config() -> DockerPodRuntimeConfig {
        DockerPodRuntimeConfig {
            image: "yolo-cage-sandbox:latest".to_string(),
            docker_host: None,
            network: Some("yolo-cage-net".to_string()),
            workspace_root: "/workspaces".to_string(),
            dispatcher_url: "http://yolo-cage-dispatcher:8000".to_string(),
            proxy_bypass: vec![".anthropic.com".to_string(), ".claude.com".to_string()],
        }
    }

    #[test]
    fn docker_config_binds_raw_branch_workspace_not_sanitized_pod_name() {
        let runtime = DockerPodRuntime::new(test_config());
        let config = runtime.build_docker_config("Feature/My_Branch");
        let binds = config.host_config.unwrap().binds.unwrap();
        assert_eq!(
            binds,
            vec!["/workspaces/Feature/My_Branch:/home/dev/workspace".to_string()]
        );
    }

    #[test]
    fn docker_config_carries_network_and_labels() {
        let runtime = DockerPodRuntime::new(test_config());
        let config = runtime.build_docker_config("feature-x");
        assert_eq!(
            config.host_config.unwrap().network_mode,
            Some("yolo-cage-net".to_string())
        );
        let labels = config.labels.unwrap();
        assert_eq!(labels.get("yolo-cage/branch"), Some(&"feature-x".to_string()));
    }

    #[test]
    fn build_env_carries_dispatcher_url_and_bypass_list() {
        let runtime = DockerPodRuntime::new(test_config());
        let env = runtime.build_env("feature-x");
        assert!(env.contains(&"YOLO_CAGE_BRANCH=feature-x".to_string()));
        assert!(env.contains(&"YOLO_CAGE_DISPATCHER_URL=http://yolo-cage-dispatcher:8000".to_string()));
        assert!(env.contains(&"YOLO_CAGE_PROXY_BYPASS=.anthropic.com,.claude.com".to_string()));
    }
}
