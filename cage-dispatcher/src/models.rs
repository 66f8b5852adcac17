//! Request and response payloads for the dispatcher HTTP surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Request from the git shim running inside a sandbox pod.
#[derive(Clone, Debug, Deserialize)]
pub struct GitRequest {
    pub args: Vec<String>,
    pub cwd: String,
}

/// Request from the gh shim running inside a sandbox pod.
#[derive(Clone, Debug, Deserialize)]
pub struct GhRequest {
    pub args: Vec<String>,
    pub cwd: String,
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(default, rename = "stdin")]
    pub stdin_content: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Serialize)]
pub struct RegistryResponse {
    pub registry: HashMap<String, String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub commit_footer: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PodCreateRequest {
    pub branch: String,
}

#[derive(Deserialize)]
pub struct BranchQuery {
    pub branch: String,
}

#[derive(Deserialize)]
pub struct DeletePodQuery {
    #[serde(default)]
    pub clean: bool,
}
