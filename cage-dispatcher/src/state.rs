//! Shared application state: the caller registry, loaded configuration,
//! the pod-runtime backend, and the per-branch workspace locks that keep
//! concurrent git invocations against the same branch from interleaving.

use std::sync::Arc;

use cage_runtime::sandbox::PodRuntime;
use cage_runtime::{DispatcherConfig, Registry};
use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub config: &'static DispatcherConfig,
    pub registry: Arc<Registry>,
    pub pod_runtime: Arc<dyn PodRuntime>,
    branch_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(pod_runtime: Arc<dyn PodRuntime>) -> Self {
        Self {
            config: DispatcherConfig::load(),
            registry: Arc::new(Registry::new()),
            pod_runtime,
            branch_locks: Arc::new(DashMap::new()),
        }
    }

    /// Lock held for the duration of a single git/gh invocation against
    /// `branch`, so two concurrent requests from the same pod never race
    /// on the same working tree.
    pub fn branch_lock(&self, branch: &str) -> Arc<Mutex<()>> {
        self.branch_locks
            .entry(branch.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
