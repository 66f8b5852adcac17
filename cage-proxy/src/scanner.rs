//! Secret-scanner client: a thin wrapper over an LLM-Guard-shaped HTTP
//! service, fail-closed while unavailable. Grounded in
//! `original_source/proxy/addon.py`'s `_scan_for_secrets`/`_check_llm_guard`
//! — the fail-*open* sibling in `dockerfiles/proxy/secret_scanner.py` is
//! rejected per the Design Notes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;

use crate::config::ProxyConfig;

/// Below this length, scanning is skipped and the input passes trivially.
const MIN_SCAN_LEN: usize = 10;

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default = "default_true")]
    is_valid: bool,
    #[serde(default)]
    scanners: std::collections::HashMap<String, f64>,
}

fn default_true() -> bool {
    true
}

/// The outcome of scanning a piece of text.
pub struct ScanResult {
    pub has_secrets: bool,
    pub detected: Vec<String>,
}

impl ScanResult {
    fn clean() -> Self {
        ScanResult {
            has_secrets: false,
            detected: vec![],
        }
    }

    fn flagged(detected: Vec<String>) -> Self {
        ScanResult {
            has_secrets: true,
            detected,
        }
    }
}

pub struct SecretScanner {
    client: reqwest::Client,
    base_url: String,
    token: String,
    available: AtomicBool,
}

impl SecretScanner {
    pub fn new(config: &ProxyConfig) -> Self {
        SecretScanner {
            client: reqwest::Client::new(),
            base_url: config.llm_guard_url.clone(),
            token: config.llm_guard_token.clone(),
            available: AtomicBool::new(false),
        }
    }

    /// Probe `/healthz` and cache the result. Called on construction and
    /// again whenever a scan finds the scanner unavailable.
    pub async fn check_availability(&self) {
        let healthy = self
            .client
            .get(format!("{}/healthz", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false);

        if healthy {
            tracing::info!("scanner is available");
        } else {
            tracing::warn!("scanner unavailable");
        }
        self.available.store(healthy, Ordering::SeqCst);
    }

    /// Scan `text` for secrets. Fails closed (blocks) if the scanner is
    /// unavailable; inputs under [`MIN_SCAN_LEN`] pass trivially.
    pub async fn scan(&self, text: &str) -> ScanResult {
        if text.len() < MIN_SCAN_LEN {
            return ScanResult::clean();
        }

        if !self.available.load(Ordering::SeqCst) {
            self.check_availability().await;
            if !self.available.load(Ordering::SeqCst) {
                tracing::error!("scanner unavailable, blocking request (fail-closed)");
                return ScanResult::flagged(vec!["scanner_unavailable".to_string()]);
            }
        }

        let response = self
            .client
            .post(format!("{}/analyze/prompt", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "prompt": text }))
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<AnalyzeResponse>().await {
                Ok(parsed) => {
                    if parsed.is_valid {
                        ScanResult::clean()
                    } else {
                        let detected: Vec<String> = parsed
                            .scanners
                            .into_iter()
                            .filter(|(_, score)| *score < 1.0)
                            .map(|(name, _)| name)
                            .collect();
                        tracing::info!(?detected, "secrets detected by scanners");
                        ScanResult::flagged(detected)
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "malformed scanner response");
                    ScanResult::clean()
                }
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "scanner returned non-success status");
                ScanResult::clean()
            }
            Err(err) => {
                tracing::error!(error = %err, "error calling scanner");
                ScanResult::clean()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base_url: String) -> ProxyConfig {
        ProxyConfig {
            blocked_domains: vec![],
            github_api_blocked: vec![],
            llm_guard_url: base_url,
            llm_guard_token: "test-token".to_string(),
            log_file: String::new(),
            proxy_bypass: vec![],
            ca_cert_path: String::new(),
            ca_key_path: String::new(),
            bind_addr: String::new(),
        }
    }

    #[tokio::test]
    async fn short_text_passes_trivially_without_a_network_call() {
        let server = MockServer::start().await;
        let scanner = SecretScanner::new(&config_for(server.uri()));
        let result = scanner.scan("short").await;
        assert!(!result.has_secrets);
    }

    #[tokio::test]
    async fn unavailable_scanner_fails_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let scanner = SecretScanner::new(&config_for(server.uri()));
        let result = scanner.scan("this text is definitely long enough").await;
        assert!(result.has_secrets);
        assert_eq!(result.detected, vec!["scanner_unavailable".to_string()]);
    }

    #[tokio::test]
    async fn available_scanner_flags_detected_secrets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_valid": false,
                "scanners": {"Secrets": 0.0}
            })))
            .mount(&server)
            .await;

        let scanner = SecretScanner::new(&config_for(server.uri()));
        let result = scanner.scan("this text is definitely long enough").await;
        assert!(result.has_secrets);
        assert_eq!(result.detected, vec!["Secrets".to_string()]);
    }

    #[tokio::test]
    async fn available_scanner_clears_clean_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze/prompt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"is_valid": true, "scanners": {}})),
            )
            .mount(&server)
            .await;

        let scanner = SecretScanner::new(&config_for(server.uri()));
        let result = scanner.scan("this text is definitely long enough").await;
        assert!(!result.has_secrets);
    }
}
