//! Environment-driven configuration for the egress proxy, loaded once and
//! cached for the process lifetime. Defaults mirror the original Python
//! `policy.py`/`addon.py` exactly.

use std::env;

use once_cell::sync::OnceCell;

/// Domains blocked outright, used if `BLOCKED_DOMAINS` is unset.
const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "pastebin.com",
    "paste.ee",
    "hastebin.com",
    "dpaste.org",
    "file.io",
    "transfer.sh",
    "0x0.st",
    "ix.io",
    "sprunge.us",
    "termbin.com",
];

/// `(method, path-regex)` pairs blocked on the GitHub API, used if
/// `GITHUB_API_BLOCKED` is unset.
const DEFAULT_GITHUB_API_BLOCKED: &[(&str, &str)] = &[
    ("PUT", r"/repos/[^/]+/[^/]+/pulls/\d+/merge"),
    ("DELETE", r"/repos/.*"),
    ("DELETE", r"/orgs/.*"),
    ("DELETE", r"/user/.*"),
    ("GET", r"/repos/[^/]+/[^/]+/actions/secrets.*"),
    ("GET", r"/orgs/[^/]+/actions/secrets.*"),
    ("PATCH", r"/repos/[^/]+/[^/]+$"),
    ("PUT", r"/repos/[^/]+/[^/]+/collaborators.*"),
    ("POST", r"/repos/[^/]+/[^/]+/hooks"),
    ("PATCH", r"/repos/[^/]+/[^/]+/hooks/\d+"),
    ("PUT", r"/repos/[^/]+/[^/]+/branches/[^/]+/protection"),
    ("DELETE", r"/repos/[^/]+/[^/]+/branches/[^/]+/protection"),
];

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub blocked_domains: Vec<String>,
    pub github_api_blocked: Vec<(String, String)>,
    pub llm_guard_url: String,
    pub llm_guard_token: String,
    pub log_file: String,
    pub proxy_bypass: Vec<String>,
    pub ca_cert_path: String,
    pub ca_key_path: String,
    pub bind_addr: String,
}

static CONFIG: OnceCell<ProxyConfig> = OnceCell::new();

impl ProxyConfig {
    pub fn load() -> &'static ProxyConfig {
        CONFIG.get_or_init(Self::from_env)
    }

    fn from_env() -> Self {
        let blocked_domains = env::var("BLOCKED_DOMAINS")
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_else(|| {
                DEFAULT_BLOCKED_DOMAINS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        let github_api_blocked = env::var("GITHUB_API_BLOCKED")
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<(String, String)>>(&raw).ok())
            .unwrap_or_else(|| {
                DEFAULT_GITHUB_API_BLOCKED
                    .iter()
                    .map(|(m, p)| (m.to_string(), p.to_string()))
                    .collect()
            });

        let proxy_bypass = env::var("PROXY_BYPASS")
            .unwrap_or_else(|_| ".anthropic.com,.claude.com".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        ProxyConfig {
            blocked_domains,
            github_api_blocked,
            llm_guard_url: env::var("LLM_GUARD_URL")
                .unwrap_or_else(|_| "http://llm-guard:8000".to_string()),
            llm_guard_token: env::var("LLM_GUARD_TOKEN")
                .unwrap_or_else(|_| "internal-only".to_string()),
            log_file: env::var("LOG_FILE")
                .unwrap_or_else(|_| "/var/log/proxy/requests.jsonl".to_string()),
            proxy_bypass,
            ca_cert_path: env::var("PROXY_CA_CERT")
                .unwrap_or_else(|_| "/etc/yolo-cage/ca.pem".to_string()),
            ca_key_path: env::var("PROXY_CA_KEY")
                .unwrap_or_else(|_| "/etc/yolo-cage/ca-key.pem".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_match_original_policy_py() {
        for key in [
            "BLOCKED_DOMAINS",
            "GITHUB_API_BLOCKED",
            "LLM_GUARD_URL",
            "LLM_GUARD_TOKEN",
            "LOG_FILE",
            "PROXY_BYPASS",
            "PROXY_CA_CERT",
            "PROXY_CA_KEY",
            "BIND_ADDR",
        ] {
            unsafe { env::remove_var(key) };
        }
        let config = ProxyConfig::from_env();
        assert_eq!(config.blocked_domains.len(), DEFAULT_BLOCKED_DOMAINS.len());
        assert!(config.blocked_domains.contains(&"pastebin.com".to_string()));
        assert_eq!(
            config.github_api_blocked.len(),
            DEFAULT_GITHUB_API_BLOCKED.len()
        );
        assert_eq!(config.llm_guard_url, "http://llm-guard:8000");
        assert_eq!(config.proxy_bypass, vec![".anthropic.com", ".claude.com"]);
    }
}
