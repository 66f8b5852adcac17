//! Destination policy: domain blocklist and GitHub API method/path
//! blocklist, both defense-in-depth behind the dispatcher's own
//! classification — grounded in `original_source/dockerfiles/proxy/policy.py`.

use regex::Regex;

use crate::config::ProxyConfig;

/// Returns the matched blocked domain, if `host` is on the blocklist
/// (exact match or subdomain of a blocked domain).
pub fn check_blocked_domain(host: &str, config: &ProxyConfig) -> Option<String> {
    config
        .blocked_domains
        .iter()
        .find(|blocked| host == blocked.as_str() || host.ends_with(&format!(".{blocked}")))
        .cloned()
}

/// Returns a blocking reason if this is a disallowed GitHub API call.
/// Only `api.github.com`/`github.com` are in scope; everything else passes.
pub fn check_github_api(host: &str, method: &str, path: &str, config: &ProxyConfig) -> Option<String> {
    if host != "api.github.com" && host != "github.com" {
        return None;
    }

    for (blocked_method, pattern) in &config.github_api_blocked {
        if method.eq_ignore_ascii_case(blocked_method) {
            if let Ok(re) = Regex::new(&format!("^(?:{pattern})")) {
                if re.is_match(path) {
                    return Some(format!("github_api_blocked:{blocked_method} {pattern}"));
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        ProxyConfig {
            blocked_domains: vec!["pastebin.com".to_string()],
            github_api_blocked: vec![
                ("DELETE".to_string(), r"/repos/.*".to_string()),
                (
                    "PATCH".to_string(),
                    r"/repos/[^/]+/[^/]+$".to_string(),
                ),
            ],
            llm_guard_url: String::new(),
            llm_guard_token: String::new(),
            log_file: String::new(),
            proxy_bypass: vec![],
            ca_cert_path: String::new(),
            ca_key_path: String::new(),
            bind_addr: String::new(),
        }
    }

    #[test]
    fn blocks_exact_and_subdomain() {
        let cfg = config();
        assert_eq!(
            check_blocked_domain("pastebin.com", &cfg),
            Some("pastebin.com".to_string())
        );
        assert_eq!(
            check_blocked_domain("www.pastebin.com", &cfg),
            Some("pastebin.com".to_string())
        );
        assert_eq!(check_blocked_domain("github.com", &cfg), None);
    }

    #[test]
    fn blocks_repo_delete_on_github_api() {
        let cfg = config();
        assert!(check_github_api("api.github.com", "DELETE", "/repos/acme/widgets", &cfg).is_some());
        assert!(check_github_api("api.github.com", "GET", "/repos/acme/widgets", &cfg).is_none());
    }

    #[test]
    fn ignores_non_github_hosts() {
        let cfg = config();
        assert!(check_github_api("example.com", "DELETE", "/repos/acme/widgets", &cfg).is_none());
    }

    #[test]
    fn patch_matches_repo_settings_not_subpaths() {
        let cfg = config();
        assert!(check_github_api("api.github.com", "PATCH", "/repos/acme/widgets", &cfg).is_some());
        assert!(check_github_api("api.github.com", "PATCH", "/repos/acme/widgets/hooks/1", &cfg).is_none());
    }
}
