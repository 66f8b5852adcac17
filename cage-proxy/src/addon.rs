//! Request-interception decision logic: the egress proxy's policy brain.
//! Check order is load-bearing and mirrors
//! `original_source/proxy/addon.py::EgressProxy.request` exactly: forge-API
//! gate, host blocklist, body scan, query scan, path scan (URL-decoded),
//! header scan.

use percent_encoding::percent_decode_str;

use crate::config::ProxyConfig;
use crate::logging::{self, LogEntry};
use crate::policy;
use crate::scanner::SecretScanner;

/// A single incoming request's metadata, gathered by the transport layer
/// before any policy is applied.
pub struct RequestView<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub url: &'a str,
    pub body: &'a str,
    pub headers: &'a [(String, String)],
}

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block { message: &'static [u8], reason: String },
}

/// Evaluate one request against policy and the secret scanner, logging the
/// outcome. Skip trivial path scans under 10 decoded bytes, same as the
/// original's skip of trivially short paths.
pub async fn evaluate(
    view: &RequestView<'_>,
    config: &ProxyConfig,
    scanner: &SecretScanner,
) -> Decision {
    if let Some(reason) = policy::check_github_api(view.host, view.method, view.path, config) {
        return block(
            view,
            config,
            b"Blocked: this GitHub API operation is not permitted in yolo-cage",
            reason,
            &[],
        )
        .await;
    }

    if let Some(domain) = policy::check_blocked_domain(view.host, config) {
        return block(
            view,
            config,
            b"Blocked: destination is on blocklist",
            format!("blocked_domain:{domain}"),
            &[],
        )
        .await;
    }

    if !view.body.is_empty() {
        let result = scanner.scan(view.body).await;
        if result.has_secrets {
            return block(
                view,
                config,
                b"Blocked: request body contains potential secrets",
                "secrets_detected".to_string(),
                &result.detected,
            )
            .await;
        }
    }

    if !view.query.is_empty() {
        let result = scanner.scan(view.query).await;
        if result.has_secrets {
            return block(
                view,
                config,
                b"Blocked: URL query parameters contain potential secrets",
                "secrets_in_query".to_string(),
                &result.detected,
            )
            .await;
        }
    }

    let decoded_path = percent_decode_str(view.path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| view.path.to_string());
    if decoded_path.len() > 10 {
        let result = scanner.scan(&decoded_path).await;
        if result.has_secrets {
            return block(
                view,
                config,
                b"Blocked: URL path contains potential secrets",
                "secrets_in_path".to_string(),
                &result.detected,
            )
            .await;
        }
    }

    for (name, value) in view.headers {
        if value.len() > 10 {
            let result = scanner.scan(value).await;
            if result.has_secrets {
                return block(
                    view,
                    config,
                    b"Blocked: request header contains potential secrets",
                    format!("secrets_in_header:{name}"),
                    &result.detected,
                )
                .await;
            }
        }
    }

    logging::write_entry(
        &config.log_file,
        &LogEntry {
            timestamp: logging::now_iso8601(),
            method: view.method,
            url: view.url,
            host: view.host,
            blocked: false,
            reason: None,
            detected_secrets: None,
            request_size: view.body.len(),
        },
    )
    .await;

    Decision::Allow
}

async fn block(
    view: &RequestView<'_>,
    config: &ProxyConfig,
    message: &'static [u8],
    reason: String,
    detected: &[String],
) -> Decision {
    logging::write_entry(
        &config.log_file,
        &LogEntry {
            timestamp: logging::now_iso8601(),
            method: view.method,
            url: view.url,
            host: view.host,
            blocked: true,
            reason: Some(&reason),
            detected_secrets: if detected.is_empty() {
                None
            } else {
                Some(detected)
            },
            request_size: view.body.len(),
        },
    )
    .await;

    Decision::Block { message, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        ProxyConfig {
            blocked_domains: vec!["pastebin.com".to_string()],
            github_api_blocked: vec![("DELETE".to_string(), r"/repos/.*".to_string())],
            llm_guard_url: "http://unused.invalid".to_string(),
            llm_guard_token: String::new(),
            log_file: "/tmp/yolo-cage-proxy-test.jsonl".to_string(),
            proxy_bypass: vec![],
            ca_cert_path: String::new(),
            ca_key_path: String::new(),
            bind_addr: String::new(),
        }
    }

    #[tokio::test]
    async fn github_api_gate_short_circuits_before_any_scan() {
        let cfg = config();
        let scanner = SecretScanner::new(&cfg);
        let view = RequestView {
            method: "DELETE",
            host: "api.github.com",
            path: "/repos/acme/widgets",
            query: "",
            url: "https://api.github.com/repos/acme/widgets",
            body: "",
            headers: &[],
        };
        let decision = evaluate(&view, &cfg, &scanner).await;
        match decision {
            Decision::Block { reason, .. } => assert!(reason.starts_with("github_api_blocked:")),
            Decision::Allow => panic!("expected block"),
        }
    }

    #[tokio::test]
    async fn blocked_domain_short_circuits_before_any_scan() {
        let cfg = config();
        let scanner = SecretScanner::new(&cfg);
        let view = RequestView {
            method: "POST",
            host: "pastebin.com",
            path: "/",
            query: "",
            url: "https://pastebin.com/",
            body: "",
            headers: &[],
        };
        let decision = evaluate(&view, &cfg, &scanner).await;
        match decision {
            Decision::Block { reason, .. } => assert_eq!(reason, "blocked_domain:pastebin.com"),
            Decision::Allow => panic!("expected block"),
        }
    }

    #[tokio::test]
    async fn allowed_request_falls_through_when_scanner_unreachable_and_no_body() {
        let cfg = config();
        let scanner = SecretScanner::new(&cfg);
        let view = RequestView {
            method: "GET",
            host: "example.com",
            path: "/",
            query: "",
            url: "https://example.com/",
            body: "",
            headers: &[],
        };
        let decision = evaluate(&view, &cfg, &scanner).await;
        assert_eq!(decision, Decision::Allow);
    }
}
