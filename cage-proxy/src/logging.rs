//! Append-only newline-delimited JSON decision log, matching
//! `original_source/proxy/addon.py`'s `_log_request`.

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

#[derive(Serialize)]
pub struct LogEntry<'a> {
    pub timestamp: String,
    pub method: &'a str,
    pub url: &'a str,
    pub host: &'a str,
    pub blocked: bool,
    pub reason: Option<&'a str>,
    pub detected_secrets: Option<&'a [String]>,
    pub request_size: usize,
}

/// Append one JSON line to `log_file`, creating parent directories as
/// needed. Failures are logged and swallowed: a broken log must never
/// block traffic.
pub async fn write_entry(log_file: &str, entry: &LogEntry<'_>) {
    if let Some(parent) = Path::new(log_file).parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            tracing::error!(error = %err, "failed to create log directory");
            return;
        }
    }

    let line = match serde_json::to_string(entry) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize log entry");
            return;
        }
    };

    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await
    }
    .await;

    if let Err(err) = result {
        tracing::error!(error = %err, "failed to write log entry");
    }

    if entry.blocked {
        tracing::warn!(
            method = entry.method,
            url = entry.url,
            reason = entry.reason,
            "BLOCKED"
        );
    } else {
        tracing::info!(method = entry.method, url = entry.url, "ALLOWED");
    }
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_json_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("requests.jsonl");
        let entry = LogEntry {
            timestamp: now_iso8601(),
            method: "GET",
            url: "https://example.com/",
            host: "example.com",
            blocked: false,
            reason: None,
            detected_secrets: None,
            request_size: 0,
        };
        write_entry(log_path.to_str().unwrap(), &entry).await;
        write_entry(log_path.to_str().unwrap(), &entry).await;

        let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["host"], "example.com");
    }
}
