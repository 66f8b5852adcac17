//! Branch enforcement policy.
//!
//! Replaces the source's `None`-means-allowed convention with an explicit
//! sum type so every call site is exhaustive (redesign flag, spec §9).

use crate::classifier::get_subcommand;

/// Outcome of a policy check. `Allow`/`Warn` both mean "execute"; only the
/// latter attaches advisory text to the eventual command output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Warn(String),
    Deny(String),
}

impl PolicyDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, PolicyDecision::Deny(_))
    }
}

/// Extract the target branch from a checkout/switch invocation, if any.
pub fn get_checkout_target(args: &[String]) -> Option<&str> {
    let cmd = get_subcommand(args)?;
    if cmd != "checkout" && cmd != "switch" {
        return None;
    }

    let mut found_cmd = false;
    for arg in args {
        if arg == "checkout" || arg == "switch" {
            found_cmd = true;
            continue;
        }
        if found_cmd && !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

/// Branch-switch warning: read-only navigation away from the assigned
/// branch is permitted but flagged.
pub fn check_branch_switch(args: &[String], assigned_branch: &str) -> PolicyDecision {
    match get_checkout_target(args) {
        Some(target) if target != assigned_branch => PolicyDecision::Warn(format!(
            "yolo-cage: you are now viewing branch '{target}'.\n\
             Your assigned branch is '{assigned_branch}'.\n\
             Commits and pushes to other branches are not permitted.\n"
        )),
        _ => PolicyDecision::Allow,
    }
}

/// Merge-family gate: merge/rebase/cherry-pick require the workspace to
/// currently be on the assigned branch.
pub fn check_merge_allowed(
    current_branch: Option<&str>,
    assigned_branch: &str,
    cmd: &str,
) -> PolicyDecision {
    if current_branch == Some(assigned_branch) {
        return PolicyDecision::Allow;
    }
    PolicyDecision::Deny(format!(
        "yolo-cage: you can only {cmd} while on your assigned branch '{assigned_branch}'.\n\
         Run 'git checkout {assigned_branch}' first.\n"
    ))
}

/// Extract the remote-branch target of an explicit push refspec
/// (`src:dst`). `:dst` (empty src) counts as targeting `dst`.
pub fn get_push_refspec_target(args: &[String]) -> Option<&str> {
    for arg in args {
        if arg.starts_with('-') {
            continue;
        }
        if let Some((_, remote_ref)) = arg.split_once(':') {
            if !remote_ref.is_empty() {
                return Some(remote_ref);
            }
        }
    }
    None
}

/// True if `arg` looks like an absolute destination: `https://`, `http://`,
/// or the `user@host:` scp-like form. Used to unconditionally refuse
/// push-by-URL and prevent cross-repository escape.
fn looks_like_url(arg: &str) -> bool {
    if arg.starts_with("https://") || arg.starts_with("http://") {
        return true;
    }
    // scp-like syntax: user@host:path, but not a refspec such as "origin:branch".
    if let Some(at_pos) = arg.find('@') {
        if let Some(colon_pos) = arg[at_pos..].find(':') {
            return colon_pos > 0;
        }
    }
    false
}

/// Push gate: current branch must equal the assignment; no refspec may
/// target a different remote branch; no argument may look like an
/// absolute URL.
pub fn check_push_allowed(
    args: &[String],
    current_branch: Option<&str>,
    assigned_branch: &str,
) -> PolicyDecision {
    let current = current_branch.unwrap_or("");
    if current != assigned_branch {
        return PolicyDecision::Deny(format!(
            "yolo-cage: you can only push from your assigned branch '{assigned_branch}'.\n\
             Current branch is '{current}'.\n"
        ));
    }

    if let Some(target) = get_push_refspec_target(args) {
        if target != assigned_branch {
            return PolicyDecision::Deny(format!(
                "yolo-cage: you can only push to branch '{assigned_branch}'\n"
            ));
        }
    }

    if args.iter().any(|arg| looks_like_url(arg)) {
        return PolicyDecision::Deny(
            "yolo-cage: pushing directly to a URL is not permitted; push to 'origin' only\n"
                .to_string(),
        );
    }

    PolicyDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn branch_switch_to_assigned_branch_is_silent() {
        assert_eq!(
            check_branch_switch(&args(&["checkout", "feature-x"]), "feature-x"),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn branch_switch_away_warns_but_allows() {
        let decision = check_branch_switch(&args(&["checkout", "main"]), "feature-x");
        assert!(matches!(decision, PolicyDecision::Warn(_)));
    }

    #[test]
    fn merge_off_assigned_branch_is_denied() {
        let decision = check_merge_allowed(Some("main"), "feature-x", "merge");
        assert!(decision.is_denied());
    }

    #[test]
    fn merge_on_assigned_branch_is_allowed() {
        assert_eq!(
            check_merge_allowed(Some("feature-x"), "feature-x", "merge"),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn push_with_mismatched_refspec_target_is_denied() {
        let decision = check_push_allowed(
            &args(&["push", "origin", "HEAD:main"]),
            Some("feature-x"),
            "feature-x",
        );
        match decision {
            PolicyDecision::Deny(msg) => {
                assert!(msg.contains("can only push to branch 'feature-x'"))
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn push_by_url_is_unconditionally_refused() {
        let decision = check_push_allowed(
            &args(&["push", "https://evil.example/other.git", "feature-x"]),
            Some("feature-x"),
            "feature-x",
        );
        assert!(decision.is_denied());
    }

    #[test]
    fn push_by_scp_like_url_is_refused() {
        let decision = check_push_allowed(
            &args(&["push", "git@evil.example:other.git", "feature-x"]),
            Some("feature-x"),
            "feature-x",
        );
        assert!(decision.is_denied());
    }

    #[test]
    fn push_from_wrong_branch_is_denied() {
        let decision = check_push_allowed(&args(&["push", "origin", "feature-x"]), Some("main"), "feature-x");
        assert!(decision.is_denied());
    }

    #[test]
    fn ordinary_push_to_assigned_branch_is_allowed() {
        let decision = check_push_allowed(&args(&["push", "origin", "feature-x"]), Some("feature-x"), "feature-x");
        assert_eq!(decision, PolicyDecision::Allow);
    }

    #[test]
    fn empty_refspec_dst_counts_as_targeting_dst() {
        assert_eq!(get_push_refspec_target(&args(&[":main"])), Some("main"));
    }
}
