//! Source-control (git) command classification.
//!
//! Pure, deterministic, and exhaustively testable: given an argv as the
//! agent saw it, returns the policy category and — for denied commands —
//! the exact denial message.

/// Policy category a git subcommand resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandCategory {
    Local,
    Branch,
    Merge,
    RemoteRead,
    RemoteWrite,
    Denied,
    Unknown,
}

pub const ALLOWLIST_LOCAL: &[&str] = &[
    "add", "rm", "mv", "status", "log", "diff", "show", "commit", "stash", "reset", "restore",
    "rev-parse", "ls-files", "blame", "shortlog", "describe", "tag", "clean",
];

pub const ALLOWLIST_BRANCH: &[&str] = &["branch", "checkout", "switch"];

pub const ALLOWLIST_MERGE: &[&str] = &["merge", "rebase", "cherry-pick"];

pub const ALLOWLIST_REMOTE_READ: &[&str] = &["fetch", "pull"];

pub const ALLOWLIST_REMOTE_WRITE: &[&str] = &["push"];

const DENYLIST_MESSAGES: &[(&str, &str)] = &[
    ("remote", "yolo-cage: remote management is not permitted"),
    (
        "clone",
        "yolo-cage: clone is not permitted; use the provided workspace",
    ),
    ("submodule", "yolo-cage: submodules are not supported"),
    (
        "credential",
        "yolo-cage: credential management is not permitted",
    ),
    (
        "config",
        "yolo-cage: direct git configuration is not permitted.\nUser identity and settings are managed via deployment configuration.",
    ),
];

/// The git subcommand is the first token that doesn't start with `-`.
pub fn get_subcommand(args: &[String]) -> Option<&str> {
    args.iter()
        .map(String::as_str)
        .find(|arg| !arg.starts_with('-'))
}

/// Classify a git invocation. Deny beats allow beats unknown.
pub fn classify(args: &[String]) -> (CommandCategory, Option<String>) {
    let Some(cmd) = get_subcommand(args) else {
        return (CommandCategory::Unknown, None);
    };

    if let Some((_, message)) = DENYLIST_MESSAGES.iter().find(|(name, _)| *name == cmd) {
        return (CommandCategory::Denied, Some((*message).to_string()));
    }

    if ALLOWLIST_LOCAL.contains(&cmd) {
        return (CommandCategory::Local, None);
    }
    if ALLOWLIST_BRANCH.contains(&cmd) {
        return (CommandCategory::Branch, None);
    }
    if ALLOWLIST_MERGE.contains(&cmd) {
        return (CommandCategory::Merge, None);
    }
    if ALLOWLIST_REMOTE_READ.contains(&cmd) {
        return (CommandCategory::RemoteRead, None);
    }
    if ALLOWLIST_REMOTE_WRITE.contains(&cmd) {
        return (CommandCategory::RemoteWrite, None);
    }

    (CommandCategory::Unknown, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn denies_unsafe_subcommands_regardless_of_trailing_args() {
        for (cmd, _) in DENYLIST_MESSAGES {
            let (category, message) =
                classify(&args(&[cmd, "--force", "extra", "args"]));
            assert_eq!(category, CommandCategory::Denied);
            assert!(message.is_some());
        }
    }

    #[test]
    fn every_allowlisted_subcommand_classifies_into_its_set() {
        for cmd in ALLOWLIST_LOCAL {
            assert_eq!(classify(&args(&[cmd])).0, CommandCategory::Local);
        }
        for cmd in ALLOWLIST_BRANCH {
            assert_eq!(classify(&args(&[cmd])).0, CommandCategory::Branch);
        }
        for cmd in ALLOWLIST_MERGE {
            assert_eq!(classify(&args(&[cmd])).0, CommandCategory::Merge);
        }
        for cmd in ALLOWLIST_REMOTE_READ {
            assert_eq!(classify(&args(&[cmd])).0, CommandCategory::RemoteRead);
        }
        for cmd in ALLOWLIST_REMOTE_WRITE {
            assert_eq!(classify(&args(&[cmd])).0, CommandCategory::RemoteWrite);
        }
    }

    #[test]
    fn unknown_primary_subcommand_is_unrecognized() {
        assert_eq!(classify(&args(&["frobnicate"])).0, CommandCategory::Unknown);
    }

    #[test]
    fn leading_flags_are_skipped_to_find_the_subcommand() {
        assert_eq!(
            classify(&args(&["-c", "foo=bar", "status"])).0,
            CommandCategory::Local
        );
    }

    #[test]
    fn empty_argv_is_unrecognized() {
        assert_eq!(classify(&[]).0, CommandCategory::Unknown);
    }
}
