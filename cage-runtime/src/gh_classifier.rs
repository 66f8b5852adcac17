//! Forge (`gh` CLI) command classification. Mirrors the approach in
//! [`crate::classifier`] for git commands: fixed tables, pure function,
//! unrecognized defaults to denial at the dispatch layer.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GhCommandCategory {
    Allowed,
    Blocked,
    Unknown,
}

/// `None` for subcommands means "all subcommands of this primary are allowed".
type AllowedEntry = (&'static str, Option<&'static [&'static str]>);

const ALLOWED_COMMANDS: &[AllowedEntry] = &[
    (
        "issue",
        Some(&[
            "create", "list", "view", "comment", "edit", "status", "close", "reopen",
        ]),
    ),
    (
        "pr",
        Some(&[
            "create", "list", "view", "comment", "edit", "diff", "checks", "status", "checkout",
            "close",
        ]),
    ),
    ("repo", Some(&["view", "list", "clone"])),
    ("search", Some(&["issues", "prs", "repos", "code", "commits"])),
    ("gist", Some(&["create", "list", "view", "edit"])),
    ("browse", None),
    ("status", None),
    ("run", Some(&["list", "view", "watch"])),
    ("label", Some(&["list", "create", "edit"])),
    (
        "project",
        Some(&[
            "list", "view", "create", "edit", "field-list", "item-list", "item-add",
        ]),
    ),
];

type BlockedEntry = (&'static str, &'static [(&'static str, &'static str)]);

const BLOCKED_COMMANDS: &[BlockedEntry] = &[
    (
        "pr",
        &[(
            "merge",
            "yolo-cage: merging PRs is not permitted. Open a PR for human review instead.",
        )],
    ),
    (
        "repo",
        &[
            ("delete", "yolo-cage: deleting repositories is not permitted."),
            ("create", "yolo-cage: creating repositories is not permitted."),
            ("edit", "yolo-cage: editing repository settings is not permitted."),
            ("rename", "yolo-cage: renaming repositories is not permitted."),
            ("archive", "yolo-cage: archiving repositories is not permitted."),
        ],
    ),
    (
        "release",
        &[("delete", "yolo-cage: deleting releases is not permitted.")],
    ),
    (
        "secret",
        &[
            ("set", "yolo-cage: managing secrets is not permitted."),
            ("delete", "yolo-cage: managing secrets is not permitted."),
            ("list", "yolo-cage: accessing secrets is not permitted."),
        ],
    ),
    (
        "ssh-key",
        &[
            ("add", "yolo-cage: managing SSH keys is not permitted."),
            ("delete", "yolo-cage: managing SSH keys is not permitted."),
            ("list", "yolo-cage: listing SSH keys is not permitted."),
        ],
    ),
    (
        "gpg-key",
        &[
            ("add", "yolo-cage: managing GPG keys is not permitted."),
            ("delete", "yolo-cage: managing GPG keys is not permitted."),
        ],
    ),
    (
        "auth",
        &[
            ("login", "yolo-cage: authentication is managed by the sandbox."),
            ("logout", "yolo-cage: authentication is managed by the sandbox."),
            (
                "setup-git",
                "yolo-cage: git authentication is managed by the sandbox.",
            ),
            ("refresh", "yolo-cage: authentication is managed by the sandbox."),
        ],
    ),
    (
        "config",
        &[
            ("set", "yolo-cage: gh configuration is managed by the sandbox."),
            (
                "clear-cache",
                "yolo-cage: gh configuration is managed by the sandbox.",
            ),
        ],
    ),
    (
        "variable",
        &[
            ("set", "yolo-cage: managing variables is not permitted."),
            ("delete", "yolo-cage: managing variables is not permitted."),
            ("list", "yolo-cage: accessing variables is not permitted."),
        ],
    ),
];

const FULLY_BLOCKED_COMMANDS: &[(&str, &str)] = &[
    (
        "api",
        "yolo-cage: direct API access is not permitted. Use specific gh commands instead.",
    ),
    ("extension", "yolo-cage: managing extensions is not permitted."),
    ("alias", "yolo-cage: managing aliases is not permitted."),
];

/// Extract (main_command, subcommand) from a gh argv, skipping flags.
pub fn get_gh_subcommand(args: &[String]) -> (Option<&str>, Option<&str>) {
    let mut main_cmd = None;
    let mut sub_cmd = None;
    for arg in args.iter().map(String::as_str) {
        if arg.starts_with('-') {
            continue;
        }
        if main_cmd.is_none() {
            main_cmd = Some(arg);
        } else {
            sub_cmd = Some(arg);
            break;
        }
    }
    (main_cmd, sub_cmd)
}

pub fn classify_gh(args: &[String]) -> (GhCommandCategory, Option<String>) {
    let (main_cmd, sub_cmd) = get_gh_subcommand(args);
    let Some(main_cmd) = main_cmd else {
        return (GhCommandCategory::Unknown, None);
    };

    if let Some((_, message)) = FULLY_BLOCKED_COMMANDS.iter().find(|(n, _)| *n == main_cmd) {
        return (GhCommandCategory::Blocked, Some((*message).to_string()));
    }

    if let Some((_, blocked_subs)) = BLOCKED_COMMANDS.iter().find(|(n, _)| *n == main_cmd) {
        if let Some(sub) = sub_cmd {
            if let Some((_, message)) = blocked_subs.iter().find(|(s, _)| *s == sub) {
                return (GhCommandCategory::Blocked, Some((*message).to_string()));
            }
        }
    }

    if let Some((_, allowed_subs)) = ALLOWED_COMMANDS.iter().find(|(n, _)| *n == main_cmd) {
        return match allowed_subs {
            None => (GhCommandCategory::Allowed, None),
            Some(subs) => match sub_cmd {
                Some(sub) if subs.contains(&sub) => (GhCommandCategory::Allowed, None),
                _ => (GhCommandCategory::Unknown, None),
            },
        };
    }

    (GhCommandCategory::Unknown, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_pr_is_blocked() {
        let (category, message) = classify_gh(&args(&["pr", "merge", "123"]));
        assert_eq!(category, GhCommandCategory::Blocked);
        assert!(message.unwrap().contains("merging PRs is not permitted"));
    }

    #[test]
    fn api_is_fully_blocked() {
        assert_eq!(
            classify_gh(&args(&["api", "/repos/foo/bar"])).0,
            GhCommandCategory::Blocked
        );
    }

    #[test]
    fn issue_create_is_allowed() {
        assert_eq!(
            classify_gh(&args(&["issue", "create", "--title", "x"])).0,
            GhCommandCategory::Allowed
        );
    }

    #[test]
    fn browse_allows_any_subcommand() {
        assert_eq!(
            classify_gh(&args(&["browse", "--settings"])).0,
            GhCommandCategory::Allowed
        );
    }

    #[test]
    fn known_primary_unknown_subcommand_is_unrecognized() {
        assert_eq!(
            classify_gh(&args(&["issue", "teleport"])).0,
            GhCommandCategory::Unknown
        );
    }

    #[test]
    fn unknown_primary_is_unrecognized() {
        assert_eq!(classify_gh(&args(&["frobnicate"])).0, GhCommandCategory::Unknown);
    }
}
