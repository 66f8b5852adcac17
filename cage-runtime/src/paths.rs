//! Translates a caller-supplied working directory into the path it
//! actually has on the pod's filesystem.
//!
//! The agent inside the sandbox believes its repository lives at a fixed
//! logical root; the dispatcher actually checks branches out under
//! `<workspace_root>/<branch>`. Any subpath under the logical root is
//! preserved relative to the branch directory. Paths outside the logical
//! root are left untouched — the dispatcher never widens what a caller
//! can reach, only narrows it.

use std::path::{Path, PathBuf};

/// Rewrite `cwd` relative to `logical_root` into `workspace_root/branch`,
/// preserving any subpath below the logical root.
pub fn translate_cwd(cwd: &str, logical_root: &str, workspace_root: &str, branch: &str) -> PathBuf {
    let branch_root = Path::new(workspace_root).join(branch);

    let cwd_path = Path::new(cwd);
    let root_path = Path::new(logical_root);

    match cwd_path.strip_prefix(root_path) {
        Ok(relative) => branch_root.join(relative),
        Err(_) => {
            if cwd_path == root_path {
                branch_root
            } else {
                cwd_path.to_path_buf()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwd_equal_to_logical_root_maps_to_branch_root() {
        let translated = translate_cwd("/workspace", "/workspace", "/workspaces", "feature-x");
        assert_eq!(translated, PathBuf::from("/workspaces/feature-x"));
    }

    #[test]
    fn subpath_below_logical_root_is_preserved() {
        let translated = translate_cwd(
            "/workspace/src/lib",
            "/workspace",
            "/workspaces",
            "feature-x",
        );
        assert_eq!(translated, PathBuf::from("/workspaces/feature-x/src/lib"));
    }

    #[test]
    fn path_outside_logical_root_passes_through_unchanged() {
        let translated = translate_cwd("/etc/passwd", "/workspace", "/workspaces", "feature-x");
        assert_eq!(translated, PathBuf::from("/etc/passwd"));
    }

    #[test]
    fn trailing_slash_variants_still_match_the_root() {
        let translated = translate_cwd("/workspace/", "/workspace", "/workspaces", "feature-x");
        assert_eq!(translated, PathBuf::from("/workspaces/feature-x"));
    }
}
