use std::path::Path;
use std::process::Command;

use migr_core::error::MigrError;

/// Shallow-clone `branch` of `url` into `dest` (depth 1, single branch).
/// An empty `branch` or `HEAD` clones the remote's default.
pub fn shallow_clone(url: &str, branch: &str, dest: &Path) -> Result<(), MigrError> {
    let dest_str = dest.to_string_lossy();
    let mut args = vec!["clone", "--depth", "1", "--single-branch", "--quiet"];
    if !branch.is_empty() && branch != "HEAD" {
        args.extend(["--branch", branch]);
    }
    args.extend([url, &*dest_str]);

    let output = Command::new("git")
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .map_err(|e| MigrError::GitError {
            message: format!("failed to run git clone: {e}"),
        })?;

    if !output.status.success() {
        return Err(MigrError::GitError {
            message: format!(
                "git clone failed: {}",
                redact(String::from_utf8_lossy(&output.stderr).trim())
            ),
        });
    }
    Ok(())
}

/// Embed credentials in an https clone URL.
pub fn authenticated_url(clone_url: &str, username: &str, token: &str) -> Result<String, MigrError> {
    let mut url = url::Url::parse(clone_url).map_err(|e| MigrError::Config {
        message: format!("invalid clone URL: {e}"),
    })?;
    let rejected = || MigrError::Config {
        message: "clone URL cannot carry credentials".to_string(),
    };
    url.set_username(username).map_err(|_| rejected())?;
    url.set_password(Some(token)).map_err(|_| rejected())?;
    Ok(url.to_string())
}

// git echoes the remote URL on failure; drop any userinfo from it.
fn redact(message: &str) -> String {
    message
        .split_whitespace()
        .map(|word| match (word.find("://"), word.find('@')) {
            (Some(scheme), Some(at)) if at > scheme => {
                format!("{}***{}", &word[..scheme + 3], &word[at..])
            }
            _ => word.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
