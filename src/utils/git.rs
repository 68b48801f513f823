use crate::error::{FleetError, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Result of a git invocation that ran to completion
#[derive(Debug)]
pub enum GitOutcome {
    Success(String),
    Failed(String),
}

/// Make sure a `git` binary is available before touching remotes
pub fn ensure_git_installed() -> Result<()> {
    which::which("git").map(|_| ()).map_err(|_| {
        FleetError::Git(
            "git is not installed or not on PATH. Install git to fetch remote identities"
                .to_string(),
        )
    })
}

/// Run git with a hard timeout.
///
/// `origin` names the remote being talked to; a timeout is reported as a
/// retryable network error against it.
pub fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
    origin: &str,
) -> Result<GitOutcome> {
    debug!(?args, cwd = ?cwd, "running git");

    let mut cmd = Command::new("git");
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| FleetError::Git(format!("Failed to run git: {}", e)))?;

    // Drain both pipes on their own threads so a chatty git never blocks on a full pipe
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FleetError::Network {
                origin: origin.to_string(),
                message: format!(
                    "git {} timed out after {:?}",
                    args.first().copied().unwrap_or_default(),
                    timeout
                ),
            });
        }
    };

    let stdout = stdout.map(join_drain).unwrap_or_default();
    let stderr = stderr.map(join_drain).unwrap_or_default();

    if status.success() {
        Ok(GitOutcome::Success(stdout.trim().to_string()))
    } else {
        Ok(GitOutcome::Failed(stderr.trim().to_string()))
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = reader.read_to_string(&mut buf);
        buf
    })
}

fn join_drain(handle: std::thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Whether git's stderr describes something that does not exist (as opposed
/// to a transport failure worth retrying)
pub fn is_not_found(stderr: &str) -> bool {
    const MARKERS: &[&str] = &[
        "not found",
        "does not exist",
        "does not appear to be a git repository",
        "couldn't find remote ref",
        "could not find remote branch",
        "unknown revision",
        "did not match any",
        "not a valid object name",
        "needed a single revision",
    ];
    let lower = stderr.to_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Resolve the remote's default branch from `refs/remotes/origin/HEAD`.
/// Falls back to "main" when the remote HEAD is unknown.
pub fn default_branch(repo: &Path, timeout: Duration, origin: &str) -> Result<String> {
    match run_git(
        &["symbolic-ref", "refs/remotes/origin/HEAD"],
        Some(repo),
        timeout,
        origin,
    )? {
        GitOutcome::Success(symbolic_ref) => Ok(symbolic_ref
            .strip_prefix("refs/remotes/origin/")
            .unwrap_or("main")
            .to_string()),
        GitOutcome::Failed(_) => {
            debug!(origin, "no remote HEAD ref, falling back to 'main'");
            Ok("main".to_string())
        }
    }
}

/// Whether a string looks like a full commit id
pub fn is_commit_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}
