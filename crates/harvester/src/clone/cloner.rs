//! The clone seam and its `git` implementation.

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;

use super::job::{CloneError, CloneJob};

/// Longest stderr excerpt kept in a failure reason.
const MAX_STDERR: usize = 400;

/// Performs one clone into `job.destination`.
///
/// Implementations may leave a partial destination behind on failure; the
/// pipeline removes it.
#[async_trait]
pub trait RepoCloner: Send + Sync {
    async fn clone_repo(&self, job: &CloneJob) -> Result<(), CloneError>;
}

/// Shells out to `git clone`.
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: OsString,
}

impl Default for GitCloner {
    fn default() -> Self {
        Self {
            program: OsString::from("git"),
        }
    }
}

impl GitCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments after the program name.
    pub fn clone_args(job: &CloneJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["clone".into()];
        if let Some(depth) = job.depth {
            args.push("--depth".into());
            args.push(depth.to_string().into());
        }
        if let Some(branch) = &job.branch {
            args.push("--branch".into());
            args.push(branch.into());
            args.push("--single-branch".into());
        }
        args.push("--".into());
        args.push(job.descriptor.clone_url.as_str().into());
        args.push(job.destination.as_os_str().to_owned());
        args
    }

    /// Environment for the child process.
    ///
    /// The credential travels as an `http.extraHeader` config entry so it
    /// never appears in argv or in `.git/config`.
    pub fn clone_env(job: &CloneJob) -> Vec<(&'static str, String)> {
        let mut env = vec![("GIT_TERMINAL_PROMPT", "0".to_string())];
        if let Some(token) = &job.auth_token {
            let basic = base64::engine::general_purpose::STANDARD
                .encode(format!("x-access-token:{token}"));
            env.push(("GIT_CONFIG_COUNT", "1".to_string()));
            env.push(("GIT_CONFIG_KEY_0", "http.extraHeader".to_string()));
            env.push((
                "GIT_CONFIG_VALUE_0",
                format!("Authorization: Basic {basic}"),
            ));
        }
        env
    }
}

#[async_trait]
impl RepoCloner for GitCloner {
    async fn clone_repo(&self, job: &CloneJob) -> Result<(), CloneError> {
        let output = Command::new(&self.program)
            .args(Self::clone_args(job))
            .envs(Self::clone_env(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CloneError::local_io(&job.destination, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr: String = stderr.trim().chars().take(MAX_STDERR).collect();
        Err(CloneError::Git {
            status: output.status.to_string(),
            stderr,
        })
    }
}
