//! Remote command execution sessions.
//!
//! A [`Connector`] opens one authenticated [`Session`] per host. A session runs
//! one command at a time and reports every outcome as a [`CommandResult`];
//! only failing to open the session at all is an error.

pub mod ssh;
#[cfg(test)]
pub mod stub;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity_file", &self.identity_file)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub credentials: Credentials,
}

impl HostTarget {
    /// `user@host`, or just `host` when no username is known.
    pub fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    TransportError,
    NonZeroExit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub failure: Option<FailureReason>,
}

impl CommandResult {
    pub fn completed(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_status: Option<i32>,
    ) -> Self {
        let failure = match exit_status {
            Some(0) | None => None,
            Some(_) => Some(FailureReason::NonZeroExit),
        };
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
            failure,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            failure: Some(FailureReason::Timeout),
            ..Self::default()
        }
    }

    /// The detail text is kept in `stderr` so it reaches the diagnostics.
    pub fn transport_error(detail: impl Into<String>) -> Self {
        Self {
            stderr: detail.into(),
            failure: Some(FailureReason::TransportError),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("authentication to {host} rejected: {detail}")]
    AuthRejected { host: String, detail: String },
    #[error("host {host} unreachable: {detail}")]
    Unreachable { host: String, detail: String },
    #[error("connection to {host} timed out after {}s", .after.as_secs())]
    Timeout { host: String, after: Duration },
    #[error("could not start session to {host}: {detail}")]
    Setup { host: String, detail: String },
}

#[async_trait]
pub trait Session: Send {
    /// Runs one command. Never blocks longer than `timeout` and never errors:
    /// transport problems come back as [`FailureReason::TransportError`].
    async fn execute(&mut self, command: &str, timeout: Duration) -> CommandResult;

    /// Releases the connection. Safe to call any number of times.
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    async fn open(&self, target: &HostTarget) -> Result<Self::Session, ConnectionError>;
}
