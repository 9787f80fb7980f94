use crate::parse::parse_number;
use crate::session::{CommandResult, FailureReason, Session};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Text,
    Numeric,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
}

/// Why a probe produced no value. Never propagated past the runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("command timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("command wrote to stderr: {0}")]
    StderrPresent(String),
    #[error("command produced no output")]
    Empty,
    #[error("invalid output format: {0}")]
    Parse(String),
}

/// Runs single probes over a borrowed session and turns each result into an
/// optional value. Stderr output discards the result even when stdout is
/// present and the exit status is zero.
pub struct CommandRunner<'a, S: Session + ?Sized> {
    session: &'a mut S,
    host: &'a str,
    timeout: Duration,
}

impl<'a, S: Session + ?Sized> CommandRunner<'a, S> {
    pub fn new(session: &'a mut S, host: &'a str, timeout: Duration) -> Self {
        Self {
            session,
            host,
            timeout,
        }
    }

    pub async fn run(&mut self, probe: &str, command: &str, expect: Expect) -> Option<Value> {
        let result = self.session.execute(command, self.timeout).await;
        match classify(&result).and_then(|stdout| coerce(stdout, expect)) {
            Ok(value) => Some(value),
            Err(err @ ProbeError::Empty) => {
                debug!(host = %self.host, probe, error = %err, "probe returned nothing");
                None
            }
            Err(err) => {
                warn!(
                    host = %self.host,
                    probe,
                    exit_status = ?result.exit_status,
                    error = %err,
                    "probe failed"
                );
                None
            }
        }
    }

    pub async fn text(&mut self, probe: &str, command: &str) -> Option<String> {
        match self.run(probe, command, Expect::Text).await {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub async fn number(&mut self, probe: &str, command: &str) -> Option<f64> {
        match self.run(probe, command, Expect::Numeric).await {
            Some(Value::Number(value)) => Some(value),
            _ => None,
        }
    }
}

/// Returns the trimmed stdout of a usable result.
pub fn classify(result: &CommandResult) -> Result<String, ProbeError> {
    match result.failure {
        Some(FailureReason::Timeout) => return Err(ProbeError::Timeout),
        Some(FailureReason::TransportError) => {
            return Err(ProbeError::Transport(result.stderr.trim().to_string()))
        }
        // Exit status alone is not a failure signal; stderr is.
        Some(FailureReason::NonZeroExit) | None => {}
    }

    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        return Err(ProbeError::StderrPresent(stderr.to_string()));
    }

    let stdout = result.stdout.trim();
    if stdout.is_empty() {
        return Err(ProbeError::Empty);
    }
    Ok(stdout.to_string())
}

pub fn coerce(stdout: String, expect: Expect) -> Result<Value, ProbeError> {
    match expect {
        Expect::Text => Ok(Value::Text(stdout)),
        Expect::Numeric => parse_number(&stdout)
            .map(Value::Number)
            .ok_or(ProbeError::Parse(stdout)),
    }
}
