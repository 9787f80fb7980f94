//! Sessions backed by the system OpenSSH client.
//!
//! `open` starts a ControlMaster connection on a private control socket and
//! every command is run as a separate `ssh -S <socket>` client multiplexed over
//! it. A command that times out has its client killed, which closes only that
//! channel; later commands never see its output. Password authentication goes
//! through `sshpass -e` when it is installed.

use super::{CommandResult, ConnectionError, Connector, HostTarget, Session};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
/// Exit status OpenSSH reserves for its own failures.
const SSH_TRANSPORT_EXIT: i32 = 255;
/// `sshpass` exit status for a rejected password.
const SSHPASS_WRONG_PASSWORD: i32 = 5;

static SOCKET_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct SshConnector {
    program: PathBuf,
    connect_timeout: Duration,
    control_dir: PathBuf,
    use_sshpass: bool,
}

impl SshConnector {
    /// `connect_timeout` bounds the whole of `open`, authentication included.
    pub async fn new(connect_timeout: Duration) -> Self {
        // Checked once; every host shares the answer.
        let use_sshpass = Command::new("sshpass")
            .arg("-V")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok();
        Self {
            program: PathBuf::from("ssh"),
            connect_timeout,
            control_dir: std::env::temp_dir(),
            use_sshpass,
        }
    }

    /// Runs `program` instead of the `ssh` found on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn socket_path(&self) -> PathBuf {
        let seq = SOCKET_SEQ.fetch_add(1, Ordering::Relaxed);
        self.control_dir
            .join(format!("remmon-{}-{seq}.sock", std::process::id()))
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn open(&self, target: &HostTarget) -> Result<SshSession, ConnectionError> {
        let socket = self.socket_path();
        let password = target
            .credentials
            .password
            .as_deref()
            .filter(|_| self.use_sshpass);
        if target.credentials.password.is_some() && password.is_none() {
            warn!(host = %target.host, "sshpass not found, falling back to key authentication");
        }

        let mut cmd = match password {
            Some(pw) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(&self.program).env("SSHPASS", pw);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(master_args(
            target,
            &socket,
            self.connect_timeout,
            password.is_none(),
        ))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut master = cmd.spawn().map_err(|err| ConnectionError::Setup {
            host: target.host.clone(),
            detail: format!("failed to spawn ssh: {err}"),
        })?;

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            match master.try_wait() {
                Ok(Some(status)) => {
                    let stderr = read_stderr(&mut master).await;
                    let _ = std::fs::remove_file(&socket);
                    return Err(classify_connect_failure(
                        &target.host,
                        status.code(),
                        &stderr,
                        self.connect_timeout,
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = master.kill().await;
                    let _ = std::fs::remove_file(&socket);
                    return Err(ConnectionError::Setup {
                        host: target.host.clone(),
                        detail: format!("failed to poll ssh master: {err}"),
                    });
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let check_timeout = remaining.min(CONTROL_TIMEOUT);
            if control_command(&self.program, target, &socket, "check", check_timeout).await {
                debug!(host = %target.host, socket = %socket.display(), "ssh session opened");
                return Ok(SshSession {
                    program: self.program.clone(),
                    target: target.clone(),
                    socket,
                    master: Some(master),
                });
            }

            if Instant::now() >= deadline {
                let _ = master.kill().await;
                let _ = std::fs::remove_file(&socket);
                return Err(ConnectionError::Timeout {
                    host: target.host.clone(),
                    after: self.connect_timeout,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

pub struct SshSession {
    program: PathBuf,
    target: HostTarget,
    socket: PathBuf,
    master: Option<Child>,
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&mut self, command: &str, timeout: Duration) -> CommandResult {
        if self.master.is_none() {
            return CommandResult::transport_error("session is closed");
        }

        let child = Command::new(&self.program)
            .args(client_args(&self.target, &self.socket, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(err) => return CommandResult::transport_error(format!("failed to spawn ssh: {err}")),
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                match output.status.code() {
                    Some(SSH_TRANSPORT_EXIT) => {
                        let detail = stderr.trim();
                        CommandResult::transport_error(if detail.is_empty() {
                            "ssh exited with status 255".to_string()
                        } else {
                            detail.to_string()
                        })
                    }
                    code => CommandResult::completed(stdout, stderr, code),
                }
            }
            Ok(Err(err)) => CommandResult::transport_error(format!("failed to wait for ssh: {err}")),
            Err(_elapsed) => {
                debug!(
                    host = %self.target.host,
                    timeout = %humantime::format_duration(timeout),
                    "remote command timed out, client killed"
                );
                CommandResult::timed_out()
            }
        }
    }

    async fn close(&mut self) {
        let Some(mut master) = self.master.take() else {
            return;
        };
        let _ = control_command(
            &self.program,
            &self.target,
            &self.socket,
            "exit",
            CONTROL_TIMEOUT,
        )
        .await;
        let _ = master.kill().await;
        let _ = std::fs::remove_file(&self.socket);
        debug!(host = %self.target.host, "ssh session closed");
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Some(mut master) = self.master.take() {
            let _ = master.start_kill();
            let _ = std::fs::remove_file(&self.socket);
        }
    }
}

fn common_args(target: &HostTarget, socket: &Path) -> Vec<String> {
    vec![
        "-S".to_string(),
        socket.display().to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-p".to_string(),
        target.port.to_string(),
    ]
}

fn master_args(
    target: &HostTarget,
    socket: &Path,
    connect_timeout: Duration,
    batch_mode: bool,
) -> Vec<String> {
    let mut args = vec!["-M".to_string(), "-N".to_string()];
    args.extend(common_args(target, socket));
    for opt in [
        "ControlPersist=no".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "StrictHostKeyChecking=accept-new".to_string(),
        "ServerAliveInterval=15".to_string(),
    ] {
        args.push("-o".to_string());
        args.push(opt);
    }
    if batch_mode {
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
    } else {
        args.push("-o".to_string());
        args.push("NumberOfPasswordPrompts=1".to_string());
    }
    if let Some(key) = &target.credentials.identity_file {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args.push(target.destination());
    args
}

fn client_args(target: &HostTarget, socket: &Path, command: &str) -> Vec<String> {
    let mut args = common_args(target, socket);
    args.extend([
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        target.destination(),
        command.to_string(),
    ]);
    args
}

async fn control_command(
    program: &Path,
    target: &HostTarget,
    socket: &Path,
    op: &str,
    timeout: Duration,
) -> bool {
    let mut args = common_args(target, socket);
    args.extend(["-O".to_string(), op.to_string(), target.destination()]);
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    matches!(
        tokio::time::timeout(timeout, status).await,
        Ok(Ok(status)) if status.success()
    )
}

async fn read_stderr(child: &mut Child) -> String {
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf).await;
    }
    buf
}

fn classify_connect_failure(
    host: &str,
    exit_code: Option<i32>,
    stderr: &str,
    connect_timeout: Duration,
) -> ConnectionError {
    let detail = stderr.trim();
    let lower = detail.to_ascii_lowercase();

    if exit_code == Some(SSHPASS_WRONG_PASSWORD)
        || lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
    {
        return ConnectionError::AuthRejected {
            host: host.to_string(),
            detail: if detail.is_empty() {
                "password rejected".to_string()
            } else {
                detail.to_string()
            },
        };
    }
    if lower.contains("timed out") {
        return ConnectionError::Timeout {
            host: host.to_string(),
            after: connect_timeout,
        };
    }

    ConnectionError::Unreachable {
        host: host.to_string(),
        detail: if detail.is_empty() {
            match exit_code {
                Some(code) => format!("ssh exited with status {code}"),
                None => "ssh terminated by signal".to_string(),
            }
        } else {
            detail.to_string()
        },
    }
}
