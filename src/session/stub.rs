//! In-memory session used by tests: canned results keyed by command substring.

use super::{CommandResult, ConnectionError, Connector, HostTarget, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Script {
    rules: Vec<(String, CommandResult)>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every command containing `needle` with `stdout`. Earlier rules win.
    pub fn stdout(self, needle: &str, stdout: &str) -> Self {
        self.result(needle, CommandResult::completed(stdout, "", Some(0)))
    }

    pub fn stderr(self, needle: &str, stderr: &str) -> Self {
        self.result(needle, CommandResult::completed("", stderr, Some(1)))
    }

    pub fn result(mut self, needle: &str, result: CommandResult) -> Self {
        self.rules.push((needle.to_string(), result));
        self
    }

    fn answer(&self, command: &str) -> CommandResult {
        self.rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| CommandResult::completed("", "", Some(0)))
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    pub commands: Vec<String>,
    pub closes: usize,
}

pub struct StubSession {
    script: Script,
    journal: Arc<Mutex<Journal>>,
}

impl StubSession {
    pub fn new(script: Script) -> (Self, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        (
            Self {
                script,
                journal: journal.clone(),
            },
            journal,
        )
    }
}

#[async_trait]
impl Session for StubSession {
    async fn execute(&mut self, command: &str, _timeout: Duration) -> CommandResult {
        self.journal
            .lock()
            .unwrap()
            .commands
            .push(command.to_string());
        self.script.answer(command)
    }

    async fn close(&mut self) {
        self.journal.lock().unwrap().closes += 1;
    }
}

#[derive(Default)]
pub struct StubConnector {
    hosts: HashMap<String, Result<Script, ConnectionError>>,
    journals: Mutex<HashMap<String, Arc<Mutex<Journal>>>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str, script: Script) -> Self {
        self.hosts.insert(host.to_string(), Ok(script));
        self
    }

    pub fn failing_host(mut self, host: &str, err: ConnectionError) -> Self {
        self.hosts.insert(host.to_string(), Err(err));
        self
    }

    pub fn journal(&self, host: &str) -> Option<Arc<Mutex<Journal>>> {
        self.journals.lock().unwrap().get(host).cloned()
    }
}

#[async_trait]
impl Connector for StubConnector {
    type Session = StubSession;

    async fn open(&self, target: &HostTarget) -> Result<StubSession, ConnectionError> {
        match self.hosts.get(&target.host) {
            Some(Ok(script)) => {
                let (session, journal) = StubSession::new(script.clone());
                self.journals
                    .lock()
                    .unwrap()
                    .insert(target.host.clone(), journal);
                Ok(session)
            }
            Some(Err(err)) => Err(err.clone()),
            None => Err(ConnectionError::Unreachable {
                host: target.host.clone(),
                detail: "no script for host".to_string(),
            }),
        }
    }
}
