//! Scripted in-process provider.
//!
//! Used by the orchestrator and gateway tests, and selectable at runtime with
//! `AIW_CONTAINER_PROVIDER=mock` for local development without Docker.

use crate::error::{ProviderError, Result};
use crate::{CommandOutput, EnvironmentInfo, Provider, RepositoryInfo, RepositorySpec};
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Calls recorded by [`MockProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    Repository,
    Container,
    Chat,
    Stop,
    Delete,
}

#[derive(Debug, Clone)]
enum Outcome<T> {
    Succeed(T),
    Fail(String),
    /// The underlying command hit its own timeout after this many seconds.
    TimedOut(u64),
}

#[derive(Debug)]
struct Script {
    repository_url: Option<String>,
    repository: Outcome<()>,
    container_handle: Option<String>,
    container: Outcome<()>,
    container_delay: Duration,
    chat: Outcome<CommandOutput>,
    chat_delay: Duration,
    stop: Outcome<()>,
    delete: Outcome<()>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            repository_url: None,
            repository: Outcome::Succeed(()),
            container_handle: None,
            container: Outcome::Succeed(()),
            container_delay: Duration::ZERO,
            chat: Outcome::Succeed(CommandOutput {
                status: Some(0),
                stdout: r#"{"success": true, "response": "ok"}"#.to_string(),
                stderr: String::new(),
            }),
            chat_delay: Duration::ZERO,
            stop: Outcome::Succeed(()),
            delete: Outcome::Succeed(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<Script>,
    calls: Mutex<HashMap<MockCall, usize>>,
    messages: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: MockCall) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        *calls.entry(call).or_default() += 1;
    }

    /// Number of times `call` was invoked.
    pub fn calls(&self, call: MockCall) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    /// Chat payloads received, in call order.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn with_repository_url(self, url: &str) -> Self {
        self.script().repository_url = Some(url.to_string());
        self
    }

    pub fn failing_repository(self, message: &str) -> Self {
        self.script().repository = Outcome::Fail(message.to_string());
        self
    }

    pub fn with_container_handle(self, handle: &str) -> Self {
        self.script().container_handle = Some(handle.to_string());
        self
    }

    pub fn failing_container(self, message: &str) -> Self {
        self.script().container = Outcome::Fail(message.to_string());
        self
    }

    /// `docker run` / `devpod up` gives up with a command timeout.
    pub fn timing_out_container(self, seconds: u64) -> Self {
        self.script().container = Outcome::TimedOut(seconds);
        self
    }

    pub fn with_container_delay(self, delay: Duration) -> Self {
        self.script().container_delay = delay;
        self
    }

    /// Chat handler exits 0 and prints `stdout`.
    pub fn with_chat_stdout(self, stdout: &str) -> Self {
        self.with_chat_output(CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn with_chat_output(self, output: CommandOutput) -> Self {
        self.script().chat = Outcome::Succeed(output);
        self
    }

    pub fn failing_chat(self, message: &str) -> Self {
        self.script().chat = Outcome::Fail(message.to_string());
        self
    }

    pub fn with_chat_delay(self, delay: Duration) -> Self {
        self.script().chat_delay = delay;
        self
    }

    pub fn failing_stop(self, message: &str) -> Self {
        self.script().stop = Outcome::Fail(message.to_string());
        self
    }

    pub fn failing_delete(self, message: &str) -> Self {
        self.script().delete = Outcome::Fail(message.to_string());
        self
    }

    /// Change the chat outcome after construction (the provider is usually shared by then).
    pub fn set_chat_stdout(&self, stdout: &str) {
        self.script().chat = Outcome::Succeed(CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
    }
}

fn settle<T>(outcome: Outcome<T>) -> Result<T> {
    match outcome {
        Outcome::Succeed(value) => Ok(value),
        Outcome::Fail(msg) => Err(ProviderError::CommandFailed(msg)),
        Outcome::TimedOut(seconds) => Err(ProviderError::Timeout {
            command: "mock".to_string(),
            seconds,
        }),
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn provision_repository(&self, spec: &RepositorySpec) -> Result<RepositoryInfo> {
        self.record(MockCall::Repository);
        let (outcome, url) = {
            let script = self.script();
            (script.repository.clone(), script.repository_url.clone())
        };
        settle(outcome)?;

        let url = url.unwrap_or_else(|| format!("https://github.com/mock/{}", spec.name));
        Ok(RepositoryInfo {
            clone_url: format!("{}.git", url),
            url,
        })
    }

    fn provision_container(
        &self,
        workspace_id: &str,
        _repository: &RepositoryInfo,
    ) -> Result<EnvironmentInfo> {
        self.record(MockCall::Container);
        let (outcome, handle, delay) = {
            let script = self.script();
            (
                script.container.clone(),
                script.container_handle.clone(),
                script.container_delay,
            )
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        settle(outcome)?;

        Ok(EnvironmentInfo {
            handle: handle.unwrap_or_else(|| workspace_id.to_string()),
        })
    }

    fn dispatch_command(&self, _handle: &str, message: &str) -> Result<CommandOutput> {
        self.record(MockCall::Chat);
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
        let (outcome, delay) = {
            let script = self.script();
            (script.chat.clone(), script.chat_delay)
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        settle(outcome)
    }

    fn stop_environment(&self, _handle: &str) -> Result<()> {
        self.record(MockCall::Stop);
        let outcome = self.script().stop.clone();
        settle(outcome)
    }

    fn delete_environment(&self, _handle: &str) -> Result<()> {
        self.record(MockCall::Delete);
        let outcome = self.script().delete.clone();
        settle(outcome)
    }
}
