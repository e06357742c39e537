//! In-memory provider for tests.
//!
//! Records every call and can be scripted to fail lifecycle stages or
//! commands whose command line contains a given substring.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ProviderError, Result};
use crate::{context_name, CreateHint, ExecOptions, ExecOutput, ExecutionHandle, Provider};

/// Lifecycle stage that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStage {
    Create,
    Start,
    Stop,
    Destroy,
    List,
}

/// Recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create { id: String },
    Start { id: String },
    Stop { id: String },
    Destroy { id: String },
    Exec {
        id: String,
        command: String,
        env: BTreeMap<String, String>,
    },
    List,
}

impl MockCall {
    pub fn id(&self) -> Option<&str> {
        match self {
            MockCall::Create { id }
            | MockCall::Start { id }
            | MockCall::Stop { id }
            | MockCall::Destroy { id }
            | MockCall::Exec { id, .. } => Some(id),
            MockCall::List => None,
        }
    }
}

struct ExecFailure {
    pattern: String,
    remaining: Option<u32>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    failing_stages: HashSet<MockStage>,
    exec_failures: Vec<ExecFailure>,
    exec_delay: Option<Duration>,
    destroy_delay: Option<Duration>,
    contexts: BTreeMap<String, ExecutionHandle>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct MockProvider {
    inner: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `stage` fails from now on.
    pub fn fail_on(&self, stage: MockStage) -> &Self {
        self.inner.lock().failing_stages.insert(stage);
        self
    }

    /// Every exec whose command line contains `pattern` exits non-zero.
    pub fn fail_exec_matching(&self, pattern: impl Into<String>) -> &Self {
        self.inner.lock().exec_failures.push(ExecFailure {
            pattern: pattern.into(),
            remaining: None,
        });
        self
    }

    /// The first `times` execs containing `pattern` exit non-zero.
    pub fn fail_exec_times(&self, pattern: impl Into<String>, times: u32) -> &Self {
        self.inner.lock().exec_failures.push(ExecFailure {
            pattern: pattern.into(),
            remaining: Some(times),
        });
        self
    }

    /// Remove every exec failure rule.
    pub fn clear_exec_failures(&self) -> &Self {
        self.inner.lock().exec_failures.clear();
        self
    }

    /// Make every exec take `delay` before completing.
    pub fn set_exec_delay(&self, delay: Duration) -> &Self {
        self.inner.lock().exec_delay = Some(delay);
        self
    }

    /// Make every destroy take `delay` before removing the context.
    pub fn set_destroy_delay(&self, delay: Duration) -> &Self {
        self.inner.lock().destroy_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.lock().calls.clone()
    }

    /// Command lines executed inside the context of workspace `id`, in order.
    pub fn exec_commands(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Exec {
                    id: call_id,
                    command,
                    ..
                } if call_id == id => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of execs whose command line contains `pattern`.
    pub fn exec_count(&self, pattern: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, MockCall::Exec { command, .. } if command.contains(pattern)))
            .count()
    }

    pub fn context_exists(&self, id: &str) -> bool {
        self.inner.lock().contexts.contains_key(id)
    }

    fn enter(&self, call: MockCall, stage: Option<MockStage>) -> Result<()> {
        let mut state = self.inner.lock();
        state.calls.push(call);
        match stage {
            Some(stage) if state.failing_stages.contains(&stage) => Err(
                ProviderError::command_failed(format!("mock {stage:?}"), Some(1), "mock failure"),
            ),
            _ => Ok(()),
        }
    }

    fn set_status(&self, id: &str, status: &str) -> Result<()> {
        let mut state = self.inner.lock();
        let handle = state
            .contexts
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(context_name(id)))?;
        handle.status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create(
        &self,
        id: &str,
        _workspace_path: &Path,
        hint: &CreateHint,
    ) -> Result<ExecutionHandle> {
        self.enter(MockCall::Create { id: id.to_string() }, Some(MockStage::Create))?;

        let mut state = self.inner.lock();
        state.next_id += 1;
        let handle = ExecutionHandle {
            id: format!("mock-{:04}", state.next_id),
            name: context_name(id),
            provider: "mock".to_string(),
            status: "created".to_string(),
            labels: hint.labels.clone(),
        };
        state.contexts.insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.enter(MockCall::Start { id: id.to_string() }, Some(MockStage::Start))?;
        self.set_status(id, "running")
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.enter(MockCall::Stop { id: id.to_string() }, Some(MockStage::Stop))?;
        self.set_status(id, "stopped")
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.enter(MockCall::Destroy { id: id.to_string() }, Some(MockStage::Destroy))?;

        let delay = self.inner.lock().destroy_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.inner
            .lock()
            .contexts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(context_name(id)))
    }

    async fn exec(&self, id: &str, opts: &ExecOptions) -> Result<ExecOutput> {
        let command = opts.command_line();
        self.enter(
            MockCall::Exec {
                id: id.to_string(),
                command: command.clone(),
                env: opts.env.clone(),
            },
            None,
        )?;

        let delay = self.inner.lock().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.inner.lock();
        if !state.contexts.contains_key(id) {
            return Err(ProviderError::NotFound(context_name(id)));
        }

        let failure = state
            .exec_failures
            .iter_mut()
            .find(|rule| command.contains(&rule.pattern) && rule.remaining != Some(0));
        if let Some(rule) = failure {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(ProviderError::command_failed(command, Some(1), "mock failure"));
        }

        Ok(ExecOutput {
            stdout: if opts.capture_stdout {
                format!("mock output: {command}")
            } else {
                String::new()
            },
            stderr: String::new(),
        })
    }

    async fn list(&self) -> Result<Vec<ExecutionHandle>> {
        self.enter(MockCall::List, Some(MockStage::List))?;
        Ok(self.inner.lock().contexts.values().cloned().collect())
    }
}
