//! In-process doubles for providers and the model backend.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use approval::Arguments;
use serde_json::json;

use crate::backend::LlmBackend;
use crate::tools::{ToolDescriptor, ToolError, ToolOutput, ToolProvider};
use crate::{Error, Result};

pub fn tool(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("{name} tool"),
        schema: json!({"type": "object"}),
    }
}

pub fn args(value: serde_json::Value) -> Arguments {
    serde_json::from_value(value).unwrap()
}

/// A provider that serves a fixed catalog and records every call.
pub struct FakeProvider {
    tools: Mutex<Vec<ToolDescriptor>>,
    output: String,
    failure: Option<ToolError>,
    unreachable: bool,
    list_count: AtomicUsize,
    calls: Mutex<Vec<(String, Arguments)>>,
    shutdown_log: Option<(&'static str, Arc<Mutex<Vec<&'static str>>>)>,
}

impl FakeProvider {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools: Mutex::new(tools),
            output: "ok".to_string(),
            failure: None,
            unreachable: false,
            list_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            shutdown_log: None,
        }
    }

    pub fn responding(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Every call fails with `message` as a provider error.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(ToolError::Provider(message.to_string()));
        self
    }

    pub fn timing_out(mut self) -> Self {
        self.failure = Some(ToolError::Timeout("tools/call".to_string()));
        self
    }

    /// Catalog listing fails.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn on_shutdown(mut self, name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
        self.shutdown_log = Some((name, log));
        self
    }

    pub fn set_tools(&self, tools: Vec<ToolDescriptor>) {
        *self.tools.lock().unwrap() = tools;
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Arguments)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolProvider for FakeProvider {
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(ToolError::Provider("provider exited".to_string()));
        }
        Ok(self.tools.lock().unwrap().clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        args: &Arguments,
    ) -> std::result::Result<ToolOutput, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), args.clone()));
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(ToolOutput::new(self.output.clone())),
        }
    }

    async fn shutdown(self) {
        if let Some((name, log)) = self.shutdown_log {
            log.lock().unwrap().push(name);
        }
    }
}

/// A backend that replays queued completions and records its prompts.
///
/// Once the queue is empty every completion fails.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failed completion.
    pub fn then_fail(self) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Api("503 Service Unavailable".to_string())));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Network("script exhausted".to_string())))
    }
}
