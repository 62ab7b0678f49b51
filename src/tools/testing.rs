use std::cell::RefCell;

use super::{ToolInvocation, ToolOutput, ToolRunner};
use crate::errors::Result;

type Responder = Box<dyn Fn(&ToolInvocation) -> Result<ToolOutput>>;

/// Test double that records every invocation and answers from a closure.
/// The closure may touch the filesystem to emulate the real tool.
pub struct ScriptedTool {
    responder: Responder,
    calls: RefCell<Vec<ToolInvocation>>,
}

impl ScriptedTool {
    pub fn new(responder: impl Fn(&ToolInvocation) -> Result<ToolOutput> + 'static) -> Self {
        ScriptedTool {
            responder: Box::new(responder),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every command exits 0 with the given stdout.
    pub fn succeeding(stdout: &str) -> Self {
        let stdout = stdout.to_string();
        ScriptedTool::new(move |_| Ok(ok(&stdout)))
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.borrow().clone()
    }
}

impl ToolRunner for ScriptedTool {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.calls.borrow_mut().push(invocation.clone());
        (self.responder)(invocation)
    }
}

pub fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

pub fn failed(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(code),
    }
}

pub fn mentions(invocation: &ToolInvocation, needle: &str) -> bool {
    invocation
        .args
        .iter()
        .any(|a| a.to_string_lossy().contains(needle))
}
