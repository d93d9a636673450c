//! Recording fake for the `Runner` trait.
//!
//! Records every invocation without spawning anything, so whole runs can be
//! exercised without root privileges or real hardware.
#![allow(dead_code)]

use bootstick_core::delegate::{DelegateOutput, Runner};
use bootstick_core::error::DelegateError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeRunner {
    installed: HashSet<String>,
    stdout: HashMap<String, String>,
    failing: HashMap<String, String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: &[&str]) -> Self {
        let mut runner = Self::new();
        for tool in tools {
            runner.installed.insert(tool.to_string());
        }
        runner
    }

    /// What `program` prints on success.
    pub fn with_stdout(mut self, program: &str, stdout: &str) -> Self {
        self.stdout.insert(program.to_string(), stdout.to_string());
        self
    }

    /// Makes `program` exit 1 with `stderr`.
    pub fn failing(mut self, program: &str, stderr: &str) -> Self {
        self.failing.insert(program.to_string(), stderr.to_string());
        self
    }

    /// Every invocation so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Programs invoked so far, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c[0].clone()).collect()
    }

    fn invoke(&self, program: &str, args: &[&str]) -> Result<DelegateOutput, DelegateError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call);

        if !self.installed.contains(program) {
            return Err(DelegateError::NotFound(program.to_string()));
        }
        if let Some(stderr) = self.failing.get(program) {
            return Ok(DelegateOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.clone(),
            });
        }
        Ok(DelegateOutput {
            code: Some(0),
            stdout: self.stdout.get(program).cloned().unwrap_or_default(),
            stderr: String::new(),
        })
    }
}

impl Runner for FakeRunner {
    fn has_program(&self, program: &str) -> bool {
        self.installed.contains(program)
    }

    fn output(&self, program: &str, args: &[&str]) -> Result<DelegateOutput, DelegateError> {
        self.invoke(program, args)
    }

    fn stream(&self, program: &str, args: &[&str]) -> Result<(), DelegateError> {
        let output = self.invoke(program, args)?;
        if !output.success() {
            return Err(DelegateError::Failed {
                program: program.to_string(),
                code: output.code,
                diagnostic: output.diagnostic(),
            });
        }
        Ok(())
    }
}
