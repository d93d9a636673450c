//! Invocation of external platform utilities.
//!
//! Everything that shells out goes through [`Runner`] so a run can be driven
//! against a recording fake in tests, without root and without real disks.
use crate::error::DelegateError;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Exit status and captured text of a finished delegate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DelegateOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl DelegateOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best diagnostic text: stderr if the tool wrote any, stdout otherwise.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

pub trait Runner {
    /// Whether `program` can be found, used to pick a strategy before any call is made.
    fn has_program(&self, program: &str) -> bool;

    /// Runs `program` to completion and captures its output, whatever the exit code.
    fn output(&self, program: &str, args: &[&str]) -> Result<DelegateOutput, DelegateError>;

    /// Runs `program` with its output going straight to the operator's terminal.
    ///
    /// Used for long copies whose progress text should appear verbatim.
    fn stream(&self, program: &str, args: &[&str]) -> Result<(), DelegateError>;

    /// Runs `program` and fails with the captured diagnostics unless it exits 0.
    fn status(&self, program: &str, args: &[&str]) -> Result<DelegateOutput, DelegateError> {
        let output = self.output(program, args)?;
        if !output.success() {
            return Err(DelegateError::Failed {
                program: program.to_string(),
                code: output.code,
                diagnostic: output.diagnostic(),
            });
        }
        Ok(output)
    }
}

/// Runs real processes found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

fn map_spawn_err(program: &str, err: io::Error) -> DelegateError {
    if err.kind() == io::ErrorKind::NotFound {
        return DelegateError::NotFound(program.to_string());
    }
    DelegateError::Io {
        program: program.to_string(),
        source: err,
    }
}

/// Looks `program` up in each `PATH` entry, honouring `PATHEXT` on Windows.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let exts: Vec<String> = if cfg!(windows) {
        env::var("PATHEXT")
            .unwrap_or_else(|_| ".EXE;.CMD;.BAT;.COM".to_string())
            .split(';')
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        let full = dir.join(program);
        if full.is_file() {
            return Some(full);
        }
        exts.iter()
            .map(|ext| dir.join(format!("{program}{ext}")))
            .find(|p| p.is_file())
    })
}

impl Runner for SystemRunner {
    fn has_program(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }

    fn output(&self, program: &str, args: &[&str]) -> Result<DelegateOutput, DelegateError> {
        log::debug!("running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| map_spawn_err(program, e))?;
        let output = DelegateOutput::from_output(output);
        log::debug!("{} exited with {:?}", program, output.code);
        Ok(output)
    }

    fn stream(&self, program: &str, args: &[&str]) -> Result<(), DelegateError> {
        log::debug!("running {} {} (streaming)", program, args.join(" "));
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| map_spawn_err(program, e))?;
        if !status.success() {
            return Err(DelegateError::Failed {
                program: program.to_string(),
                code: status.code(),
                diagnostic: "see output above".to_string(),
            });
        }
        Ok(())
    }
}
