//! Scripted diskpart sessions, the Windows stand-in for the partitioning and
//! formatting tools used elsewhere.
use crate::delegate::Runner;
use crate::error::{DelegateError, FormatError, ProvisionError};
use std::io::{self, Write};
use tempfile::NamedTempFile;

pub(crate) enum DiskpartError {
    Script(io::Error),
    Delegate(DelegateError),
}

impl From<DiskpartError> for ProvisionError {
    fn from(e: DiskpartError) -> Self {
        match e {
            DiskpartError::Script(e) => ProvisionError::Script(e),
            DiskpartError::Delegate(e) => ProvisionError::Delegate(e),
        }
    }
}

impl From<DiskpartError> for FormatError {
    fn from(e: DiskpartError) -> Self {
        match e {
            DiskpartError::Script(e) => FormatError::Script(e),
            DiskpartError::Delegate(e) => FormatError::Delegate(e),
        }
    }
}

/// Windows targets are disk numbers as shown by `Get-Disk`.
pub(crate) fn disk_number(target: &str) -> Option<u32> {
    target.trim().parse().ok()
}

/// Builds a script that selects `disk`, runs `commands`, and exits.
pub(crate) fn script(disk: u32, commands: &[String]) -> String {
    let mut script = format!("select disk {disk}\n");
    for command in commands {
        script.push_str(command);
        script.push('\n');
    }
    script.push_str("exit\n");
    script
}

/// Writes `script` to a temporary file and runs `diskpart /s` on it.
pub(crate) fn run<R: Runner>(runner: &R, script: &str) -> Result<(), DiskpartError> {
    let mut file = NamedTempFile::new().map_err(DiskpartError::Script)?;
    file.write_all(script.as_bytes())
        .and_then(|_| file.flush())
        .map_err(DiskpartError::Script)?;

    let path = file.path().to_string_lossy().to_string();
    log::debug!("diskpart script:\n{script}");
    runner
        .status("diskpart", &["/s", &path])
        .map_err(DiskpartError::Delegate)?;
    Ok(())
}
