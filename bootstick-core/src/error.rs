//! Error types for every stage of a run.
//!
//! Each component has its own error enum so callers can match on the exact
//! failure, and every enum maps onto a [`FailureKind`] so the orchestrator and
//! front-ends can treat them uniformly.
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::target::{FilesystemKind, PartitionScheme};

/// Coarse classification shared by all stage errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The operator declined the confirmation.
    Aborted,
    /// A delegate the step needs is not installed.
    ToolUnavailable,
    /// The requested combination cannot be served on this platform or with these tools.
    UnsupportedRequest,
    /// A delegate ran but reported failure.
    DelegateFailed,
    /// Something that must hold before a destructive call does not.
    PreconditionFailed,
    /// The operator interrupted the run.
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Aborted => "aborted",
            FailureKind::ToolUnavailable => "tool unavailable",
            FailureKind::UnsupportedRequest => "unsupported request",
            FailureKind::DelegateFailed => "delegate failed",
            FailureKind::PreconditionFailed => "precondition failed",
            FailureKind::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Failure of an external platform utility.
#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {diagnostic}")]
    Failed {
        program: String,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("Could not run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl DelegateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DelegateError::NotFound(_) => FailureKind::ToolUnavailable,
            DelegateError::Failed { .. } | DelegateError::Io { .. } => FailureKind::DelegateFailed,
        }
    }
}

#[derive(Error, Debug)]
pub enum EnumerateError {
    #[error("No device listing tool is available ({0})")]
    ToolUnavailable(String),

    #[error("Device listing is not supported on {0}")]
    UnsupportedPlatform(&'static str),

    #[error(transparent)]
    Delegate(#[from] DelegateError),

    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unexpected output from {tool}: {source}")]
    Parse {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not stage {tool} output: {source}")]
    Stage {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
}

/// The operator did not acknowledge the target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Confirmation for {target} was not given")]
pub struct Aborted {
    pub target: String,
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Neither sgdisk nor parted is installed. Install parted (or gdisk) and retry.")]
    NoToolAvailable,

    #[error(
        "{tool} can only reach {requested} by converting to a GPT-native table; install parted to create an MBR table"
    )]
    UnsupportedConversion {
        tool: &'static str,
        requested: PartitionScheme,
    },

    #[error("Partitioning is not supported on {0}")]
    UnsupportedPlatform(&'static str),

    #[error("Invalid target '{0}': {1}")]
    InvalidTarget(String, &'static str),

    #[error("Could not prepare the diskpart script: {0}")]
    Script(#[source] io::Error),

    #[error(transparent)]
    Delegate(#[from] DelegateError),
}

impl ProvisionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProvisionError::NoToolAvailable => FailureKind::ToolUnavailable,
            ProvisionError::UnsupportedConversion { .. }
            | ProvisionError::UnsupportedPlatform(_)
            | ProvisionError::InvalidTarget(..) => FailureKind::UnsupportedRequest,
            ProvisionError::Script(_) => FailureKind::PreconditionFailed,
            ProvisionError::Delegate(e) => e.kind(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unsupported filesystem: {0}")]
    UnsupportedFilesystem(FilesystemKind),

    #[error("{0} is not installed")]
    ToolUnavailable(String),

    #[error("Formatting is not supported on {0}")]
    UnsupportedPlatform(&'static str),

    #[error("Invalid target '{0}': {1}")]
    InvalidTarget(String, &'static str),

    #[error("Could not prepare the diskpart script: {0}")]
    Script(#[source] io::Error),

    #[error(transparent)]
    Delegate(#[from] DelegateError),
}

impl FormatError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FormatError::UnsupportedFilesystem(_)
            | FormatError::UnsupportedPlatform(_)
            | FormatError::InvalidTarget(..) => FailureKind::UnsupportedRequest,
            FormatError::ToolUnavailable(_) => FailureKind::ToolUnavailable,
            FormatError::Script(_) => FailureKind::PreconditionFailed,
            FormatError::Delegate(e) => e.kind(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Image file {path} is not readable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Raw writing is not supported on {0}; use a dedicated imaging tool there")]
    UnsupportedOnPlatform(&'static str),

    #[error("{0} is not installed")]
    ToolUnavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Verification failed: hash mismatch")]
    VerifyMismatch,

    #[error(
        "Interrupted{}; the target is partially written and its contents are unspecified",
        .written.map(|n| format!(" after {n} bytes")).unwrap_or_default()
    )]
    Interrupted { written: Option<u64> },
}

impl ImageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ImageError::SourceMissing(_) | ImageError::SourceUnreadable { .. } => {
                FailureKind::PreconditionFailed
            }
            ImageError::UnsupportedOnPlatform(_) => FailureKind::UnsupportedRequest,
            ImageError::ToolUnavailable(_) => FailureKind::ToolUnavailable,
            ImageError::WriteFailed(_) | ImageError::VerifyMismatch => FailureKind::DelegateFailed,
            ImageError::Interrupted { .. } => FailureKind::Interrupted,
        }
    }
}

impl From<DelegateError> for ImageError {
    fn from(e: DelegateError) -> Self {
        match e {
            DelegateError::NotFound(program) => ImageError::ToolUnavailable(program),
            other => ImageError::WriteFailed(other.to_string()),
        }
    }
}

/// Rejected [`Config`](crate::config::Config) values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Block size must be a non-zero multiple of {align} bytes, got {value}")]
    BlockSize { value: usize, align: usize },
}

/// Failure of one destructive step, as seen by the orchestrator.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Provision(e) => e.kind(),
            StepError::Format(e) => e.kind(),
            StepError::Image(e) => e.kind(),
        }
    }
}
