//! Tunables for a run.
use crate::error::ConfigError;
use std::time::Duration;

/// Default copy block: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Default pause between creating a partition and formatting it.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Direct I/O needs whole sectors.
pub const SECTOR_SIZE: usize = 512;

/// How the raw imager moves bytes onto the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CopyMethod {
    /// In-process block copy followed by `fsync`.
    #[default]
    Native,
    /// Hand the copy to `dd` with `conv=fsync`.
    Dd,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub block_size: usize,
    /// Time the kernel is given to publish a new partition node before mkfs runs.
    pub settle_delay: Duration,
    /// Re-read the device after writing and compare SHA-256 digests.
    pub verify: bool,
    pub copy_method: CopyMethod,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            settle_delay: DEFAULT_SETTLE_DELAY,
            verify: false,
            copy_method: CopyMethod::Native,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 || self.block_size % SECTOR_SIZE != 0 {
            return Err(ConfigError::BlockSize {
                value: self.block_size,
                align: SECTOR_SIZE,
            });
        }
        Ok(())
    }
}
