//! Provides platform-specific functionality.
//!
//! Platform differences (which tools list disks, how partitions are named, how
//! elevation is checked) are resolved here, once, from a [`Platform`] value.
//! The per-OS submodules expose the same small API. Their parsers are plain
//! functions over text, so all of them are compiled and tested on every host;
//! only the elevation query is `cfg`-gated.
use crate::delegate::Runner;
use crate::device::DeviceDescriptor;
use crate::error::EnumerateError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

mod linux;
mod macos;
mod windows;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Unsupported,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unsupported
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
            Platform::Unsupported => "this platform",
        }
    }

    pub fn is_unix(self) -> bool {
        matches!(self, Platform::Linux | Platform::MacOs)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lists the block devices visible on `platform`.
///
/// An empty list is not an error. A missing or failing listing tool is
/// reported as an [`EnumerateError`]; listing is informational and never part
/// of a destructive run.
pub fn list_devices<R: Runner>(
    platform: Platform,
    runner: &R,
) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
    let devices = match platform {
        Platform::Linux => linux::list_devices(runner)?,
        Platform::MacOs => macos::list_devices(runner)?,
        Platform::Windows => windows::list_devices(runner)?,
        Platform::Unsupported => return Err(EnumerateError::UnsupportedPlatform(platform.name())),
    };
    log::debug!("found {} devices on {}", devices.len(), platform);
    Ok(devices)
}

/// Derives the device node of partition `index` on the whole disk `disk`.
///
/// | Platform | Whole disk       | Partition 1        |
/// |----------|------------------|--------------------|
/// | Linux    | `/dev/sdb`       | `/dev/sdb1`        |
/// | Linux    | `/dev/nvme0n1`   | `/dev/nvme0n1p1`   |
/// | Linux    | `/dev/mmcblk0`   | `/dev/mmcblk0p1`   |
/// | macOS    | `/dev/disk4`     | `/dev/disk4s1`     |
/// | macOS    | `/dev/rdisk4`    | `/dev/disk4s1`     |
///
/// Returns `None` where partitions have no device path of their own (Windows).
pub fn partition_path(platform: Platform, disk: &str, index: u32) -> Option<String> {
    match platform {
        Platform::Linux => Some(linux::partition_path(disk, index)),
        Platform::MacOs => Some(macos::partition_path(disk, index)),
        Platform::Windows | Platform::Unsupported => None,
    }
}

/// Whether the current process runs as root / Administrator.
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::Uid::effective().is_root()
    }
    #[cfg(windows)]
    {
        // SAFETY: IsUserAnAdmin takes no arguments and only queries the process token.
        unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() != 0 }
    }
    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

/// A JSON scalar that listing tools emit as a number, a boolean or a string
/// depending on their version (`lsblk` switched `"rm":"1"` to `"rm":true`).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Number(u64),
    Text(String),
}

impl Scalar {
    pub(crate) fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    pub(crate) fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Number(n) => Some(*n != 0),
            Scalar::Text(s) => match s.trim() {
                "1" | "true" | "True" => Some(true),
                "0" | "false" | "False" => Some(false),
                _ => None,
            },
        }
    }
}

/// A mounted volume as reported by `sysinfo`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Mounted {
    /// Kernel name of the volume's device node (e.g. "sdb1", "disk4s1").
    pub name: String,
    pub mount_point: String,
}

/// Mounted volumes, used where the listing tool does not report mounts itself.
pub(crate) fn mounted_volumes() -> Vec<Mounted> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter_map(|disk| {
            let name = Path::new(disk.name())
                .file_name()?
                .to_string_lossy()
                .to_string();
            Some(Mounted {
                name,
                mount_point: disk.mount_point().to_string_lossy().to_string(),
            })
        })
        .collect()
}
