use std::fmt;

/// Whether any filesystem on the device is currently mounted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    /// Mount points (or a platform note) found for the device or its partitions.
    Mounted(Vec<String>),
    /// The listing tool does not report mounts.
    Unknown,
}

/// A block device discovered on the system.
///
/// This is a snapshot taken by [`crate::platform::list_devices`]; it is never
/// refreshed and is only used for display and selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Identifier to pass back as a target (e.g. `/dev/sdb`, `/dev/disk4`, or `1` on Windows).
    pub id: String,
    pub size_bytes: u64,
    /// Model and transport, as far as the platform reports them.
    pub label: String,
    pub mount: MountState,
    pub removable: Option<bool>,
    /// Holds the running system's root filesystem.
    pub system: bool,
}

impl DeviceDescriptor {
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self.mount, MountState::Mounted(_))
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mount_info = match &self.mount {
            MountState::Mounted(points) => format!("[Mounted at {}]", points.join(", ")),
            MountState::Unmounted => "[Not mounted]".to_string(),
            MountState::Unknown => "[Mount state unknown]".to_string(),
        };

        write!(
            f,
            "{:<15} {:.1} GB {} {}",
            self.id,
            self.size_gb(),
            self.label,
            mount_info
        )?;
        if self.system {
            write!(f, " [SYSTEM]")?;
        }
        Ok(())
    }
}
