//! Creates a single partition spanning the target and puts a filesystem on it.
use crate::config::Config;
use crate::delegate::Runner;
use crate::diskpart;
use crate::error::FormatError;
use crate::platform::{self, Platform};
use crate::target::{FilesystemKind, TargetSpec};
use std::thread;
use std::time::Duration;

/// A filesystem-creation command, minus the partition path appended last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MkfsCommand {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// The mkfs delegate for `fs` on `platform`, or `None` if it is not supported there.
///
/// Windows is served by diskpart's `format` instead, see [`diskpart_fs`].
pub fn mkfs_command(platform: Platform, fs: &FilesystemKind) -> Option<MkfsCommand> {
    let (program, args): (&'static str, &'static [&'static str]) = match (platform, fs) {
        (Platform::Linux, FilesystemKind::Ext2) => ("mkfs.ext2", &["-F"]),
        (Platform::Linux, FilesystemKind::Ext3) => ("mkfs.ext3", &["-F"]),
        (Platform::Linux, FilesystemKind::Ext4) => ("mkfs.ext4", &["-F"]),
        (Platform::Linux, FilesystemKind::Vfat) => ("mkfs.vfat", &["-F", "32"]),
        (Platform::Linux, FilesystemKind::Exfat) => ("mkfs.exfat", &[]),
        (Platform::Linux, FilesystemKind::Ntfs) => ("mkfs.ntfs", &["-Q"]),
        (Platform::MacOs, FilesystemKind::Vfat) => ("newfs_msdos", &["-F", "32"]),
        (Platform::MacOs, FilesystemKind::Exfat) => ("newfs_exfat", &[]),
        _ => return None,
    };
    Some(MkfsCommand { program, args })
}

/// The `fs=` value diskpart's `format` takes for `fs`.
pub fn diskpart_fs(fs: &FilesystemKind) -> Option<&'static str> {
    match fs {
        FilesystemKind::Vfat => Some("fat32"),
        FilesystemKind::Exfat => Some("exfat"),
        FilesystemKind::Ntfs => Some("ntfs"),
        _ => None,
    }
}

/// How the formatter puts the filesystem on the new partition.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FormatDelegate {
    /// `parted mkpart` followed by a mkfs tool.
    Mkfs(MkfsCommand),
    /// diskpart `create partition` and `format fs=<name>`.
    Diskpart(&'static str),
}

pub struct Formatter<'r, R: Runner> {
    runner: &'r R,
    platform: Platform,
    settle_delay: Duration,
    fs: FilesystemKind,
    delegate: FormatDelegate,
}

impl<'r, R: Runner> Formatter<'r, R> {
    /// Binds every delegate needed to put `fs` on a fresh partition.
    ///
    /// Nothing is invoked. The filesystem is checked against the platform's
    /// table first, then the partitioning tool, then the mkfs tool.
    pub fn resolve(
        platform: Platform,
        runner: &'r R,
        config: &Config,
        fs: &FilesystemKind,
    ) -> Result<Self, FormatError> {
        let unsupported = || FormatError::UnsupportedFilesystem(fs.clone());
        let (partitioner, delegate) = match platform {
            Platform::Linux | Platform::MacOs => (
                "parted",
                FormatDelegate::Mkfs(mkfs_command(platform, fs).ok_or_else(unsupported)?),
            ),
            Platform::Windows => (
                "diskpart",
                FormatDelegate::Diskpart(diskpart_fs(fs).ok_or_else(unsupported)?),
            ),
            Platform::Unsupported => return Err(FormatError::UnsupportedPlatform(platform.name())),
        };
        if !runner.has_program(partitioner) {
            return Err(FormatError::ToolUnavailable(partitioner.to_string()));
        }
        if let FormatDelegate::Mkfs(mkfs) = &delegate {
            if !runner.has_program(mkfs.program) {
                return Err(FormatError::ToolUnavailable(mkfs.program.to_string()));
            }
        }
        Ok(Self {
            runner,
            platform,
            settle_delay: config.settle_delay,
            fs: fs.clone(),
            delegate,
        })
    }

    /// Whether `target` names a device this formatter can address: a disk
    /// number for diskpart, a node with derivable partition names otherwise.
    pub fn check_target(&self, target: &TargetSpec) -> Result<(), FormatError> {
        match self.delegate {
            FormatDelegate::Diskpart(_) => self.disk_number(target).map(|_| ()),
            FormatDelegate::Mkfs(_) => self.partition_node(target).map(|_| ()),
        }
    }

    fn disk_number(&self, target: &TargetSpec) -> Result<u32, FormatError> {
        diskpart::disk_number(&target.device).ok_or_else(|| {
            FormatError::InvalidTarget(target.device.clone(), "expected a disk number")
        })
    }

    fn partition_node(&self, target: &TargetSpec) -> Result<String, FormatError> {
        platform::partition_path(self.platform, &target.device, 1).ok_or_else(|| {
            FormatError::InvalidTarget(target.device.clone(), "partition nodes cannot be derived")
        })
    }

    /// Creates one primary partition across `target` and formats it.
    pub fn format(&self, target: &TargetSpec) -> Result<(), FormatError> {
        match &self.delegate {
            FormatDelegate::Mkfs(mkfs) => self.format_with_mkfs(target, mkfs),
            FormatDelegate::Diskpart(fs_name) => self.format_with_diskpart(target, fs_name),
        }
    }

    fn format_with_mkfs(&self, target: &TargetSpec, mkfs: &MkfsCommand) -> Result<(), FormatError> {
        let device = target.device.as_str();
        let partition = self.partition_node(target)?;

        log::info!("creating primary partition on {device}");
        let mut mkpart: Vec<&str> = vec!["-s", device, "mkpart", "primary"];
        if let Some(fs_type) = self.fs.parted_fs_type() {
            mkpart.push(fs_type);
        }
        mkpart.extend(["0%", "100%"]);
        self.runner.status("parted", &mkpart)?;

        self.settle();

        log::info!("formatting {partition} as {}", self.fs);
        let mut args: Vec<&str> = mkfs.args.to_vec();
        args.push(partition.as_str());
        self.runner.status(mkfs.program, &args)?;
        Ok(())
    }

    /// Gives the OS time to publish the new partition's device node.
    fn settle(&self) {
        if self.platform == Platform::Linux && self.runner.has_program("udevadm") {
            if let Err(e) = self.runner.status("udevadm", &["settle"]) {
                log::warn!("udevadm settle failed: {e}");
            }
        }
        if !self.settle_delay.is_zero() {
            log::debug!("waiting {:?} for the partition node", self.settle_delay);
            thread::sleep(self.settle_delay);
        }
    }

    fn format_with_diskpart(&self, target: &TargetSpec, fs_name: &str) -> Result<(), FormatError> {
        let disk = self.disk_number(target)?;
        log::info!("creating and formatting a {fs_name} partition on disk {disk}");
        let commands = [
            "create partition primary".to_string(),
            format!("format fs={fs_name} quick"),
            "assign".to_string(),
        ];
        diskpart::run(self.runner, &diskpart::script(disk, &commands))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_mkfs_table() {
        let cmd = mkfs_command(Platform::Linux, &FilesystemKind::Vfat).unwrap();
        assert_eq!(cmd.program, "mkfs.vfat");
        assert_eq!(cmd.args, &["-F", "32"]);
        assert_eq!(
            mkfs_command(Platform::Linux, &FilesystemKind::Ntfs).unwrap().program,
            "mkfs.ntfs"
        );
    }

    #[test]
    fn unsupported_combinations() {
        assert!(mkfs_command(Platform::MacOs, &FilesystemKind::Ext4).is_none());
        assert!(mkfs_command(Platform::Linux, &FilesystemKind::Other("zfs".into())).is_none());
        assert!(diskpart_fs(&FilesystemKind::Ext4).is_none());
        assert_eq!(diskpart_fs(&FilesystemKind::Vfat), Some("fat32"));
    }
}
