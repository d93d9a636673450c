//! Operator intent for a single run: which device, which table, which filesystem.
use std::fmt;
use std::str::FromStr;

/// Partition-table scheme to write onto the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionScheme {
    Gpt,
    Mbr,
}

impl PartitionScheme {
    /// Label name understood by `parted mklabel`.
    pub fn parted_label(self) -> &'static str {
        match self {
            PartitionScheme::Gpt => "gpt",
            PartitionScheme::Mbr => "msdos",
        }
    }

    /// Keyword understood by diskpart's `convert`.
    pub fn diskpart_keyword(self) -> &'static str {
        match self {
            PartitionScheme::Gpt => "gpt",
            PartitionScheme::Mbr => "mbr",
        }
    }
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PartitionScheme::Gpt => "gpt",
            PartitionScheme::Mbr => "mbr",
        })
    }
}

impl FromStr for PartitionScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpt" => Ok(PartitionScheme::Gpt),
            "mbr" | "msdos" | "dos" => Ok(PartitionScheme::Mbr),
            other => Err(format!("unknown partition scheme '{other}' (expected gpt or mbr)")),
        }
    }
}

/// Filesystem requested for the single partition created by the formatter.
///
/// Parsing never fails: names the tool does not know end up in
/// [`FilesystemKind::Other`] so the formatter can reject them itself, before
/// touching the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilesystemKind {
    Ext2,
    Ext3,
    Ext4,
    /// FAT32, accepted as `vfat` or `fat32`.
    Vfat,
    Exfat,
    Ntfs,
    Other(String),
}

impl FilesystemKind {
    /// The fs-type hint passed to `parted mkpart`, if parted has one.
    pub fn parted_fs_type(&self) -> Option<&'static str> {
        match self {
            FilesystemKind::Ext2 => Some("ext2"),
            FilesystemKind::Ext3 => Some("ext3"),
            FilesystemKind::Ext4 => Some("ext4"),
            FilesystemKind::Vfat => Some("fat32"),
            FilesystemKind::Ntfs => Some("ntfs"),
            FilesystemKind::Exfat | FilesystemKind::Other(_) => None,
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilesystemKind::Ext2 => f.write_str("ext2"),
            FilesystemKind::Ext3 => f.write_str("ext3"),
            FilesystemKind::Ext4 => f.write_str("ext4"),
            FilesystemKind::Vfat => f.write_str("vfat"),
            FilesystemKind::Exfat => f.write_str("exfat"),
            FilesystemKind::Ntfs => f.write_str("ntfs"),
            FilesystemKind::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for FilesystemKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "ext2" => FilesystemKind::Ext2,
            "ext3" => FilesystemKind::Ext3,
            "ext4" => FilesystemKind::Ext4,
            "vfat" | "fat32" | "fat" => FilesystemKind::Vfat,
            "exfat" => FilesystemKind::Exfat,
            "ntfs" => FilesystemKind::Ntfs,
            _ => FilesystemKind::Other(s.to_string()),
        })
    }
}

/// The device a run operates on, plus the optional provisioning requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    /// Platform identifier exactly as the operator typed it
    /// (`/dev/sdb`, `/dev/disk4`, or a disk number on Windows).
    pub device: String,
    pub scheme: Option<PartitionScheme>,
    pub filesystem: Option<FilesystemKind>,
}

impl TargetSpec {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            scheme: None,
            filesystem: None,
        }
    }

    pub fn with_scheme(mut self, scheme: PartitionScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_filesystem(mut self, fs: FilesystemKind) -> Self {
        self.filesystem = Some(fs);
        self
    }
}
