use super::{Mounted, Scalar, mounted_volumes};
use crate::delegate::Runner;
use crate::device::{DeviceDescriptor, MountState};
use crate::error::EnumerateError;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const PROC_PARTITIONS: &str = "/proc/partitions";

const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,MOUNTPOINT,MODEL,TRAN,RM";

/// Partition `index` of `disk`: a `p` separator is inserted when the
/// whole-disk name ends in a digit (`nvme0n1`, `mmcblk0`, `loop0`).
pub(super) fn partition_path(disk: &str, index: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{disk}p{index}")
    } else {
        format!("{disk}{index}")
    }
}

/// Whether `name` is a partition of the whole disk `disk` under [`partition_path`].
fn is_partition_of(name: &str, disk: &str) -> bool {
    let Some(rest) = name.strip_prefix(disk) else {
        return false;
    };
    let digits = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(d) => d,
            None => return false,
        }
    } else {
        rest
    };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_virtual(name: &str) -> bool {
    name.starts_with("loop") || name.starts_with("ram") || name.starts_with("zram")
}

pub(super) fn list_devices<R: Runner>(runner: &R) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
    if runner.has_program("lsblk") {
        let output = runner.status("lsblk", &["-J", "-b", "-o", LSBLK_COLUMNS])?;
        return parse_lsblk(&output.stdout);
    }

    log::warn!("lsblk not found, falling back to {PROC_PARTITIONS}");
    let data = fs::read_to_string(PROC_PARTITIONS).map_err(|source| EnumerateError::Io {
        path: PathBuf::from(PROC_PARTITIONS),
        source,
    })?;
    Ok(parse_proc_partitions(&data, &mounted_volumes()))
}

#[derive(Debug, Deserialize)]
struct Lsblk {
    #[serde(default)]
    blockdevices: Vec<BlockDev>,
}

#[derive(Debug, Deserialize)]
struct BlockDev {
    name: String,
    size: Option<Scalar>,
    #[serde(rename = "type")]
    kind: String,
    mountpoint: Option<String>,
    model: Option<String>,
    tran: Option<String>,
    rm: Option<Scalar>,
    #[serde(default)]
    children: Vec<BlockDev>,
}

impl BlockDev {
    /// Mount points of this node and everything stacked on it (partitions, LVM, crypt).
    fn mount_points(&self, out: &mut Vec<String>) {
        if let Some(mount) = self.mountpoint.as_deref().filter(|m| !m.is_empty()) {
            out.push(mount.to_string());
        }
        for child in &self.children {
            child.mount_points(out);
        }
    }

    fn label(&self) -> String {
        let model = self.model.as_deref().unwrap_or("").trim();
        let tran = self.tran.as_deref().unwrap_or("");
        match (model.is_empty(), tran.is_empty()) {
            (false, false) => format!("{model} ({tran})"),
            (false, true) => model.to_string(),
            (true, false) => format!("({tran})"),
            (true, true) => String::new(),
        }
    }
}

/// Builds descriptors from `lsblk -J -b` output.
///
/// Only top-level `disk` nodes become devices. Mount points anywhere in a
/// disk's subtree are credited to it, and a disk holding `/` is flagged as the
/// system disk.
pub(crate) fn parse_lsblk(stdout: &str) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Lsblk = serde_json::from_str(stdout).map_err(|source| EnumerateError::Parse {
        tool: "lsblk",
        source,
    })?;

    Ok(parsed
        .blockdevices
        .into_iter()
        .filter(|dev| dev.kind == "disk" && !is_virtual(&dev.name))
        .map(|dev| {
            let mut points = Vec::new();
            dev.mount_points(&mut points);
            let system = points.iter().any(|p| p == "/");
            DeviceDescriptor {
                id: format!("/dev/{}", dev.name),
                size_bytes: dev.size.as_ref().and_then(Scalar::as_u64).unwrap_or(0),
                label: dev.label(),
                mount: if points.is_empty() {
                    MountState::Unmounted
                } else {
                    MountState::Mounted(points)
                },
                removable: dev.rm.as_ref().and_then(Scalar::as_bool),
                system,
            }
        })
        .collect())
}

/// Builds descriptors for whole disks listed in `/proc/partitions`.
///
/// Sizes there are in 1 KiB blocks. Mount state comes from `mounted`.
pub(crate) fn parse_proc_partitions(data: &str, mounted: &[Mounted]) -> Vec<DeviceDescriptor> {
    let entries: Vec<(String, u64)> = data
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() != 4 {
                return None;
            }
            let blocks = cols[2].parse::<u64>().ok()?;
            Some((cols[3].to_string(), blocks))
        })
        .collect();

    entries
        .iter()
        .filter(|(name, _)| !is_virtual(name))
        .filter(|(name, _)| !entries.iter().any(|(disk, _)| is_partition_of(name, disk)))
        .map(|(name, blocks)| {
            let points: Vec<String> = mounted
                .iter()
                .filter(|m| m.name == *name || is_partition_of(&m.name, name))
                .map(|m| m.mount_point.clone())
                .collect();
            let system = points.iter().any(|p| p == "/");
            DeviceDescriptor {
                id: format!("/dev/{name}"),
                size_bytes: blocks.saturating_mul(1024),
                label: String::new(),
                mount: if points.is_empty() {
                    MountState::Unmounted
                } else {
                    MountState::Mounted(points)
                },
                removable: None,
                system,
            }
        })
        .collect()
}
