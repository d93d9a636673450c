use crate::delegate::Runner;
use crate::device::{DeviceDescriptor, MountState};
use crate::error::EnumerateError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::{self, Write};
use tempfile::NamedTempFile;

/// Partition `index` of `disk` in the `diskNsM` scheme. Raw nodes
/// (`/dev/rdiskN`) map to their buffered partition nodes.
pub(super) fn partition_path(disk: &str, index: u32) -> String {
    let disk = disk.replacen("/dev/rdisk", "/dev/disk", 1);
    format!("{disk}s{index}")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DiskList {
    #[serde(default)]
    all_disks_and_partitions: Vec<DiskEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskEntry {
    device_identifier: String,
    #[serde(default)]
    size: u64,
    mount_point: Option<String>,
    #[serde(default)]
    partitions: Vec<Volume>,
    #[serde(default, rename = "APFSVolumes")]
    apfs_volumes: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Volume {
    mount_point: Option<String>,
}

/// The fields of `diskutil info -plist` that the listing uses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DiskInfo {
    media_name: Option<String>,
    internal: Option<bool>,
    total_size: Option<u64>,
}

pub(super) fn list_devices<R: Runner>(runner: &R) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
    for tool in ["diskutil", "plutil"] {
        if !runner.has_program(tool) {
            return Err(EnumerateError::ToolUnavailable(tool.to_string()));
        }
    }

    let list: DiskList = diskutil_json(runner, &["list", "-plist"])?;
    let infos = list
        .all_disks_and_partitions
        .iter()
        .map(|disk| {
            let id = disk.device_identifier.as_str();
            diskutil_json(runner, &["info", "-plist", id])
                .inspect_err(|e| log::debug!("diskutil info {id}: {e}"))
                .unwrap_or_default()
        })
        .collect::<Vec<DiskInfo>>();
    Ok(build_descriptors(list, infos))
}

/// Runs `diskutil` with `-plist` output and decodes it through
/// `plutil -convert json`.
fn diskutil_json<R, T>(runner: &R, args: &[&str]) -> Result<T, EnumerateError>
where
    R: Runner,
    T: DeserializeOwned,
{
    let stage = |source: io::Error| EnumerateError::Stage {
        tool: "diskutil",
        source,
    };
    let plist = runner.status("diskutil", args)?;
    let mut staged = NamedTempFile::new().map_err(stage)?;
    staged
        .write_all(plist.stdout.as_bytes())
        .and_then(|_| staged.flush())
        .map_err(stage)?;

    let path = staged.path().to_string_lossy().into_owned();
    let json = runner.status("plutil", &["-convert", "json", "-o", "-", &path])?;
    serde_json::from_str(&json.stdout).map_err(|source| EnumerateError::Parse {
        tool: "diskutil",
        source,
    })
}

/// Pairs each whole disk of `diskutil list` with its `diskutil info`. Mount
/// points of its partitions and APFS volumes are credited to the disk.
pub(crate) fn build_descriptors(list: DiskList, infos: Vec<DiskInfo>) -> Vec<DeviceDescriptor> {
    list.all_disks_and_partitions
        .into_iter()
        .zip(infos.into_iter().chain(std::iter::repeat_with(DiskInfo::default)))
        .map(|(disk, info)| {
            let points: Vec<String> = disk
                .mount_point
                .into_iter()
                .chain(
                    disk.partitions
                        .into_iter()
                        .chain(disk.apfs_volumes)
                        .filter_map(|v| v.mount_point),
                )
                .filter(|p| !p.is_empty())
                .collect();
            DeviceDescriptor {
                id: format!("/dev/{}", disk.device_identifier),
                size_bytes: info.total_size.unwrap_or(disk.size),
                label: info.media_name.unwrap_or_default().trim().to_string(),
                system: points.iter().any(|p| p == "/"),
                mount: if points.is_empty() {
                    MountState::Unmounted
                } else {
                    MountState::Mounted(points)
                },
                removable: info.internal.map(|internal| !internal),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"{
      "AllDisks": ["disk0", "disk0s1", "disk0s2", "disk3", "disk3s1", "disk4", "disk4s1"],
      "AllDisksAndPartitions": [
        {"Content": "GUID_partition_scheme", "DeviceIdentifier": "disk0", "OSInternal": false,
         "Size": 500277790720,
         "Partitions": [
           {"Content": "EFI", "DeviceIdentifier": "disk0s1", "Size": 209715200},
           {"Content": "Apple_APFS", "DeviceIdentifier": "disk0s2", "Size": 500068036608}
         ]},
        {"Content": "Apple_APFS_Container", "DeviceIdentifier": "disk3", "Size": 500068036608,
         "APFSVolumes": [
           {"DeviceIdentifier": "disk3s1", "MountPoint": "/", "VolumeName": "Macintosh HD"},
           {"DeviceIdentifier": "disk3s5", "MountPoint": "/System/Volumes/Data"}
         ]},
        {"Content": "FDisk_partition_scheme", "DeviceIdentifier": "disk4", "Size": 15518924800,
         "Partitions": [
           {"Content": "DOS_FAT_32", "DeviceIdentifier": "disk4s1", "MountPoint": "/Volumes/USB",
            "Size": 15517876224, "VolumeName": "USB"}
         ]}
      ],
      "VolumesFromDisks": ["USB"],
      "WholeDisks": ["disk0", "disk3", "disk4"]
    }"#;

    fn info(name: &str, internal: bool, size: u64) -> DiskInfo {
        DiskInfo {
            media_name: Some(name.to_string()),
            internal: Some(internal),
            total_size: Some(size),
        }
    }

    #[test]
    fn partition_names_use_slice_suffix() {
        assert_eq!(partition_path("/dev/disk4", 1), "/dev/disk4s1");
        assert_eq!(partition_path("/dev/rdisk4", 1), "/dev/disk4s1");
    }

    #[test]
    fn builds_disks_from_the_plist_listing() {
        let list: DiskList = serde_json::from_str(LIST).unwrap();
        let infos = vec![
            info("APPLE SSD AP0512Q", true, 500_277_790_720),
            info("", true, 500_068_036_608),
            info("SanDisk Cruzer Blade ", false, 15_518_924_800),
        ];
        let devices = build_descriptors(list, infos);
        assert_eq!(devices.len(), 3);

        assert_eq!(devices[0].id, "/dev/disk0");
        assert_eq!(devices[0].label, "APPLE SSD AP0512Q");
        assert_eq!(devices[0].removable, Some(false));
        assert_eq!(devices[0].mount, MountState::Unmounted);

        assert!(devices[1].system);

        assert_eq!(devices[2].id, "/dev/disk4");
        assert_eq!(devices[2].label, "SanDisk Cruzer Blade");
        assert_eq!(devices[2].size_bytes, 15_518_924_800);
        assert_eq!(devices[2].removable, Some(true));
        assert_eq!(
            devices[2].mount,
            MountState::Mounted(vec!["/Volumes/USB".to_string()])
        );
    }

    #[test]
    fn missing_info_keeps_the_listed_size() {
        let list: DiskList = serde_json::from_str(LIST).unwrap();
        let devices = build_descriptors(list, Vec::new());
        assert_eq!(devices[2].size_bytes, 15_518_924_800);
        assert_eq!(devices[2].removable, None);
        assert_eq!(devices[2].label, "");
    }
}
