use super::Scalar;
use crate::delegate::Runner;
use crate::device::{DeviceDescriptor, MountState};
use crate::error::EnumerateError;
use serde::Deserialize;

const GET_DISK: &str = "Get-Disk | Select-Object Number,FriendlyName,Size,BusType,IsSystem,IsBoot \
                        | ConvertTo-Json -Depth 2";

/// `STORAGE_BUS_TYPE` values for USB, SD and MMC.
const REMOVABLE_BUS_CODES: [u64; 3] = [7, 12, 13];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskRow {
    number: u32,
    friendly_name: Option<String>,
    size: Option<u64>,
    bus_type: Option<Scalar>,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    is_boot: bool,
}

impl DiskRow {
    /// `BusType` comes out as a number from the CIM class and as a name once
    /// PowerShell formats the enum.
    fn bus_name(&self) -> Option<String> {
        match self.bus_type.as_ref()? {
            Scalar::Text(name) => Some(name.clone()),
            Scalar::Number(7) => Some("USB".to_string()),
            Scalar::Number(12) => Some("SD".to_string()),
            Scalar::Number(13) => Some("MMC".to_string()),
            Scalar::Number(_) | Scalar::Bool(_) => None,
        }
    }

    fn removable(&self) -> bool {
        match &self.bus_type {
            Some(Scalar::Text(name)) => matches!(name.as_str(), "USB" | "SD" | "MMC"),
            Some(Scalar::Number(code)) => REMOVABLE_BUS_CODES.contains(code),
            _ => false,
        }
    }
}

pub(super) fn list_devices<R: Runner>(runner: &R) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
    if !runner.has_program("powershell") {
        return Err(EnumerateError::ToolUnavailable("powershell".to_string()));
    }
    let output = runner.status(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", GET_DISK],
    )?;
    parse_get_disk_json(&output.stdout)
}

/// Builds descriptors from `Get-Disk | ConvertTo-Json`. Disks are identified by
/// their number, which is what diskpart's `select disk` expects.
///
/// `ConvertTo-Json` prints a bare object when there is exactly one disk.
pub(crate) fn parse_get_disk_json(stdout: &str) -> Result<Vec<DeviceDescriptor>, EnumerateError> {
    let raw = stdout.trim();
    let parse = |e| EnumerateError::Parse {
        tool: "Get-Disk",
        source: e,
    };
    let rows: Vec<DiskRow> = if raw.is_empty() {
        Vec::new()
    } else if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(parse)?
    } else {
        vec![serde_json::from_str(raw).map_err(parse)?]
    };

    Ok(rows
        .into_iter()
        .map(|row| {
            let system = row.is_system || row.is_boot;
            let name = row
                .friendly_name
                .clone()
                .unwrap_or_else(|| format!("Disk {}", row.number));
            let label = match row.bus_name() {
                Some(bus) => format!("{name} ({bus})"),
                None => name,
            };
            DeviceDescriptor {
                id: row.number.to_string(),
                size_bytes: row.size.unwrap_or(0),
                label,
                mount: if system {
                    MountState::Mounted(vec!["(system disk)".to_string()])
                } else {
                    MountState::Unknown
                },
                removable: Some(row.removable()),
                system,
            }
        })
        .collect())
}
