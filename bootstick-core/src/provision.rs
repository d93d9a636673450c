//! Writes a fresh partition table onto the target.
//!
//! Provisioning tools differ between hosts, so the provisioner looks them up
//! once, when it is resolved, and then serves each request with the strategy that
//! can honour it:
//!
//! - [`ProvisionStrategy::Zap`]: `sgdisk --zap-all` then `sgdisk --clear`.
//!   Fast, but GPT-native: it can only reach MBR by conversion.
//! - [`ProvisionStrategy::Relabel`]: `parted -s <dev> mklabel <gpt|msdos>`.
//! - [`ProvisionStrategy::Diskpart`]: `clean` and `convert` on Windows.
use crate::delegate::Runner;
use crate::diskpart;
use crate::error::ProvisionError;
use crate::platform::Platform;
use crate::target::{PartitionScheme, TargetSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStrategy {
    Zap,
    Relabel,
    Diskpart,
}

pub struct Provisioner<'r, R: Runner> {
    runner: &'r R,
    /// Usable strategies in order of preference.
    available: Vec<ProvisionStrategy>,
}

impl<'r, R: Runner> Provisioner<'r, R> {
    /// Looks up the partitioning tools installed on `platform`.
    ///
    /// # Errors
    ///
    /// [`ProvisionError::NoToolAvailable`] when no supported tool is installed,
    /// [`ProvisionError::UnsupportedPlatform`] on hosts with no binding at all.
    pub fn resolve(platform: Platform, runner: &'r R) -> Result<Self, ProvisionError> {
        let mut available = Vec::new();
        match platform {
            Platform::Linux | Platform::MacOs => {
                if runner.has_program("sgdisk") {
                    available.push(ProvisionStrategy::Zap);
                }
                if runner.has_program("parted") {
                    available.push(ProvisionStrategy::Relabel);
                }
            }
            Platform::Windows => {
                if runner.has_program("diskpart") {
                    available.push(ProvisionStrategy::Diskpart);
                }
            }
            Platform::Unsupported => {
                return Err(ProvisionError::UnsupportedPlatform(platform.name()));
            }
        }
        if available.is_empty() {
            return Err(ProvisionError::NoToolAvailable);
        }
        log::debug!("partitioning strategies on {platform}: {available:?}");
        Ok(Self { runner, available })
    }

    /// The strategy that will serve a `scheme` request.
    ///
    /// An MBR request that only the zap tool could serve is refused rather
    /// than silently producing a GPT table.
    pub fn strategy_for(&self, scheme: PartitionScheme) -> Result<ProvisionStrategy, ProvisionError> {
        let first = self.available[0];
        match (scheme, first) {
            (PartitionScheme::Mbr, ProvisionStrategy::Zap) => self
                .available
                .iter()
                .copied()
                .find(|s| *s != ProvisionStrategy::Zap)
                .ok_or(ProvisionError::UnsupportedConversion {
                    tool: "sgdisk",
                    requested: scheme,
                }),
            _ => Ok(first),
        }
    }

    /// Settles how `target` will be provisioned without invoking anything:
    /// the strategy for its scheme, and for diskpart a usable disk number.
    pub fn prepare(&self, target: &TargetSpec) -> Result<ProvisionStrategy, ProvisionError> {
        let strategy = self.strategy_for(target.scheme.unwrap_or(PartitionScheme::Gpt))?;
        if strategy == ProvisionStrategy::Diskpart {
            disk_number(&target.device)?;
        }
        Ok(strategy)
    }

    /// Wipes existing partition metadata on `target` and writes an empty
    /// table of the requested scheme. Defaults to GPT when none is given.
    pub fn provision(&self, target: &TargetSpec) -> Result<(), ProvisionError> {
        let scheme = target.scheme.unwrap_or(PartitionScheme::Gpt);
        let device = target.device.as_str();
        let strategy = self.prepare(target)?;
        log::info!("creating {scheme} partition table on {device} ({strategy:?})");

        match strategy {
            ProvisionStrategy::Zap => {
                self.runner.status("sgdisk", &["--zap-all", device])?;
                self.runner.status("sgdisk", &["--clear", device])?;
            }
            ProvisionStrategy::Relabel => {
                self.runner
                    .status("parted", &["-s", device, "mklabel", scheme.parted_label()])?;
            }
            ProvisionStrategy::Diskpart => {
                let commands = [
                    "clean".to_string(),
                    format!("convert {}", scheme.diskpart_keyword()),
                ];
                diskpart::run(self.runner, &diskpart::script(disk_number(device)?, &commands))?;
            }
        }
        Ok(())
    }
}

fn disk_number(device: &str) -> Result<u32, ProvisionError> {
    diskpart::disk_number(device)
        .ok_or_else(|| ProvisionError::InvalidTarget(device.to_string(), "expected a disk number"))
}
