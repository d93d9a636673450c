//! The core, UI-agnostic library for the `bootstick` media preparation tool.
//!
//! `bootstick-core` lists block devices and sequences the destructive steps of
//! preparing bootable media: writing a fresh partition table, creating and
//! formatting a partition, and raw-writing an image onto the device. Platform
//! utilities (`lsblk`, `sgdisk`, `parted`, `mkfs.*`, `diskpart`, ...) do the
//! partitioning and formatting; this crate decides which one to call, in what
//! order, and what their exit codes mean.
//!
//! The library is structured into several key modules:
//! - [`platform`]: platform detection, device listing, partition naming.
//! - [`confirm`]: the typed-acknowledgment gate.
//! - [`provision`]: partition-table creation.
//! - [`mod@format`]: partition creation and filesystem formatting.
//! - [`mod@write`]: the raw imager.
//! - [`orchestrator`]: the state machine that ties them together.
//!
//! All external commands go through the [`delegate::Runner`] trait, so a run
//! can be exercised against a fake without root or real hardware.
//!
//! ## Example: Imaging a USB stick
//!
//! ```rust,no_run
//! use bootstick_core::{
//!     Config, ImageSource, Orchestrator, Platform, SystemRunner, TargetSpec,
//!     target::{FilesystemKind, PartitionScheme},
//! };
//! use std::sync::atomic::AtomicBool;
//!
//! fn main() -> anyhow::Result<()> {
//!     let runner = SystemRunner::new();
//!     let orchestrator = Orchestrator::new(Platform::current(), &runner, Config::default())?;
//!
//!     let target = TargetSpec::new("/dev/sdb")
//!         .with_scheme(PartitionScheme::Gpt)
//!         .with_filesystem(FilesystemKind::Vfat);
//!     let image = ImageSource::new("debian-12.iso")?;
//!     let running = AtomicBool::new(true);
//!
//!     let report = orchestrator.run(
//!         &target,
//!         Some(&image),
//!         false,
//!         |device| {
//!             println!("Type {device} to erase it:");
//!             let mut answer = String::new();
//!             std::io::stdin().read_line(&mut answer)?;
//!             Ok(answer)
//!         },
//!         &running,
//!         &mut (),
//!     );
//!
//!     println!("finished in state {:?}", report.state);
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod config;
pub mod confirm;
pub mod delegate;
pub mod device;
mod diskpart;
pub mod error;
pub mod format;
pub mod orchestrator;
mod os_options;
pub mod platform;
pub mod provision;
pub mod target;
pub mod write;

pub use config::{Config, CopyMethod};
pub use delegate::{Runner, SystemRunner};
pub use device::{DeviceDescriptor, MountState};
pub use error::FailureKind;
pub use orchestrator::{Orchestrator, RunObserver, RunReport, RunState, Step, StepOutcome};
pub use platform::Platform;
pub use target::TargetSpec;
pub use write::{ImageSource, WriteProgress};
