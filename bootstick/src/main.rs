mod progress;

use anyhow::{Result, bail};
use bootstick_core::orchestrator::OperationPlan;
use bootstick_core::target::{FilesystemKind, PartitionScheme};
use bootstick_core::{
    Config, CopyMethod, DeviceDescriptor, ImageSource, MountState, Orchestrator, Platform,
    RunReport, RunState, SystemRunner, TargetSpec,
};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Input, theme::ColorfulTheme};
use progress::TerminalObserver;
use std::io;
#[cfg(unix)]
use std::io::{IsTerminal, stdout};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(unix)]
use libc::ECHOCTL;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use termios::{TCSANOW, Termios, tcsetattr};

#[derive(Parser)]
#[command(name = "bootstick")]
#[command(about = "Prepare bootable USB media: partition, format, and raw-write images", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List block devices
    List,
    /// Partition, format and/or write an image to a device
    Write {
        /// Device to operate on (e.g. /dev/sdb, /dev/disk4, or a disk number on Windows)
        #[arg(long, env = "BOOTSTICK_TARGET")]
        target: String,

        /// Image file to raw-write onto the device
        #[arg(long, visible_alias = "iso")]
        image: Option<PathBuf>,

        /// Create a fresh partition table (gpt or mbr)
        #[arg(long, value_name = "gpt|mbr")]
        parttable: Option<PartitionScheme>,

        /// Create one partition spanning the device and format it (ext4, vfat, exfat, ntfs, ...)
        #[arg(long, value_name = "FS")]
        format: Option<FilesystemKind>,

        /// Skip the typed confirmation. Dangerous.
        #[arg(short, long)]
        yes: bool,

        /// Read the device back after writing and compare SHA-256 digests
        #[arg(long, env = "BOOTSTICK_VERIFY")]
        verify: bool,

        /// Copy with dd instead of the built-in block copy
        #[arg(long, env = "BOOTSTICK_USE_DD")]
        use_dd: bool,

        /// Copy block size in bytes (multiple of 512)
        #[arg(long, env = "BOOTSTICK_BLOCK_SIZE", value_name = "BYTES")]
        block_size: Option<usize>,

        /// Pause between creating the partition and formatting it
        #[arg(long, env = "BOOTSTICK_SETTLE_MS", value_name = "MS")]
        settle_ms: Option<u64>,
    },
}

/// A helper struct that, on Unix, disables `ECHOCTL` for the terminal.
///
/// `ECHOCTL` is the terminal flag that causes Ctrl+C to be printed as `^C`,
/// which would otherwise land in the middle of a progress bar.
/// The original terminal state is restored when this struct is dropped.
struct TermRestorer {
    #[cfg(unix)]
    original_termios: Option<Termios>,
}

impl TermRestorer {
    fn new() -> Self {
        #[cfg(unix)]
        {
            let fd = stdout().as_raw_fd();
            if !stdout().is_terminal() {
                return Self {
                    original_termios: None,
                };
            }

            let original_termios = Termios::from_fd(fd).ok().and_then(|original| {
                let mut quiet = original;
                quiet.c_lflag &= !ECHOCTL;
                tcsetattr(fd, TCSANOW, &quiet).ok().map(|_| original)
            });
            Self { original_termios }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }
}

impl Drop for TermRestorer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(ref original_termios) = self.original_termios {
            let fd = stdout().as_raw_fd();
            tcsetattr(fd, TCSANOW, original_termios).ok();
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn list(platform: Platform, runner: &SystemRunner) -> Result<()> {
    let devices = bootstick_core::platform::list_devices(platform, runner)?;
    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Found {} devices:", devices.len());
    println!(
        "\n  {:<14} {:<32} {:<10} {}",
        "DEVICE", "NAME", "SIZE", "LOCATION"
    );
    println!("  {:-<14} {:-<32} {:-<10} {:-<20}", "", "", "", "");
    for device in devices {
        let location = match &device.mount {
            MountState::Mounted(points) => points.join(", "),
            MountState::Unmounted => "(Not mounted)".to_string(),
            MountState::Unknown => "(Unknown)".to_string(),
        };
        let id = if device.system {
            style(format!("{:<14}", device.id)).red().bold().to_string()
        } else {
            format!("{:<14}", device.id)
        };
        println!(
            "  {} {:<32} {:>8.1} GB  {}{}",
            id,
            device.label,
            device.size_gb(),
            location,
            if device.system { "  [SYSTEM]" } else { "" }
        );
    }
    Ok(())
}

/// Shows what is about to be destroyed.
fn print_warning(target: &TargetSpec, image: Option<&ImageSource>, known: Option<&DeviceDescriptor>) {
    println!(
        "{} This will erase all data on '{}'.",
        style("WARNING:").red().bold(),
        target.device
    );
    if let Some(device) = known {
        println!("  Device:     {}", style(device).cyan());
        if device.system {
            println!(
                "  {}",
                style("This disk holds the running system's root filesystem!")
                    .red()
                    .bold()
            );
        }
    }
    if let Some(scheme) = target.scheme {
        println!("  Table:      {}", style(scheme).cyan());
    }
    if let Some(fs) = &target.filesystem {
        println!("  Filesystem: {}", style(fs).cyan());
    }
    if let Some(image) = image {
        println!("  Image:      {}", style(image.path().display()).cyan());
    }
    println!();
}

fn prompt_for_target(device: &str) -> io::Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Type '{device}' (or YES) to continue"))
        .allow_empty(true)
        .interact_text()
        .map_err(io::Error::other)
}

fn print_summary(report: &RunReport) {
    println!();
    match &report.state {
        RunState::Done => {
            match report.bytes_written {
                Some(bytes) => println!(
                    "✨ Done. {} bytes written to {}.",
                    bytes,
                    style(&report.target).cyan()
                ),
                None => println!("✨ Done. {} is ready.", style(&report.target).cyan()),
            }
        }
        RunState::Aborted => println!("Operation cancelled. {} was not modified.", report.target),
        RunState::Failed { step, kind, reason } => {
            eprintln!(
                "{} {step} failed ({kind}): {reason}",
                style("Error:").red().bold()
            );
        }
        other => eprintln!("Run ended in unexpected state {other:?}"),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Dropped when main() exits, restoring the terminal.
    let _term_restorer = TermRestorer::new();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let platform = Platform::current();
    let runner = SystemRunner::new();
    log::debug!("running on {platform}");

    match cli.command {
        Commands::List => {
            list(platform, &runner)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Write {
            target,
            image,
            parttable,
            format,
            yes,
            verify,
            use_dd,
            block_size,
            settle_ms,
        } => {
            let mut request = TargetSpec::new(target);
            if let Some(scheme) = parttable {
                request = request.with_scheme(scheme);
            }
            if let Some(fs) = format {
                request = request.with_filesystem(fs);
            }
            let image = image.map(ImageSource::new).transpose()?;
            if OperationPlan::new(&request, image.as_ref()).is_empty() {
                bail!("Nothing to do: pass --parttable, --format and/or --image");
            }

            let defaults = Config::default();
            let config = Config {
                block_size: block_size.unwrap_or(defaults.block_size),
                settle_delay: settle_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.settle_delay),
                verify,
                copy_method: if use_dd { CopyMethod::Dd } else { CopyMethod::Native },
            };
            log::debug!("write config: {config:?}");
            let orchestrator = Orchestrator::new(platform, &runner, config)?;

            // Best effort: the listing only decorates the warning.
            let known = bootstick_core::platform::list_devices(platform, &runner)
                .inspect_err(|e| log::warn!("could not list devices: {e}"))
                .ok()
                .and_then(|devices| devices.into_iter().find(|d| d.id == request.device));
            print_warning(&request, image.as_ref(), known.as_ref());

            let mut observer = TerminalObserver::new();
            let report = orchestrator.run(
                &request,
                image.as_ref(),
                yes,
                prompt_for_target,
                &running,
                &mut observer,
            );
            print_summary(&report);
            Ok(ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn write_flags_parse() {
        let cli = Cli::try_parse_from([
            "bootstick", "-vv", "write", "--target", "/dev/sdb", "--iso", "debian.iso",
            "--parttable", "mbr", "--format", "fat32", "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Write {
                target,
                image,
                parttable,
                format,
                yes,
                ..
            } => {
                assert_eq!(target, "/dev/sdb");
                assert_eq!(image, Some(PathBuf::from("debian.iso")));
                assert_eq!(parttable, Some(PartitionScheme::Mbr));
                assert_eq!(format, Some(FilesystemKind::Vfat));
                assert!(yes);
            }
            Commands::List => panic!("expected write"),
        }
    }

    #[test]
    fn bad_partition_table_is_rejected() {
        assert!(
            Cli::try_parse_from(["bootstick", "write", "--target", "1", "--parttable", "apm"])
                .is_err()
        );
    }
}
