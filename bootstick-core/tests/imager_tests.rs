mod common;

use bootstick_core::error::ImageError;
use bootstick_core::write::RawImager;
use bootstick_core::{Config, CopyMethod, FailureKind, ImageSource, Platform, TargetSpec, WriteProgress};
use common::FakeRunner;
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;

fn image(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
    file.write_all(&data).unwrap();
    file.flush().unwrap();
    file
}

fn small_blocks() -> Config {
    Config {
        block_size: 4096,
        ..Config::default()
    }
}

#[derive(Default)]
struct Counter {
    write_total: u64,
    updates: Vec<u64>,
    verified: u64,
}

impl WriteProgress for Counter {
    fn on_write_start(&mut self, total: u64) {
        self.write_total = total;
    }
    fn on_write_progress(&mut self, written: u64) {
        self.updates.push(written);
    }
    fn on_verify_progress(&mut self, verified: u64) {
        self.verified = verified;
    }
}

#[test]
fn writes_every_byte_and_reports_progress() {
    let runner = FakeRunner::new();
    let source = image(10_000);
    let device = NamedTempFile::new().unwrap();
    let image = ImageSource::new(source.path()).unwrap();
    let target = TargetSpec::new(device.path().to_str().unwrap());
    let imager = RawImager::resolve(Platform::Linux, &runner, &small_blocks()).unwrap();
    let running = AtomicBool::new(true);
    let mut counter = Counter::default();

    let written = imager
        .write_image(&image, &target, &running, &mut counter)
        .unwrap();

    assert_eq!(written, 10_000);
    assert_eq!(counter.write_total, 10_000);
    assert_eq!(counter.updates, [4096, 8192, 10_000]);
    assert_eq!(fs::read(device.path()).unwrap(), fs::read(source.path()).unwrap());
    assert!(runner.calls().is_empty());
}

#[test]
fn verification_reads_back_the_written_range() {
    let runner = FakeRunner::new();
    let source = image(3 * 1024 * 1024 + 5);
    let device = NamedTempFile::new().unwrap();
    let image = ImageSource::new(source.path()).unwrap();
    let target = TargetSpec::new(device.path().to_str().unwrap());
    let config = Config {
        verify: true,
        ..Config::default()
    };
    let imager = RawImager::resolve(Platform::Linux, &runner, &config).unwrap();
    let mut counter = Counter::default();

    let written = imager
        .write_image(&image, &target, &AtomicBool::new(true), &mut counter)
        .unwrap();

    assert_eq!(written, image.len());
    assert_eq!(counter.verified, image.len());
}

#[test]
fn empty_image_writes_nothing() {
    let runner = FakeRunner::new();
    let source = NamedTempFile::new().unwrap();
    let device = NamedTempFile::new().unwrap();
    let image = ImageSource::new(source.path()).unwrap();
    assert!(image.is_empty());
    let target = TargetSpec::new(device.path().to_str().unwrap());
    let imager = RawImager::resolve(Platform::Linux, &runner, &Config::default()).unwrap();

    let written = imager
        .write_image(&image, &target, &AtomicBool::new(true), &mut ())
        .unwrap();
    assert_eq!(written, 0);
}

#[test]
fn missing_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.iso");

    let err = ImageSource::new(&missing).unwrap_err();
    assert!(matches!(err, ImageError::SourceMissing(ref p) if *p == missing));
    assert_eq!(err.kind(), FailureKind::PreconditionFailed);
}

#[test]
fn directory_source_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let err = ImageSource::new(dir.path()).unwrap_err();
    assert!(matches!(err, ImageError::SourceUnreadable { .. }));
}

#[test]
fn missing_target_is_never_created() {
    let runner = FakeRunner::new();
    let source = image(512);
    let image = ImageSource::new(source.path()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let device = dir.path().join("sdz");
    let target = TargetSpec::new(device.to_str().unwrap());
    let imager = RawImager::resolve(Platform::Linux, &runner, &Config::default()).unwrap();

    let err = imager
        .write_image(&image, &target, &AtomicBool::new(true), &mut ())
        .unwrap_err();
    assert!(matches!(err, ImageError::WriteFailed(_)));
    assert!(!device.exists());
}

#[test]
fn cleared_flag_interrupts_before_the_first_block() {
    let runner = FakeRunner::new();
    let source = image(8192);
    let device = NamedTempFile::new().unwrap();
    let image = ImageSource::new(source.path()).unwrap();
    let target = TargetSpec::new(device.path().to_str().unwrap());
    let imager = RawImager::resolve(Platform::Linux, &runner, &small_blocks()).unwrap();
    let running = AtomicBool::new(true);
    running.store(false, Ordering::SeqCst);

    let err = imager
        .write_image(&image, &target, &running, &mut ())
        .unwrap_err();
    assert!(matches!(err, ImageError::Interrupted { written: Some(0) }));
    assert_eq!(err.kind(), FailureKind::Interrupted);
    assert!(err.to_string().contains("partially written"));
}

#[test]
fn windows_has_no_raw_imager() {
    let runner = FakeRunner::with_tools(&["dd"]);
    let err = RawImager::resolve(Platform::Windows, &runner, &Config::default())
        .err()
        .unwrap();
    assert!(matches!(err, ImageError::UnsupportedOnPlatform("Windows")));
    assert_eq!(err.kind(), FailureKind::UnsupportedRequest);
}

#[test]
fn dd_method_requires_dd() {
    let runner = FakeRunner::new();
    let config = Config {
        copy_method: CopyMethod::Dd,
        ..Config::default()
    };
    let err = RawImager::resolve(Platform::Linux, &runner, &config)
        .err()
        .unwrap();
    assert!(matches!(err, ImageError::ToolUnavailable(ref p) if p == "dd"));
}

#[test]
fn dd_method_streams_through_the_delegate() {
    let runner = FakeRunner::with_tools(&["dd"]);
    let source = image(1024);
    let image = ImageSource::new(source.path()).unwrap();
    let target = TargetSpec::new("/dev/sdz");
    let config = Config {
        copy_method: CopyMethod::Dd,
        block_size: 1024 * 1024,
        ..Config::default()
    };
    let imager = RawImager::resolve(Platform::MacOs, &runner, &config).unwrap();

    let written = imager
        .write_image(&image, &target, &AtomicBool::new(true), &mut ())
        .unwrap();

    assert_eq!(written, 1024);
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "dd");
    assert_eq!(calls[0][1], format!("if={}", source.path().display()));
    assert_eq!(calls[0][2], "of=/dev/sdz");
    assert_eq!(calls[0][3], "bs=1048576");
}

#[test]
fn dd_failure_surfaces_its_diagnostic() {
    let runner = FakeRunner::with_tools(&["dd"]).failing("dd", "dd: /dev/sdz: Permission denied");
    let source = image(1024);
    let image = ImageSource::new(source.path()).unwrap();
    let config = Config {
        copy_method: CopyMethod::Dd,
        ..Config::default()
    };
    let imager = RawImager::resolve(Platform::Linux, &runner, &config).unwrap();

    let err = imager
        .write_image(&image, &TargetSpec::new("/dev/sdz"), &AtomicBool::new(true), &mut ())
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::DelegateFailed);
    assert!(err.to_string().contains("Permission denied"));
}
