//! Contains the logic for writing an image file to a device.
//!
//! The copy is done in fixed-size blocks so memory use stays bounded, and the
//! target is synced to stable media before success is reported. Optionally
//! the written range is read back and compared against the source.
use crate::config::{Config, CopyMethod, SECTOR_SIZE};
use crate::delegate::Runner;
use crate::error::ImageError;
use crate::os_options::open_target;
use crate::platform::Platform;
use crate::target::TargetSpec;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callbacks for the write and verification passes.
///
/// Every method has an empty default, so `()` works when nobody is watching.
pub trait WriteProgress {
    /// Called once before the first block, with the image size.
    fn on_write_start(&mut self, _total: u64) {}
    /// Called with the number of bytes written so far.
    fn on_write_progress(&mut self, _written: u64) {}
    fn on_verify_start(&mut self, _total: u64) {}
    fn on_verify_progress(&mut self, _verified: u64) {}
}

impl WriteProgress for () {}

/// A source image that existed, was a regular file, and was readable when checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSource {
    path: PathBuf,
    len: u64,
}

impl ImageSource {
    /// Validates `path` as a source image.
    ///
    /// # Errors
    ///
    /// [`ImageError::SourceMissing`] if nothing exists at `path`,
    /// [`ImageError::SourceUnreadable`] if it is not a readable regular file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let path = path.into();
        let len = check_source(&path)?;
        Ok(Self { path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the image when it was validated.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn check_source(path: &Path) -> Result<u64, ImageError> {
    let unreadable = |source| ImageError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ImageError::SourceMissing(path.to_path_buf()));
        }
        Err(e) => return Err(unreadable(e)),
    };
    if !metadata.is_file() {
        return Err(unreadable(io::Error::other("not a regular file")));
    }
    File::open(path).map_err(unreadable)?;
    Ok(metadata.len())
}

pub struct RawImager<'r, R: Runner> {
    runner: &'r R,
    method: CopyMethod,
    block_size: usize,
    verify: bool,
}

impl<'r, R: Runner> RawImager<'r, R> {
    /// Binds the raw-copy delegate for `platform`.
    ///
    /// There is no safe substitute on hosts without one, so those fail here
    /// with [`ImageError::UnsupportedOnPlatform`].
    pub fn resolve(platform: Platform, runner: &'r R, config: &Config) -> Result<Self, ImageError> {
        if !platform.is_unix() {
            return Err(ImageError::UnsupportedOnPlatform(platform.name()));
        }
        config
            .validate()
            .map_err(|e| ImageError::WriteFailed(e.to_string()))?;
        if config.copy_method == CopyMethod::Dd && !runner.has_program("dd") {
            return Err(ImageError::ToolUnavailable("dd".to_string()));
        }
        Ok(Self {
            runner,
            method: config.copy_method,
            block_size: config.block_size,
            verify: config.verify,
        })
    }

    /// Copies `source` byte for byte onto `target.device`.
    ///
    /// Returns the number of image bytes written, which equals the source
    /// size. On success the data has been synced to the device. Failures are
    /// not rolled back; a raw device has nothing to roll back to.
    ///
    /// `running` is polled between blocks. Clearing it stops the copy with
    /// [`ImageError::Interrupted`], leaving the target partially written.
    pub fn write_image<P>(
        &self,
        source: &ImageSource,
        target: &TargetSpec,
        running: &AtomicBool,
        progress: &mut P,
    ) -> Result<u64, ImageError>
    where
        P: WriteProgress + ?Sized,
    {
        // The file may have gone away since it was first validated.
        let image_len = check_source(source.path())?;
        let device = Path::new(&target.device);

        log::info!(
            "writing {} ({} bytes) to {}",
            source.path().display(),
            image_len,
            device.display()
        );

        let written = match self.method {
            CopyMethod::Native => {
                self.copy_native(source.path(), image_len, device, running, progress)?
            }
            CopyMethod::Dd => self.copy_dd(source.path(), image_len, device, running, progress)?,
        };

        if self.verify {
            verify(source.path(), device, image_len, running, progress)?;
        }
        Ok(written)
    }

    fn copy_native<P>(
        &self,
        image_path: &Path,
        image_len: u64,
        device_path: &Path,
        running: &AtomicBool,
        progress: &mut P,
    ) -> Result<u64, ImageError>
    where
        P: WriteProgress + ?Sized,
    {
        let mut image_file = File::open(image_path).map_err(|source| ImageError::SourceUnreadable {
            path: image_path.to_path_buf(),
            source,
        })?;
        let target = open_target(device_path).map_err(|e| {
            ImageError::WriteFailed(format!("cannot open {}: {e}", device_path.display()))
        })?;
        let mut device_file = target.file;
        log::debug!("target opened (direct I/O: {})", target.direct);

        progress.on_write_start(image_len);

        // Align the buffer for O_DIRECT; harmless otherwise.
        let block_size = self.block_size;
        let mut buf = vec![0u8; block_size + SECTOR_SIZE];
        let offset = buf.as_ptr().align_offset(SECTOR_SIZE);
        let buffer = &mut buf[offset..offset + block_size];

        let mut written: u64 = 0;
        while written < image_len {
            if !running.load(Ordering::SeqCst) {
                return Err(ImageError::Interrupted {
                    written: Some(written),
                });
            }

            let to_read = std::cmp::min(block_size as u64, image_len - written) as usize;
            image_file.read_exact(&mut buffer[..to_read]).map_err(|e| {
                ImageError::WriteFailed(format!(
                    "reading {} at offset {written}: {e}",
                    image_path.display()
                ))
            })?;

            // O_DIRECT only takes whole sectors, so the tail is zero-padded.
            let chunk = if target.direct && to_read % SECTOR_SIZE != 0 {
                let padded = to_read.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
                buffer[to_read..padded].fill(0);
                padded
            } else {
                to_read
            };

            device_file.write_all(&buffer[..chunk]).map_err(|e| {
                ImageError::WriteFailed(format!(
                    "writing {} at offset {written}: {e}",
                    device_path.display()
                ))
            })?;
            written += to_read as u64;
            progress.on_write_progress(written);
        }

        device_file
            .flush()
            .and_then(|_| device_file.sync_all())
            .map_err(|e| {
                ImageError::WriteFailed(format!("syncing {}: {e}", device_path.display()))
            })?;
        log::info!("{written} bytes written and synced");
        Ok(written)
    }

    fn copy_dd<P>(
        &self,
        image_path: &Path,
        image_len: u64,
        device_path: &Path,
        running: &AtomicBool,
        progress: &mut P,
    ) -> Result<u64, ImageError>
    where
        P: WriteProgress + ?Sized,
    {
        let input = format!("if={}", image_path.display());
        let output = format!("of={}", device_path.display());
        let bs = format!("bs={}", self.block_size);

        progress.on_write_start(image_len);
        let result = self
            .runner
            .stream("dd", &[&input, &output, &bs, "status=progress", "conv=fsync"]);
        if result.is_err() && !running.load(Ordering::SeqCst) {
            return Err(ImageError::Interrupted { written: None });
        }
        result?;
        progress.on_write_progress(image_len);
        Ok(image_len)
    }
}

/// Reads back `len` bytes of `device_path` and compares digests with the image.
fn verify<P>(
    image_path: &Path,
    device_path: &Path,
    len: u64,
    running: &AtomicBool,
    progress: &mut P,
) -> Result<(), ImageError>
where
    P: WriteProgress + ?Sized,
{
    const VERIFY_BUFFER: usize = 1024 * 1024;

    let failed = |what: &str, path: &Path, e: io::Error| {
        ImageError::WriteFailed(format!("verify: {what} {}: {e}", path.display()))
    };
    let mut image_file = File::open(image_path).map_err(|e| failed("opening", image_path, e))?;
    let mut device_file = File::open(device_path).map_err(|e| failed("opening", device_path, e))?;

    progress.on_verify_start(len);

    let mut image_hasher = Sha256::new();
    let mut device_hasher = Sha256::new();
    let mut image_buf = vec![0u8; VERIFY_BUFFER];
    let mut device_buf = vec![0u8; VERIFY_BUFFER];

    let mut remaining = len;
    while remaining > 0 {
        if !running.load(Ordering::SeqCst) {
            return Err(ImageError::Interrupted { written: Some(len) });
        }

        let chunk = std::cmp::min(VERIFY_BUFFER as u64, remaining) as usize;
        image_file
            .read_exact(&mut image_buf[..chunk])
            .map_err(|e| failed("reading", image_path, e))?;
        device_file
            .read_exact(&mut device_buf[..chunk])
            .map_err(|e| failed("reading", device_path, e))?;

        image_hasher.update(&image_buf[..chunk]);
        device_hasher.update(&device_buf[..chunk]);

        remaining -= chunk as u64;
        progress.on_verify_progress(len - remaining);
    }

    if image_hasher.finalize() != device_hasher.finalize() {
        return Err(ImageError::VerifyMismatch);
    }
    log::info!("verification passed");
    Ok(())
}
