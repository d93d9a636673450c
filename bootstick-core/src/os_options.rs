use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// An opened write target and whether it bypasses the page cache.
pub(crate) struct TargetFile {
    pub file: File,
    pub direct: bool,
}

/// Opens `path` for raw writing without creating or truncating it.
///
/// Linux block devices are opened with `O_DIRECT`, so writes must then be
/// whole sectors from an aligned buffer. Anything else (regular files,
/// character devices, other platforms) is opened buffered.
pub(crate) fn open_target(path: &Path) -> io::Result<TargetFile> {
    let mut options = OpenOptions::new();
    options.write(true);

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};

        if std::fs::metadata(path)?.file_type().is_block_device() {
            options.custom_flags(libc::O_DIRECT);
            return Ok(TargetFile {
                file: options.open(path)?,
                direct: true,
            });
        }
    }

    Ok(TargetFile {
        file: options.open(path)?,
        direct: false,
    })
}
