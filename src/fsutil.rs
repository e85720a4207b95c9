use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Opening a stat or procfs file failed.
#[derive(Debug, thiserror::Error)]
#[error("cannot open `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens `path` for buffered reading, keeping the path for error reporting.
///
/// # Example
/// ```no_run
/// # use pod_stats::fsutil;
/// let reader = fsutil::open_file_reader("/sys/fs/cgroup/cpu.stat")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| FileOpenError {
            path: path.to_path_buf(),
            source,
        })
}
