use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

use super::Container;

/// Disk usage of a container's writable layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerUsage {
    pub mountpoint: PathBuf,
    pub used_bytes: u64,
    pub inodes_used: u64,
}

/// Storage collaborator reporting writable-layer usage for a container.
pub trait WritableLayerProvider: Send + Sync + Debug {
    /// Returns `Ok(None)` when the container has no writable layer to report.
    fn writable_layer_usage(&self, container: &Container) -> io::Result<Option<LayerUsage>>;
}

/// Computes writable-layer usage by walking [`Container::writable_layer_dir`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryLayerUsage;

impl WritableLayerProvider for DirectoryLayerUsage {
    fn writable_layer_usage(&self, container: &Container) -> io::Result<Option<LayerUsage>> {
        let Some(dir) = container.writable_layer_dir.as_deref() else {
            return Ok(None);
        };
        let (used_bytes, inodes_used) = walk(dir)?;
        Ok(Some(LayerUsage {
            mountpoint: dir.to_path_buf(),
            used_bytes,
            inodes_used,
        }))
    }
}

/// Sums file sizes and counts inodes below `root`, without following symlinks.
///
/// Entries removed while the walk is in progress are skipped; a live upper
/// directory changes underneath us. Only a missing `root` is an error.
fn walk(root: &Path) -> io::Result<(u64, u64)> {
    let mut bytes = 0;
    let mut inodes = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Err(err) if err.kind() == io::ErrorKind::NotFound && dir.as_path() != root => {
                continue;
            }
            res => res?,
        };
        for entry in entries {
            let Some(entry) = vanished_is_none(entry)? else {
                continue;
            };
            let Some(meta) = vanished_is_none(entry.path().symlink_metadata())? else {
                continue;
            };
            inodes += 1;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                bytes += meta.len();
            }
        }
    }
    Ok((bytes, inodes))
}

fn vanished_is_none<T>(res: io::Result<T>) -> io::Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
