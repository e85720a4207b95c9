//! Network namespace entry and per-interface counter sampling.
//!
//! A sandbox's containers share one network namespace, so interface counters
//! are sampled once per sandbox from inside that namespace. Entering a
//! namespace changes the state of the *calling thread*; [`NetNsGuard`] scopes
//! that change and switches back when dropped, on every exit path.
//!
//! [`with_network_namespace`] runs its work on a short-lived thread that
//! exits afterwards. A thread whose switch back failed is therefore never
//! handed out again, and the caller's own namespace is never touched.
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sched::{CloneFlags, setns};

mod dev;

pub use dev::{LinkCounters, parse_links};

/// Per-thread view of the current network namespace.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";
/// Per-thread view of the link table; follows `setns` unlike `/proc/self/net`.
const THREAD_NET_DEV: &str = "/proc/thread-self/net/dev";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open network namespace `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to enter network namespace `{path}`: {source}")]
    Enter {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("failed to return from network namespace `{path}`: {source}")]
    Restore {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("failed to list network links: {0}")]
    ListLinks(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Holds the calling thread inside a network namespace until dropped.
#[derive(Debug)]
pub struct NetNsGuard {
    original: Option<File>,
    entered: PathBuf,
}

impl NetNsGuard {
    /// Switches the calling thread into the namespace at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if either namespace file cannot be opened and
    /// [`Error::Enter`] if the switch is refused. The thread is unchanged on
    /// error.
    pub fn enter(path: &Path) -> Result<Self> {
        let target = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let original = File::open(THREAD_NETNS).map_err(|source| Error::Open {
            path: PathBuf::from(THREAD_NETNS),
            source,
        })?;
        setns(&target, CloneFlags::CLONE_NEWNET).map_err(|source| Error::Enter {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            original: Some(original),
            entered: path.to_path_buf(),
        })
    }

    /// Switches the thread back to the namespace it was in before `enter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Restore`] if the switch back is refused; the thread
    /// is then still inside the entered namespace.
    pub fn leave(mut self) -> Result<()> {
        match self.original.take() {
            Some(original) => self.restore(&original),
            None => Ok(()),
        }
    }

    fn restore(&self, original: &File) -> Result<()> {
        setns(original, CloneFlags::CLONE_NEWNET).map_err(|source| Error::Restore {
            path: self.entered.clone(),
            source,
        })
    }
}

impl Drop for NetNsGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Err(err) = self.restore(&original) {
                log::error!("{err}");
            }
        }
    }
}

/// Runs `f` inside the namespace at `path` on a dedicated thread.
///
/// The thread exits once `f` returns, whether or not the switch back
/// succeeded. A panic in `f` is resumed on the caller.
///
/// # Errors
///
/// Returns the [`NetNsGuard::enter`] errors, in which case `f` never runs,
/// and [`Error::Restore`] if the thread could not switch back.
pub fn with_network_namespace<T, F>(path: &Path, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    std::thread::scope(|scope| {
        let worker = scope.spawn(|| -> Result<T> {
            let guard = NetNsGuard::enter(path)?;
            let out = f();
            guard.leave()?;
            Ok(out)
        });
        worker
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}

/// Link counters read from inside one network namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkSample {
    /// Nanoseconds since the UNIX epoch.
    pub timestamp: i64,
    pub links: Vec<LinkCounters>,
}

/// Samples interface counters of a network namespace.
pub trait NetworkSampler: Send + Sync {
    fn sample(&self, netns_path: &Path) -> Result<NetworkSample>;
}

/// [`NetworkSampler`] that enters the namespace and reads the thread's link table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetNsSampler;

impl NetworkSampler for NetNsSampler {
    fn sample(&self, netns_path: &Path) -> Result<NetworkSample> {
        let links = with_network_namespace(netns_path, || {
            let mut reader = crate::fsutil::open_file_reader(THREAD_NET_DEV)
                .map_err(|err| Error::ListLinks(err.source))?;
            parse_links(&mut reader).map_err(Error::ListLinks)
        })??;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
        Ok(NetworkSample { timestamp, links })
    }
}
