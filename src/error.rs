//! Shared error plumbing for best-effort collection.
//!
//! A collection cycle never aborts because one entity failed. Instead every
//! failed sub-collection becomes a [`CollectionError`] that is logged at the
//! moment it is recorded and returned alongside the partial result in a
//! [`Collected`].
use crate::sandbox::{ContainerID, SandboxID};
use crate::{cgroup, netns};

pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }
}

/// One failed sub-collection, attributed to the entity it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("failed to collect cgroup stats for sandbox {sandbox}: {source}")]
    SandboxCgroup {
        sandbox: SandboxID,
        #[source]
        source: cgroup::Error,
    },
    #[error("failed to collect cgroup stats for container {container}: {source}")]
    ContainerCgroup {
        container: ContainerID,
        #[source]
        source: cgroup::Error,
    },
    #[error("failed to collect network stats for sandbox {sandbox}: {source}")]
    Network {
        sandbox: SandboxID,
        #[source]
        source: netns::Error,
    },
    #[error("failed to read oom kill count for container {container}: {source}")]
    OomCount {
        container: ContainerID,
        #[source]
        source: cgroup::Error,
    },
    #[error("failed to get writable layer usage for container {container}: {source}")]
    WritableLayer {
        container: ContainerID,
        #[source]
        source: std::io::Error,
    },
}

impl CollectionError {
    /// The sandbox or container id the failure is attributed to.
    pub fn entity(&self) -> &str {
        match self {
            CollectionError::SandboxCgroup { sandbox, .. }
            | CollectionError::Network { sandbox, .. } => sandbox.as_str(),
            CollectionError::ContainerCgroup { container, .. }
            | CollectionError::OomCount { container, .. }
            | CollectionError::WritableLayer { container, .. } => container.as_str(),
        }
    }
}

/// A best-effort result together with the sub-collections that failed.
#[derive(Debug)]
pub struct Collected<T> {
    pub value: T,
    pub errors: Vec<CollectionError>,
}

impl<T> Collected<T> {
    /// Whether every sub-collection succeeded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Log-and-keep sink for [`CollectionError`]s.
pub(crate) trait ErrorSink {
    fn record(&mut self, err: CollectionError);

    /// Yields the success value, or records the mapped error and yields `None`.
    fn keep<T, E>(
        &mut self,
        res: std::result::Result<T, E>,
        f: impl FnOnce(E) -> CollectionError,
    ) -> Option<T> {
        match res {
            Ok(v) => Some(v),
            Err(err) => {
                self.record(f(err));
                None
            }
        }
    }
}

impl ErrorSink for Vec<CollectionError> {
    fn record(&mut self, err: CollectionError) {
        log::error!(target: "stats server", "{err}");
        self.push(err);
    }
}
