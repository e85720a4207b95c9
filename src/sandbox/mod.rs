//! Read-only snapshot of the sandbox/container object model.
//!
//! The lifecycle collaborator owns creation, deletion and state transitions of
//! sandboxes and containers. The stats server only ever sees a stable
//! [`Sandbox`] snapshot: identity, labels, metadata, the cgroup parent path,
//! the network namespace path and the ordered list of [`Container`]s.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

mod error;
mod layer;

pub use error::{Error, Result};
pub use layer::{DirectoryLayerUsage, LayerUsage, WritableLayerProvider};

/// The maximum allowed length for a [`SandboxID`] or [`ContainerID`].
const ID_MAX_LEN: usize = 255;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $err:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
        #[serde(try_from = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            /// Creates a new identifier from the given raw id.
            ///
            /// # Errors
            ///
            /// Returns an error if the raw id is empty or longer than 255 bytes.
            pub fn new(src: impl AsRef<str>) -> Result<Self> {
                let src = src.as_ref();
                if src.is_empty() || src.len() > ID_MAX_LEN {
                    return Err(Error::$err(src.to_owned()));
                }
                Ok(Self(src.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// A validated pod sandbox identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// # use pod_stats::sandbox::SandboxID;
    /// let id = SandboxID::new("5f1a8c").unwrap();
    /// assert_eq!(id.as_str(), "5f1a8c");
    /// assert!(SandboxID::new("").is_err());
    /// ```
    SandboxID,
    InvalidSandboxID
);

entity_id!(
    /// A validated container identifier.
    ContainerID,
    InvalidContainerID
);

/// Lifecycle status of a container as last reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    #[default]
    Running,
    Paused,
    Stopped,
}

impl ContainerStatus {
    pub fn is_stopped(self) -> bool {
        matches!(self, ContainerStatus::Stopped)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PodSandboxMetadata {
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ContainerMetadata {
    pub name: String,
    pub attempt: u32,
}

/// Snapshot of a single container inside a sandbox.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Container {
    pub id: ContainerID,
    #[serde(default)]
    pub status: ContainerStatus,
    #[serde(default)]
    pub metadata: ContainerMetadata,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Directory backing the container's writable (upper) layer, if known.
    #[serde(default)]
    pub writable_layer_dir: Option<PathBuf>,
}

impl Container {
    pub fn new(id: ContainerID) -> Self {
        Self {
            id,
            status: ContainerStatus::default(),
            metadata: ContainerMetadata::default(),
            image: String::new(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            writable_layer_dir: None,
        }
    }
}

/// Snapshot of a pod sandbox and its containers.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Sandbox {
    pub id: SandboxID,
    #[serde(default)]
    pub metadata: PodSandboxMetadata,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Cgroup parent path, relative to the cgroup root.
    pub cgroup_parent: PathBuf,
    /// Path of the sandbox network namespace. `None` for host-network sandboxes.
    #[serde(default)]
    pub net_ns_path: Option<PathBuf>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Sandbox {
    pub fn new(id: SandboxID, cgroup_parent: impl Into<PathBuf>) -> Self {
        Self {
            id,
            metadata: PodSandboxMetadata::default(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            cgroup_parent: cgroup_parent.into(),
            net_ns_path: None,
            containers: Vec::new(),
        }
    }

    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.id.as_str() == id)
    }

    /// Containers that are not stopped, in snapshot order.
    pub fn live_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter().filter(|c| !c.status.is_stopped())
    }
}
