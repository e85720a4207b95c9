use std::sync::Arc;

use dashmap::DashMap;

use crate::sandbox::{ContainerID, Sandbox, SandboxID};

/// Sandbox snapshots known to the stats server.
///
/// Registration replaces the snapshot wholesale; a container → sandbox index
/// resolves container lookups without scanning every sandbox.
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    sandboxes: DashMap<SandboxID, Arc<Sandbox>>,
    owners: DashMap<ContainerID, SandboxID>,
}

impl SandboxRegistry {
    /// Inserts or replaces a sandbox snapshot.
    ///
    /// Returns the previous snapshot, whose containers may need purging.
    pub fn register(&self, sandbox: Sandbox) -> Option<Arc<Sandbox>> {
        let sandbox = Arc::new(sandbox);
        for container in &sandbox.containers {
            self.owners.insert(container.id.clone(), sandbox.id.clone());
        }
        let previous = self.sandboxes.insert(sandbox.id.clone(), Arc::clone(&sandbox));
        if let Some(prev) = &previous {
            for container in &prev.containers {
                if sandbox.container(container.id.as_str()).is_none() {
                    self.owners.remove(&container.id);
                }
            }
        }
        previous
    }

    pub fn remove(&self, id: &SandboxID) -> Option<Arc<Sandbox>> {
        let (_, sandbox) = self.sandboxes.remove(id)?;
        for container in &sandbox.containers {
            self.owners.remove_if(&container.id, |_, owner| owner == id);
        }
        Some(sandbox)
    }

    /// Drops a container from its sandbox's snapshot.
    ///
    /// Returns the owning sandbox id if the container was known.
    pub fn remove_container(&self, id: &ContainerID) -> Option<SandboxID> {
        let (_, owner) = self.owners.remove(id)?;
        if let Some(mut entry) = self.sandboxes.get_mut(&owner) {
            let mut sandbox = Sandbox::clone(&entry);
            sandbox.containers.retain(|c| &c.id != id);
            *entry = Arc::new(sandbox);
        }
        Some(owner)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Sandbox>> {
        self.sandboxes.get(id).map(|entry| Arc::clone(&entry))
    }

    /// The sandbox owning the container `id`.
    pub fn find_container(&self, id: &str) -> Option<Arc<Sandbox>> {
        let owner = self.owners.get(id).map(|entry| entry.value().clone())?;
        self.get(owner.as_str())
    }

    /// Snapshot of every registered sandbox, ordered by id.
    pub fn list(&self) -> Vec<Arc<Sandbox>> {
        let mut sandboxes: Vec<_> = self
            .sandboxes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sandboxes.sort_by(|a, b| a.id.cmp(&b.id));
        sandboxes
    }

    pub fn size(&self) -> usize {
        self.sandboxes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Container;

    fn sandbox(id: &str, containers: &[&str]) -> Sandbox {
        let mut sb = Sandbox::new(SandboxID::new(id).unwrap(), format!("pod-{id}"));
        sb.containers = containers
            .iter()
            .map(|c| Container::new(ContainerID::new(c).unwrap()))
            .collect();
        sb
    }

    #[test]
    fn test_register_and_find_container() {
        let registry = SandboxRegistry::default();
        assert!(registry.register(sandbox("sb1", &["c1", "c2"])).is_none());
        registry.register(sandbox("sb2", &["c3"]));

        assert_eq!(registry.size(), 2);
        assert_eq!(registry.find_container("c2").unwrap().id.as_str(), "sb1");
        assert_eq!(registry.find_container("c3").unwrap().id.as_str(), "sb2");
        assert!(registry.find_container("c9").is_none());
        let ids: Vec<_> = registry.list().iter().map(|s| s.id.to_string()).collect();
        assert_eq!(ids, vec!["sb1", "sb2"]);
    }

    #[test]
    fn test_replace_drops_vanished_containers() {
        let registry = SandboxRegistry::default();
        registry.register(sandbox("sb1", &["c1", "c2"]));
        let previous = registry.register(sandbox("sb1", &["c2"])).unwrap();
        assert_eq!(previous.containers.len(), 2);
        assert!(registry.find_container("c1").is_none());
        assert!(registry.find_container("c2").is_some());
    }

    #[test]
    fn test_remove_sandbox_and_container() {
        let registry = SandboxRegistry::default();
        registry.register(sandbox("sb1", &["c1", "c2"]));

        let owner = registry
            .remove_container(&ContainerID::new("c1").unwrap())
            .unwrap();
        assert_eq!(owner.as_str(), "sb1");
        assert_eq!(registry.get("sb1").unwrap().containers.len(), 1);

        let removed = registry.remove(&SandboxID::new("sb1").unwrap()).unwrap();
        assert_eq!(removed.containers.len(), 1);
        assert!(registry.find_container("c2").is_none());
        assert_eq!(registry.size(), 0);
    }
}
