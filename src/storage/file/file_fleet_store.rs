use fs2::FileExt;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{ErrorKind::NotFound, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::error::Result;
use crate::common::partner::{Node, NodeId, Partner, PartnerId};
use crate::common::project::Project;
use crate::storage::fleet_snapshot::FleetSnapshot;
use crate::traits::fleet_store::FleetStore;

/// JSON file holding the whole fleet; writers take an exclusive file lock.
pub struct FileFleetStore {
    path: PathBuf,
}

impl FileFleetStore {
    pub fn new(path: &str) -> Self {
        Self {
            path: Path::new(path).to_owned(),
        }
    }

    fn read(&self) -> Result<FleetSnapshot> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == NotFound => return Ok(FleetSnapshot::default()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let mut contents = String::new();
        let read = file.read_to_string(&mut contents);
        FileExt::unlock(&file)?;
        read?;
        if contents.trim().is_empty() {
            return Ok(FleetSnapshot::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut FleetSnapshot) -> Result<T>) -> Result<T> {
        if let Some(dir) = self.path.parent() {
            create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let outcome = Self::rewrite(&mut file, f);
        FileExt::unlock(&file)?;
        outcome
    }

    fn rewrite<T>(file: &mut File, f: impl FnOnce(&mut FleetSnapshot) -> Result<T>) -> Result<T> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut snapshot: FleetSnapshot = if contents.trim().is_empty() {
            FleetSnapshot::default()
        } else {
            serde_json::from_str(&contents)?
        };

        let value = f(&mut snapshot)?;

        let json = serde_json::to_string_pretty(&snapshot)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(json.as_bytes())?;
        Ok(value)
    }
}

impl FleetStore for FileFleetStore {
    async fn gen_id(&self) -> Result<u64> {
        self.modify(|snapshot| Ok(snapshot.gen_id()))
    }

    async fn save_partner(&self, partner: &Partner) -> Result<()> {
        log::debug!("Saving partner {} to {:?}", partner.short_name, self.path);
        self.modify(|snapshot| snapshot.upsert_partner(partner))
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>> {
        Ok(self.read()?.partners.remove(&id))
    }

    async fn get_partners(&self) -> Result<Vec<Partner>> {
        Ok(self.read()?.partners.into_values().collect())
    }

    async fn save_node(&self, node: &Node) -> Result<()> {
        log::debug!("Saving node {} to {:?}", node.id, self.path);
        self.modify(|snapshot| snapshot.upsert_node(node))
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.read()?.nodes.remove(&id))
    }

    async fn get_node_by_token(&self, token: &str) -> Result<Option<Node>> {
        Ok(self.read()?.node_by_token(token))
    }

    async fn get_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.read()?.nodes.into_values().collect())
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        self.modify(|snapshot| {
            snapshot
                .projects
                .insert(project.name.clone(), project.clone());
            Ok(())
        })
    }

    async fn get_project(&self, name: &str) -> Result<Option<Project>> {
        Ok(self.read()?.projects.remove(name))
    }

    async fn get_projects(&self) -> Result<Vec<Project>> {
        Ok(self.read()?.projects.into_values().collect())
    }

    async fn delete_project(&self, name: &str) -> Result<()> {
        self.modify(|snapshot| {
            snapshot.projects.remove(name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fleet.json");
        let store = FileFleetStore::new(path.to_str().unwrap());

        let id = store.gen_id().await.unwrap();
        let partner = Partner {
            id,
            short_name: "acme".to_string(),
            name: "Acme".to_string(),
            active: true,
        };
        store.save_partner(&partner).await.unwrap();
        let node = Node::new(store.gen_id().await.unwrap(), id);
        store.save_node(&node).await.unwrap();
        store.save_project(&Project::new("demo", &["any"])).await.unwrap();

        let reopened = FileFleetStore::new(path.to_str().unwrap());
        assert_eq!(reopened.get_partner(id).await.unwrap(), Some(partner));
        assert_eq!(
            reopened.get_node_by_token(&node.token).await.unwrap(),
            Some(node.clone())
        );
        assert_eq!(reopened.get_projects().await.unwrap().len(), 1);
        assert_eq!(reopened.gen_id().await.unwrap(), 3);

        reopened.delete_project("demo").await.unwrap();
        assert!(reopened.get_project("demo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_short_name_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFleetStore::new(dir.path().join("fleet.json").to_str().unwrap());
        let first = Partner {
            id: 1,
            short_name: "acme".to_string(),
            name: "Acme".to_string(),
            active: true,
        };
        let second = Partner {
            id: 2,
            name: "Acme Two".to_string(),
            ..first.clone()
        };
        store.save_partner(&first).await.unwrap();
        let err = store.save_partner(&second).await.unwrap_err();
        assert!(matches!(err, crate::common::error::FleetError::Conflict(_)));
    }
}
