//! crates/enclave_core/src/filesystem.rs
//!
//! Role-scoped access to the virtual filesystem. "Does not exist" and "exists
//! but forbidden" produce the same error so callers cannot probe for hidden
//! nodes.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{AccessLevel, FilesystemNode, NewFilesystemNode, NodeType, NodeUpdate, Role};
use crate::paths;
use crate::ports::{DatabaseService, PortError};

#[derive(Debug, thiserror::Error)]
pub enum FilesystemError {
    #[error("No such file or directory")]
    NotFoundOrDenied,
    #[error("A node already exists at {0}")]
    AlreadyExists(String),
    #[error("Parent directory {0} does not exist")]
    ParentNotFound(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Directories cannot hold content")]
    NotAFile,
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Administrative request to create a node.
#[derive(Debug, Clone)]
pub struct CreateNode {
    pub path: String,
    pub node_type: NodeType,
    pub content: Option<String>,
    pub access_level: AccessLevel,
}

#[derive(Clone)]
pub struct FilesystemService {
    db: Arc<dyn DatabaseService>,
}

impl FilesystemService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Direct children of the directory at `path` that the role may see,
    /// directories first and then by name.
    pub async fn list_children(
        &self,
        path: &str,
        role: Role,
    ) -> Result<Vec<FilesystemNode>, FilesystemError> {
        let path = paths::normalize(path);
        let parent_id = if paths::is_root(&path) {
            None
        } else {
            Some(self.find_directory(&path, role).await?.id)
        };

        let mut children: Vec<FilesystemNode> = self
            .db
            .list_child_nodes(parent_id)
            .await?
            .into_iter()
            .filter(|node| node.access_level.visible_to(role))
            .collect();
        children.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(children)
    }

    pub async fn get_node(&self, path: &str, role: Role) -> Result<FilesystemNode, FilesystemError> {
        let path = paths::normalize(path);
        self.db
            .get_node_by_path(&path)
            .await?
            .filter(|node| node.access_level.visible_to(role))
            .ok_or(FilesystemError::NotFoundOrDenied)
    }

    pub async fn find_directory(
        &self,
        path: &str,
        role: Role,
    ) -> Result<FilesystemNode, FilesystemError> {
        let node = self.get_node(path, role).await?;
        if !node.is_directory() {
            return Err(FilesystemError::NotFoundOrDenied);
        }
        Ok(node)
    }

    pub async fn read_file(&self, path: &str, role: Role) -> Result<FilesystemNode, FilesystemError> {
        let node = self.get_node(path, role).await?;
        if node.node_type != NodeType::File {
            return Err(FilesystemError::NotFoundOrDenied);
        }
        Ok(node)
    }

    pub async fn create(&self, request: CreateNode) -> Result<FilesystemNode, FilesystemError> {
        let path = paths::normalize(&request.path);
        let name = paths::file_name(&path).to_string();
        if name.is_empty() {
            return Err(FilesystemError::InvalidPath(request.path));
        }

        let parent_path = paths::parent(&path).unwrap_or_else(|| "/".to_string());
        let parent_id = if paths::is_root(&parent_path) {
            None
        } else {
            match self.db.get_node_by_path(&parent_path).await? {
                Some(parent) if parent.is_directory() => Some(parent.id),
                _ => return Err(FilesystemError::ParentNotFound(parent_path)),
            }
        };

        if self.db.get_node_by_path(&path).await?.is_some() {
            return Err(FilesystemError::AlreadyExists(path));
        }

        let content = match request.node_type {
            NodeType::File => Some(request.content.unwrap_or_default()),
            NodeType::Directory => None,
        };
        let node = NewFilesystemNode {
            name,
            path: path.clone(),
            node_type: request.node_type,
            content,
            parent_id,
            access_level: request.access_level,
        };
        self.db.create_node(node).await.map_err(|e| match e {
            PortError::Conflict(_) => FilesystemError::AlreadyExists(path),
            other => other.into(),
        })
    }

    pub async fn update(
        &self,
        node_id: Uuid,
        update: NodeUpdate,
    ) -> Result<FilesystemNode, FilesystemError> {
        let node = self
            .db
            .get_node_by_id(node_id)
            .await?
            .ok_or(FilesystemError::NotFoundOrDenied)?;
        if node.is_directory() && update.content.is_some() {
            return Err(FilesystemError::NotAFile);
        }
        self.db.update_node(node_id, update).await.map_err(|e| match e {
            PortError::NotFound(_) => FilesystemError::NotFoundOrDenied,
            other => other.into(),
        })
    }

    /// Soft-deletes the node together with everything beneath it.
    pub async fn delete(&self, node_id: Uuid) -> Result<u64, FilesystemError> {
        match self.db.deactivate_node_tree(node_id).await? {
            0 => Err(FilesystemError::NotFoundOrDenied),
            removed => Ok(removed),
        }
    }
}
