//! crates/enclave_core/src/seed.rs
//!
//! Demo dataset loaded into an empty store at startup.

use std::sync::Arc;
use tracing::info;

use crate::domain::{AccessLevel, NewUser, NodeType, Role};
use crate::filesystem::{CreateNode, FilesystemError, FilesystemService};
use crate::password::PasswordService;
use crate::ports::{DatabaseService, PortError};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to hash demo password: {0}")]
    Password(String),
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
    #[error(transparent)]
    Port(#[from] PortError),
}

const DEMO_USERS: [(&str, Role); 4] = [
    ("admin", Role::Admin),
    ("military", Role::Military),
    ("researcher", Role::Researcher),
    ("commander", Role::MilitaryResearcher),
];

const DEMO_NODES: [(&str, NodeType, AccessLevel, &str); 11] = [
    (
        "/readme.txt",
        NodeType::File,
        AccessLevel::Public,
        "PHOENIX INDUSTRIES - ENCLAVE TERMINAL\nAuthorized personnel only. All activity is logged.",
    ),
    ("/public", NodeType::Directory, AccessLevel::Public, ""),
    (
        "/public/announcements.txt",
        NodeType::File,
        AccessLevel::Public,
        "Cafeteria hours extended until 2100.\nQuarterly safety drill scheduled for Friday.",
    ),
    ("/research", NodeType::Directory, AccessLevel::Researcher, ""),
    (
        "/research/research_notes.md",
        NodeType::File,
        AccessLevel::Researcher,
        "# Research Notes\n\nPhoenix alloy retains structure up to 3400K.\nNext step: fatigue cycles at reduced temperature.",
    ),
    ("/research/experiments", NodeType::Directory, AccessLevel::Researcher, ""),
    (
        "/research/experiments/log_001.txt",
        NodeType::File,
        AccessLevel::Researcher,
        "EXP-001 day 14: sample B fractured at cycle 18,220. Sample C intact.",
    ),
    ("/military", NodeType::Directory, AccessLevel::Military, ""),
    (
        "/military/deployment_orders.txt",
        NodeType::File,
        AccessLevel::Military,
        "CLASSIFIED\nUnit Alpha: perimeter sector 3.\nUnit Bravo: escort convoy 7 at 0600.",
    ),
    ("/admin", NodeType::Directory, AccessLevel::Admin, ""),
    (
        "/admin/system_config.txt",
        NodeType::File,
        AccessLevel::Admin,
        "audit_retention_days=365\nterminal_idle_timeout_minutes=60",
    ),
];

/// Creates the demo users (password `<username>123`) and filesystem. Does
/// nothing when any user already exists. Returns whether data was written.
pub async fn seed_demo_data(
    db: Arc<dyn DatabaseService>,
    passwords: &PasswordService,
) -> Result<bool, SeedError> {
    if db.count_users().await? > 0 {
        info!("Store already populated, skipping demo data");
        return Ok(false);
    }

    for (username, role) in DEMO_USERS {
        let password_hash = passwords
            .hash(&format!("{username}123"))
            .map_err(|e| SeedError::Password(e.to_string()))?;
        db.create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@phoenix.local"),
            password_hash,
            role,
        })
        .await?;
    }

    let filesystem = FilesystemService::new(db);
    for (path, node_type, access_level, content) in DEMO_NODES {
        filesystem
            .create(CreateNode {
                path: path.to_string(),
                node_type,
                content: Some(content.to_string()),
                access_level,
            })
            .await?;
    }

    info!(
        users = DEMO_USERS.len(),
        nodes = DEMO_NODES.len(),
        "Demo data seeded"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn seeds_once() {
        let store = Arc::new(InMemoryStore::new());
        let passwords = PasswordService::with_params(1024, 1, 1).unwrap();

        assert!(seed_demo_data(store.clone(), &passwords).await.unwrap());
        assert!(!seed_demo_data(store.clone(), &passwords).await.unwrap());
        assert_eq!(store.count_users().await.unwrap(), 4);

        let fs = FilesystemService::new(store);
        let commander_view = fs.list_children("/", Role::MilitaryResearcher).await.unwrap();
        let names: Vec<&str> = commander_view.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["military", "public", "research", "readme.txt"]);

        let notes = fs
            .read_file("/research/research_notes.md", Role::Researcher)
            .await
            .unwrap();
        assert!(notes.content.unwrap_or_default().contains("Research Notes"));
    }
}
