//! Grant storage
//!
//! Holds store-backed grants keyed by id. Grants are write-once: a second
//! `put` for the same id is rejected. Expired grants stay readable until
//! purged; expiry is enforced by the verifier, not by the store.

use crate::{
    error::{GrantError, Result},
    grant::{Grant, GrantId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Storage for issued grants
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Record a new grant
    async fn put(&self, grant: Grant) -> Result<()>;

    /// Fetch a grant, failing with `GrantNotFound` when absent
    async fn get(&self, id: &GrantId) -> Result<Grant>;

    /// Drop grants that are expired at `now`, returning how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Number of stored grants, live or expired
    async fn len(&self) -> Result<usize>;
}

/// In-memory grant store
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<HashMap<GrantId, Grant>>,
}

impl InMemoryGrantStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn put(&self, grant: Grant) -> Result<()> {
        let mut grants = self.grants.write().await;
        if grants.contains_key(&grant.id) {
            return Err(GrantError::DuplicateGrant(grant.id.to_string()));
        }

        debug!(grant_id = %grant.id, "Stored grant");
        grants.insert(grant.id.clone(), grant);
        Ok(())
    }

    async fn get(&self, id: &GrantId) -> Result<Grant> {
        self.grants
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GrantError::GrantNotFound(id.to_string()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut grants = self.grants.write().await;
        let before = grants.len();
        grants.retain(|_, grant| !grant.is_expired_at(now));
        Ok(before - grants.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.grants.read().await.len())
    }
}

/// Grant store persisted as a JSON document
///
/// The whole map is loaded at open and rewritten on every change through a
/// temporary file and a rename, so a crash leaves either the old or the new
/// document on disk. Every grant field is stored verbatim.
#[derive(Debug)]
pub struct FileGrantStore {
    path: PathBuf,
    grants: RwLock<HashMap<GrantId, Grant>>,
}

impl FileGrantStore {
    /// Open the store at `path`, creating it empty when the file is missing
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let grants = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => {
                let list: Vec<Grant> = serde_json::from_slice(&bytes).map_err(|e| {
                    GrantError::StorageError(format!(
                        "Failed to parse grant store {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                list.into_iter().map(|g| (g.id.clone(), g)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), grants = grants.len(), "Opened grant store");

        Ok(Self {
            path,
            grants: RwLock::new(grants),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, grants: &HashMap<GrantId, Grant>) -> Result<()> {
        let mut list: Vec<&Grant> = grants.values().collect();
        list.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.id.cmp(&b.id)));

        let content = serde_json::to_vec_pretty(&list)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl GrantStore for FileGrantStore {
    async fn put(&self, grant: Grant) -> Result<()> {
        // Write lock held across persist so concurrent puts serialize their rewrites
        let mut grants = self.grants.write().await;
        if grants.contains_key(&grant.id) {
            return Err(GrantError::DuplicateGrant(grant.id.to_string()));
        }

        let id = grant.id.clone();
        grants.insert(id.clone(), grant);

        if let Err(e) = self.persist(&grants).await {
            grants.remove(&id);
            return Err(e);
        }

        debug!(grant_id = %id, path = %self.path.display(), "Persisted grant");
        Ok(())
    }

    async fn get(&self, id: &GrantId) -> Result<Grant> {
        self.grants
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GrantError::GrantNotFound(id.to_string()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut grants = self.grants.write().await;
        let before = grants.len();
        grants.retain(|_, grant| !grant.is_expired_at(now));

        let removed = before - grants.len();
        if removed > 0 {
            self.persist(&grants).await?;
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.grants.read().await.len())
    }
}
