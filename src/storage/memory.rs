//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::links::Link;
use crate::links::OwnerId;

use super::CreateLinkValues;
use super::Error;
use super::Result;
use super::Storage;

/// An in-memory storage
///
/// Will be destroyed on system shutdown, clones share the same links
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All links in storage, by code
    links: Arc<RwLock<HashMap<String, Link>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for Memory {
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        match self.links.write().await.entry(values.code.to_string()) {
            Entry::Occupied(_) => Err(Error::Conflict),
            Entry::Vacant(entry) => Ok(entry.insert(values.to_link()).clone()),
        }
    }

    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>> {
        Ok(self.links.read().await.get(code).cloned())
    }

    async fn find_all_links_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Link>> {
        Ok(self
            .links
            .read()
            .await
            .values()
            .filter(|link| link.owner_id == owner_id && !link.is_deleted())
            .cloned()
            .collect())
    }

    async fn delete_links(&self, codes: &[String], owner_id: OwnerId) -> Result<u64> {
        let mut links = self.links.write().await;

        let mut deleted = 0;
        for code in codes {
            if let Some(link) = links.get_mut(code) {
                if link.owner_id == owner_id && !link.is_deleted() {
                    link.deleted = true;
                    deleted += 1;
                }
            }
        }

        Ok(deleted)
    }

    async fn ping(&self) -> Result<()> {
        Err(Error::Unavailable)
    }
}
