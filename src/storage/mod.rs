//! All things related to the storage of links

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::links::Link;
use crate::links::OwnerId;

pub use file::FlatFile;
pub use memory::Memory;
pub use postgres::Postgres;

mod file;
mod memory;
mod postgres;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// No link with this code
    #[error("Link not found")]
    NotFound,

    /// The link exists but is soft-deleted
    #[error("Link is deleted")]
    Gone,

    /// The code is already taken
    #[error("Code already exists")]
    Conflict,

    /// The storage has no live connection to check
    #[error("Storage has no connection")]
    Unavailable,

    /// The storage did not answer in time, the call is aborted
    #[error("Storage call timed out")]
    Timeout,

    /// The record can not be represented by the storage
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Map any error into a connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::fmt::Display,
{
    Error::Connection(err.to_string())
}

/// Which storage to use
#[derive(Debug)]
pub enum Config {
    /// Keep everything in memory
    Memory,

    /// Append-only log file at the path
    File(PathBuf),

    /// Postgres database
    Postgres {
        /// Connection string
        dsn: String,

        /// Deadline for every single statement
        timeout: Duration,
    },
}

/// Setup the storage
///
/// # Errors
///
/// Will return `Err` when the storage can not be opened or connected to
pub async fn setup(config: Config) -> Result<Arc<dyn Storage>> {
    match config {
        Config::Memory => {
            tracing::info!("Using memory storage, links will not survive a restart");

            Ok(Arc::new(Memory::new()))
        }
        Config::File(path) => {
            tracing::info!("Using file storage: {}", path.display());

            Ok(Arc::new(FlatFile::open(path).await?))
        }
        Config::Postgres { dsn, timeout } => {
            tracing::info!("Using Postgres storage");

            Ok(Arc::new(Postgres::new(&dsn, timeout).await?))
        }
    }
}

/// Values to create a Link
pub struct CreateLinkValues<'a> {
    /// The generated code
    pub code: &'a str,

    /// The URL the code resolves to
    pub url: &'a str,

    /// The owner creating the link
    pub owner_id: OwnerId,
}

impl CreateLinkValues<'_> {
    /// Turn the values into a live link
    fn to_link(&self) -> Link {
        Link {
            code: self.code.to_string(),
            url: self.url.to_string(),
            owner_id: self.owner_id,
            deleted: false,
        }
    }
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Create a link
    ///
    /// Fails with [`Error::Conflict`] when the code exists, the existing link is never touched
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link>;

    /// Find a single link by code
    ///
    /// DOES NOT respect the soft-delete, handle with care
    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>>;

    /// Find all links of an owner
    ///
    /// Respects the soft-delete
    async fn find_all_links_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Link>>;

    /// Soft-delete links, only the ones owned by the owner
    ///
    /// Returns the number of links that were not deleted before
    async fn delete_links(&self, codes: &[String], owner_id: OwnerId) -> Result<u64>;

    /// Check the connection to the storage
    async fn ping(&self) -> Result<()>;

    /// Get the URL of a live link
    async fn get(&self, code: &str) -> Result<String> {
        match self.find_single_link_by_code(code).await? {
            Some(link) if link.is_deleted() => Err(Error::Gone),
            Some(link) => Ok(link.url),
            None => Err(Error::NotFound),
        }
    }

    /// Get the URL of a live link of an owner
    async fn get_for_owner(&self, code: &str, owner_id: OwnerId) -> Result<String> {
        match self.find_single_link_by_code(code).await? {
            Some(link) if link.owner_id != owner_id => Err(Error::NotFound),
            Some(link) if link.is_deleted() => Err(Error::Gone),
            Some(link) => Ok(link.url),
            None => Err(Error::NotFound),
        }
    }

    /// All live links of an owner, by URL
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<HashMap<String, String>> {
        Ok(self
            .find_all_links_by_owner(owner_id)
            .await?
            .into_iter()
            .map(|link| (link.url, link.code))
            .collect())
    }
}
