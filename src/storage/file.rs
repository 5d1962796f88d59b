//! File storage
//!
//! Append-only log, one line per event:
//!
//! ```text
//! <code>|<url>|<owner>
//! <code>|<url>|<owner>|deleted
//! ```
//!
//! Lines are never rewritten. The log is replayed into an in-memory index on open, the index is
//! kept current on every write, so lookups never scan the file.
//!
//! A line is only acknowledged once it is complete on disk. A torn tail, left by a crash or a
//! failed write, is cut off so the next line never continues it.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::sync::RwLock;

use crate::links::Link;
use crate::links::OwnerId;

use super::CreateLinkValues;
use super::Error;
use super::Result;
use super::Storage;
use super::connection_error;

/// Separates the fields of a line, never part of a code
const SEPARATOR: char = '|';

/// Last field of a tombstone line
const DELETED_MARKER: &str = "deleted";

/// A single parsed line of the log
#[derive(Debug, PartialEq, Eq)]
enum LogLine {
    /// A link is created
    Record(Link),

    /// A link is soft-deleted
    Tombstone {
        /// Code of the deleted link
        code: String,

        /// Owner that deleted the link
        owner_id: OwnerId,
    },
}

impl LogLine {
    /// Parse a line, `None` when it is malformed
    ///
    /// URLs may contain the separator, so the code is split off the front and the owner (and
    /// marker) off the back
    fn parse(line: &str) -> Option<Self> {
        let (code, rest) = line.split_once(SEPARATOR)?;
        let (rest, last) = rest.rsplit_once(SEPARATOR)?;

        if code.is_empty() {
            return None;
        }

        if last == DELETED_MARKER {
            let (_url, owner_id) = rest.rsplit_once(SEPARATOR)?;

            return Some(Self::Tombstone {
                code: code.to_string(),
                owner_id: owner_id.parse().ok()?,
            });
        }

        if rest.is_empty() {
            return None;
        }

        Some(Self::Record(Link {
            code: code.to_string(),
            url: rest.to_string(),
            owner_id: last.parse().ok()?,
            deleted: false,
        }))
    }
}

/// Encode the line for a created link
fn record_line(link: &Link) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}\n",
        link.code, link.url, link.owner_id
    )
}

/// Encode the line for a deleted link
fn tombstone_line(link: &Link) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{DELETED_MARKER}\n",
        link.code, link.url, link.owner_id
    )
}

/// Make sure a link fits on a single line of the log
fn ensure_storable(values: &CreateLinkValues<'_>) -> Result<()> {
    if values.code.is_empty() || values.code.contains(SEPARATOR) {
        return Err(Error::InvalidRecord(format!(
            "code can not be empty or contain {SEPARATOR:?}"
        )));
    }

    if values.code.contains(['\n', '\r']) || values.url.contains(['\n', '\r']) {
        return Err(Error::InvalidRecord(
            "line breaks are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Append-only file storage
#[derive(Clone, Debug)]
pub struct FlatFile {
    /// Location of the log
    path: PathBuf,

    /// Append handle, one writer at a time so lines never interleave
    writer: Arc<Mutex<Log>>,

    /// All links in the log, by code
    index: Arc<RwLock<HashMap<String, Link>>>,
}

impl FlatFile {
    /// Open (or create) the log and replay it
    ///
    /// # Errors
    ///
    /// Will return `Err` when the file can not be created or read
    pub async fn open<P>(path: P) -> Result<Self>
    where
        P: Into<PathBuf>,
    {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(connection_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(connection_error)?;

        let contents = fs::read(&path).await.map_err(connection_error)?;

        // everything after the last line break is a torn write
        let len = contents
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |position| position + 1);

        if len < contents.len() {
            tracing::warn!(
                "Cutting off {} bytes of an incomplete line at the end of {}",
                contents.len() - len,
                path.display()
            );

            file.set_len(len as u64).await.map_err(connection_error)?;
        }

        let index = replay(&contents[..len], &path);

        tracing::info!("Loaded {} links from {}", index.len(), path.display());

        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(Log {
                file,
                len: len as u64,
                torn: false,
            })),
            index: Arc::new(RwLock::new(index)),
        })
    }

    /// Location of the log
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Build the index from the complete lines of the log
fn replay(contents: &[u8], path: &Path) -> HashMap<String, Link> {
    let mut index: HashMap<String, Link> = HashMap::new();

    for (number, line) in contents.split(|byte| *byte == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }

        let parsed = std::str::from_utf8(line)
            .ok()
            .and_then(|line| LogLine::parse(line.trim_end_matches('\r')));

        match parsed {
            Some(LogLine::Record(link)) => {
                // first writer wins
                index.entry(link.code.clone()).or_insert(link);
            }
            Some(LogLine::Tombstone { code, owner_id }) => {
                if let Some(link) = index.get_mut(&code) {
                    if link.owner_id == owner_id {
                        link.deleted = true;
                    }
                }
            }
            None => {
                tracing::warn!("Skipping malformed line {} of {}", number + 1, path.display());
            }
        }
    }

    index
}

/// The append side of the log
#[derive(Debug)]
struct Log {
    /// Handle opened in append mode
    file: File,

    /// Bytes of complete lines in the file
    len: u64,

    /// A failed write could not be cut off yet
    torn: bool,
}

impl Log {
    /// Append complete lines and make sure they hit the disk
    ///
    /// On failure the file is cut back to its last complete line
    async fn append(&mut self, lines: &str) -> Result<()> {
        if self.torn {
            self.file.set_len(self.len).await.map_err(connection_error)?;
            self.torn = false;
        }

        if let Err(err) = self.write(lines).await {
            if let Err(truncate_err) = self.file.set_len(self.len).await {
                tracing::error!("Could not cut off a failed write: {truncate_err}");

                self.torn = true;
            }

            return Err(err);
        }

        self.len += lines.len() as u64;

        Ok(())
    }

    async fn write(&mut self, lines: &str) -> Result<()> {
        self.file
            .write_all(lines.as_bytes())
            .await
            .map_err(connection_error)?;
        self.file.flush().await.map_err(connection_error)?;
        self.file.sync_data().await.map_err(connection_error)?;

        Ok(())
    }
}

#[async_trait]
impl Storage for FlatFile {
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        ensure_storable(values)?;

        let mut writer = self.writer.lock().await;

        if self.index.read().await.contains_key(values.code) {
            return Err(Error::Conflict);
        }

        let link = values.to_link();
        writer.append(&record_line(&link)).await?;

        tracing::debug!("Appended {} to {}", link.code, self.path.display());

        self.index
            .write()
            .await
            .insert(link.code.clone(), link.clone());

        Ok(link)
    }

    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>> {
        Ok(self.index.read().await.get(code).cloned())
    }

    async fn find_all_links_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Link>> {
        Ok(self
            .index
            .read()
            .await
            .values()
            .filter(|link| link.owner_id == owner_id && !link.is_deleted())
            .cloned()
            .collect())
    }

    async fn delete_links(&self, codes: &[String], owner_id: OwnerId) -> Result<u64> {
        let mut writer = self.writer.lock().await;

        let deleted = {
            let index = self.index.read().await;

            let mut deleted: Vec<&Link> = Vec::new();
            for code in codes {
                if let Some(link) = index.get(code) {
                    let seen = deleted.iter().any(|other| other.code == link.code);

                    if link.owner_id == owner_id && !link.is_deleted() && !seen {
                        deleted.push(link);
                    }
                }
            }

            if deleted.is_empty() {
                return Ok(0);
            }

            let lines = deleted.iter().map(|link| tombstone_line(link)).collect::<String>();
            writer.append(&lines).await?;

            deleted
                .into_iter()
                .map(|link| link.code.clone())
                .collect::<Vec<String>>()
        };

        let mut index = self.index.write().await;
        for code in &deleted {
            if let Some(link) = index.get_mut(code) {
                link.deleted = true;
            }
        }

        Ok(deleted.len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Err(Error::Unavailable)
    }
}
