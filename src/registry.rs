//! The link registry
//!
//! Creates, resolves, lists and deletes links on top of any storage

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use crate::codes;
use crate::deletion::DeletionPipeline;
use crate::links::Link;
use crate::links::OwnerId;
use crate::storage;
use crate::storage::CreateLinkValues;
use crate::storage::Storage;

/// Registry errors
#[derive(Debug, Error)]
pub enum Error {
    /// The URL is not a valid absolute URL
    #[error("{0} is not a valid URL")]
    InvalidUrl(String),

    /// No link with this code
    #[error("Link not found")]
    NotFound,

    /// The link is deleted
    #[error("Link is deleted")]
    Gone,

    /// The owner has no links
    #[error("No links found for this owner")]
    NoRecords,

    /// The code of the URL is taken by another URL, a hash collision
    #[error("Code is already used by another URL")]
    Collision,

    /// Anything the storage could not handle
    #[error(transparent)]
    Storage(storage::Error),
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::NotFound => Self::NotFound,
            storage::Error::Gone => Self::Gone,
            storage::Error::Conflict => Self::Collision,
            err => Self::Storage(err),
        }
    }
}

/// Result of creating a link
#[derive(Debug, PartialEq, Eq)]
pub struct Created {
    /// Code of the link
    pub code: String,

    /// Was the URL registered before?
    pub already_existed: bool,
}

/// A link as shown to its owner
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct OwnedLink {
    /// Full short URL
    pub short_url: String,

    /// URL the short URL redirects to
    pub original_url: String,
}

/// Parse and validate a URL
///
/// Whitespace and control characters are rejected instead of being stripped by the parser, the
/// URL is stored exactly as submitted
///
/// ```rust
/// let url = "https://www.example.com/";
/// assert!(parse_url(url).is_ok())
/// ```
pub fn parse_url(url: &str) -> Result<&str, Error> {
    let invalid = || Error::InvalidUrl(url.to_string());

    if url.is_empty() || url.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(invalid());
    }

    Url::parse(url).map_err(|_| invalid())?;

    Ok(url)
}

/// Render the short URL of a code
pub fn short_url(base_url: &str, code: &str) -> String {
    format!("{}/{code}", base_url.trim_end_matches('/'))
}

/// Registry of all links
#[derive(Clone)]
pub struct LinkRegistry {
    /// Where links live
    storage: Arc<dyn Storage>,

    /// Background deletes
    deletion: DeletionPipeline,
}

impl LinkRegistry {
    /// Create a registry on top of a storage
    pub fn new(storage: Arc<dyn Storage>, deletion: DeletionPipeline) -> Self {
        Self { storage, deletion }
    }

    /// Create a link for a URL
    ///
    /// Registering the same URL again gives back the same code, also when that link is deleted. A
    /// deleted link stays deleted. A code is never taken over by another URL.
    pub async fn create(&self, url: &str, owner_id: OwnerId) -> Result<Created, Error> {
        let url = parse_url(url)?;
        let code = codes::generate(url);

        if let Some(link) = self.storage.find_single_link_by_code(&code).await? {
            return existing(link, url);
        }

        let values = CreateLinkValues {
            code: &code,
            url,
            owner_id,
        };

        match self.storage.create_link(&values).await {
            Ok(link) => {
                tracing::debug!(r#"Created code "{}" for: {url}"#, link.code);

                Ok(Created {
                    code: link.code,
                    already_existed: false,
                })
            }
            Err(storage::Error::Conflict) => {
                tracing::debug!(r#"Code "{code}" was created concurrently, reading it again"#);

                match self.storage.find_single_link_by_code(&code).await? {
                    Some(link) => existing(link, url),
                    None => Err(Error::Collision),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve a code to its URL
    pub async fn resolve(&self, code: &str) -> Result<String, Error> {
        Ok(self.storage.get(code).await?)
    }

    /// All live links of an owner
    pub async fn list_by_owner(
        &self,
        owner_id: OwnerId,
        base_url: &str,
    ) -> Result<Vec<OwnedLink>, Error> {
        let links = self.storage.list_for_owner(owner_id).await?;

        if links.is_empty() {
            return Err(Error::NoRecords);
        }

        let mut links = links
            .into_iter()
            .map(|(original_url, code)| OwnedLink {
                short_url: short_url(base_url, &code),
                original_url,
            })
            .collect::<Vec<OwnedLink>>();
        links.sort_by(|a, b| a.original_url.cmp(&b.original_url));

        Ok(links)
    }

    /// Soft-delete links of an owner in the background
    ///
    /// Returns before anything is deleted, see [`DeletionPipeline::submit`]
    pub fn delete_batch(&self, codes: Vec<String>, owner_id: OwnerId) -> JoinHandle<()> {
        self.deletion.submit(codes, owner_id)
    }

    /// Check the connection to the storage
    pub async fn ping(&self) -> Result<(), Error> {
        Ok(self.storage.ping().await?)
    }

    /// Wait for pending background work
    pub async fn shutdown(&self) {
        self.deletion.shutdown().await;
    }
}

/// Decide what an already stored link means for a create
fn existing(link: Link, url: &str) -> Result<Created, Error> {
    if link.url != url {
        tracing::warn!(r#"Code "{}" is already used by: {}"#, link.code, link.url);

        return Err(Error::Collision);
    }

    if link.is_deleted() {
        tracing::debug!(r#"Code "{}" is deleted, not bringing it back"#, link.code);
    }

    Ok(Created {
        code: link.code,
        already_existed: true,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::deletion::DEFAULT_CHUNK_SIZE;
    use crate::storage::FlatFile;
    use crate::storage::Memory;

    const OWNER: OwnerId = OwnerId::new(1);
    const OTHER_OWNER: OwnerId = OwnerId::new(2);
    const BASE_URL: &str = "http://localhost:8080";

    fn registry_with(storage: Arc<dyn Storage>) -> LinkRegistry {
        let deletion = DeletionPipeline::new(storage.clone(), 2, DEFAULT_CHUNK_SIZE);

        LinkRegistry::new(storage, deletion)
    }

    fn registry() -> (LinkRegistry, Memory) {
        let memory = Memory::new();

        (registry_with(Arc::new(memory.clone())), memory)
    }

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://www.example.com/").is_ok());
        assert!(parse_url("https://ya.ru").is_ok());

        for url in ["", "not a url", "invalidlink", "/relative/path", "https://ya.ru\n"] {
            assert!(matches!(parse_url(url), Err(Error::InvalidUrl(_))), "{url:?}");
        }
    }

    #[test]
    fn test_short_url() {
        assert_eq!(short_url(BASE_URL, "abc"), "http://localhost:8080/abc");
        assert_eq!(short_url("http://localhost:8080/", "abc"), "http://localhost:8080/abc");
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (registry, _) = registry();

        let first = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(first.code, "OTExOTk3");
        assert!(!first.already_existed);

        let second = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(second.code, first.code);
        assert!(second.already_existed);

        // another owner gets the same code as well
        let third = registry.create("https://ya.ru", OTHER_OWNER).await.unwrap();
        assert_eq!(third.code, first.code);
        assert!(third.already_existed);
    }

    #[tokio::test]
    async fn test_create_invalid_url_does_not_store() {
        let (registry, memory) = registry();

        assert!(matches!(
            registry.create("not a url", OWNER).await,
            Err(Error::InvalidUrl(_))
        ));

        assert!(memory.find_all_links_by_owner(OWNER).await.unwrap().is_empty());
        assert!(
            memory
                .find_single_link_by_code(&codes::generate("not a url"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_never_overwrites_collision() {
        let (registry, memory) = registry();

        // occupy the code of the URL with another URL
        let code = codes::generate("https://ya.ru");
        let values = CreateLinkValues {
            code: &code,
            url: "https://www.example.com/",
            owner_id: OTHER_OWNER,
        };
        memory.create_link(&values).await.unwrap();

        assert!(matches!(
            registry.create("https://ya.ru", OWNER).await,
            Err(Error::Collision)
        ));
        assert_eq!(
            registry.resolve(&code).await.unwrap(),
            "https://www.example.com/"
        );
    }

    #[tokio::test]
    async fn test_resolve() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.resolve("unknown0").await,
            Err(Error::NotFound)
        ));

        let created = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(
            registry.resolve(&created.code).await.unwrap(),
            "https://ya.ru"
        );
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.list_by_owner(OWNER, BASE_URL).await,
            Err(Error::NoRecords)
        ));

        let ya = registry.create("https://ya.ru", OWNER).await.unwrap();
        let example = registry
            .create("https://www.example.com/", OWNER)
            .await
            .unwrap();
        let deleted = registry
            .create("https://deleted.example.com/", OWNER)
            .await
            .unwrap();
        registry
            .create("https://other.example.com/", OTHER_OWNER)
            .await
            .unwrap();

        registry
            .delete_batch(vec![deleted.code], OWNER)
            .await
            .unwrap();

        let links = registry.list_by_owner(OWNER, BASE_URL).await.unwrap();
        assert_eq!(
            links,
            vec![
                OwnedLink {
                    short_url: format!("{BASE_URL}/{}", example.code),
                    original_url: "https://www.example.com/".to_string(),
                },
                OwnedLink {
                    short_url: format!("{BASE_URL}/{}", ya.code),
                    original_url: "https://ya.ru".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_batch_of_other_owner() {
        let (registry, _) = registry();

        let created = registry.create("https://ya.ru", OWNER).await.unwrap();

        registry
            .delete_batch(vec![created.code.clone()], OTHER_OWNER)
            .await
            .unwrap();

        assert_eq!(
            registry.resolve(&created.code).await.unwrap(),
            "https://ya.ru"
        );
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let (registry, _) = registry();

        let created = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(created.code.len(), codes::CODE_LENGTH);
        assert!(!created.already_existed);

        assert_eq!(
            registry.resolve(&created.code).await.unwrap(),
            "https://ya.ru"
        );

        let again = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(again.code, created.code);
        assert!(again.already_existed);

        registry
            .delete_batch(vec![created.code.clone()], OWNER)
            .await
            .unwrap();

        assert!(matches!(
            registry.resolve(&created.code).await,
            Err(Error::Gone)
        ));

        // the code is handed out again, the link stays deleted
        let recreated = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(recreated.code, created.code);
        assert!(recreated.already_existed);

        assert!(matches!(
            registry.resolve(&created.code).await,
            Err(Error::Gone)
        ));
    }

    /// Storage where another request always wins the race to create a link
    struct RacingStorage {
        inner: Memory,
        winner_url: &'static str,
    }

    #[async_trait]
    impl Storage for RacingStorage {
        async fn create_link(&self, values: &CreateLinkValues<'_>) -> storage::Result<Link> {
            let winner = CreateLinkValues {
                code: values.code,
                url: self.winner_url,
                owner_id: OTHER_OWNER,
            };
            self.inner.create_link(&winner).await?;

            self.inner.create_link(values).await
        }

        async fn find_single_link_by_code(&self, code: &str) -> storage::Result<Option<Link>> {
            self.inner.find_single_link_by_code(code).await
        }

        async fn find_all_links_by_owner(&self, owner_id: OwnerId) -> storage::Result<Vec<Link>> {
            self.inner.find_all_links_by_owner(owner_id).await
        }

        async fn delete_links(&self, codes: &[String], owner_id: OwnerId) -> storage::Result<u64> {
            self.inner.delete_links(codes, owner_id).await
        }

        async fn ping(&self) -> storage::Result<()> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn test_create_lost_race_same_url() {
        let registry = registry_with(Arc::new(RacingStorage {
            inner: Memory::new(),
            winner_url: "https://ya.ru",
        }));

        let created = registry.create("https://ya.ru", OWNER).await.unwrap();
        assert_eq!(created.code, codes::generate("https://ya.ru"));
        assert!(created.already_existed);
    }

    #[tokio::test]
    async fn test_create_lost_race_other_url() {
        let registry = registry_with(Arc::new(RacingStorage {
            inner: Memory::new(),
            winner_url: "https://www.example.com/",
        }));

        assert!(matches!(
            registry.create("https://ya.ru", OWNER).await,
            Err(Error::Collision)
        ));
    }

    /// Create the same URL from many tasks at once
    async fn create_concurrently(registry: &LinkRegistry, tasks: u64) -> Vec<Created> {
        let mut set = tokio::task::JoinSet::new();

        for owner in 0..tasks {
            let registry = registry.clone();
            set.spawn(async move {
                registry
                    .create("https://ya.ru", OwnerId::new(owner))
                    .await
                    .unwrap()
            });
        }

        set.join_all().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_memory() {
        let (registry, memory) = registry();

        let created = create_concurrently(&registry, 16).await;

        assert!(created.iter().all(|created| created.code == "OTExOTk3"));
        assert_eq!(
            created
                .iter()
                .filter(|created| !created.already_existed)
                .count(),
            1
        );

        let owner_id = memory
            .find_single_link_by_code("OTExOTk3")
            .await
            .unwrap()
            .unwrap()
            .owner_id;
        assert_eq!(memory.find_all_links_by_owner(owner_id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.log");
        let registry = registry_with(Arc::new(FlatFile::open(&path).await.unwrap()));

        let created = create_concurrently(&registry, 16).await;

        assert_eq!(
            created
                .iter()
                .filter(|created| !created.already_existed)
                .count(),
            1
        );

        let reopened = FlatFile::open(&path).await.unwrap();
        let link = reopened
            .find_single_link_by_code("OTExOTk3")
            .await
            .unwrap()
            .unwrap();

        // a single whole line, the losers never reached the log
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("OTExOTk3|https://ya.ru|{}\n", link.owner_id));
    }

    #[tokio::test]
    async fn test_ping_memory_is_unavailable() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.ping().await,
            Err(Error::Storage(storage::Error::Unavailable))
        ));
    }
}
