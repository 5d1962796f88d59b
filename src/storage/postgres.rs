//! Postgres storage

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use crate::links::Link;
use crate::links::OwnerId;

use super::CreateLinkValues;
use super::Error;
use super::Result;
use super::Storage;
use super::connection_error;

/// Migrator to create the schema on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// Postgres storage
#[derive(Clone, Debug)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,

    /// Deadline for a single statement
    timeout: Duration,
}

impl Postgres {
    /// Create Postgres storage
    ///
    /// Migrations will be run
    ///
    /// # Errors
    ///
    /// Will return `Err` when the database can not be reached or migrated
    pub async fn new(database_connection_string: &str, timeout: Duration) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_connection_string)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool, timeout).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    async fn new_with_pool(connection_pool: PgPool, timeout: Duration) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(|err| Error::Connection(format!("Migrations could not run: {err}")))?;

        Ok(Self {
            connection_pool,
            timeout,
        })
    }

    /// Run a statement within the deadline
    ///
    /// When the deadline passes the statement future is dropped, which aborts it
    async fn within_deadline<F, T>(&self, statement: F) -> Result<T>
    where
        F: Future<Output = sqlx::Result<T>> + Send,
    {
        tokio::time::timeout(self.timeout, statement)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(connection_error)
    }
}

/// Postgres version of a link
#[derive(sqlx::FromRow)]
struct PostgresLink {
    /// Code
    short_url: String,

    /// Original URL
    original_url: String,

    /// Owner, decimal
    user_id: String,

    /// Tombstone flag
    deleted: bool,
}

impl Link {
    /// Create link from postgres version
    fn from_postgres_link(link: PostgresLink) -> Result<Self> {
        let owner_id = link
            .user_id
            .parse::<OwnerId>()
            .map_err(|err| Error::InvalidRecord(format!("user_id {}: {err}", link.user_id)))?;

        Ok(Self {
            code: link.short_url,
            url: link.original_url,
            owner_id,
            deleted: link.deleted,
        })
    }
}

#[async_trait]
impl Storage for Postgres {
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        let link = self
            .within_deadline(
                sqlx::query_as::<_, PostgresLink>(
                    r"
                    INSERT INTO links (short_url, original_url, user_id)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (short_url) DO NOTHING
                    RETURNING short_url, original_url, user_id, deleted
                    ",
                )
                .bind(values.code)
                .bind(values.url)
                .bind(values.owner_id.to_string())
                .fetch_optional(&self.connection_pool),
            )
            .await?;

        // no row means the primary key was already taken
        link.map_or(Err(Error::Conflict), Link::from_postgres_link)
    }

    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>> {
        let link = self
            .within_deadline(
                sqlx::query_as::<_, PostgresLink>(
                    r"
                    SELECT short_url, original_url, user_id, deleted
                    FROM links
                    WHERE short_url = $1
                    ",
                )
                .bind(code)
                .fetch_optional(&self.connection_pool),
            )
            .await?;

        link.map(Link::from_postgres_link).transpose()
    }

    async fn find_all_links_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Link>> {
        let links = self
            .within_deadline(
                sqlx::query_as::<_, PostgresLink>(
                    r"
                    SELECT short_url, original_url, user_id, deleted
                    FROM links
                    WHERE user_id = $1
                        AND deleted = FALSE
                    ",
                )
                .bind(owner_id.to_string())
                .fetch_all(&self.connection_pool),
            )
            .await?;

        links.into_iter().map(Link::from_postgres_link).collect()
    }

    async fn delete_links(&self, codes: &[String], owner_id: OwnerId) -> Result<u64> {
        let result = self
            .within_deadline(
                sqlx::query(
                    r"
                    UPDATE links
                    SET deleted = TRUE
                    WHERE short_url = ANY($1)
                        AND user_id = $2
                        AND deleted = FALSE
                    ",
                )
                .bind(codes)
                .bind(owner_id.to_string())
                .execute(&self.connection_pool),
            )
            .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        self.within_deadline(sqlx::query("SELECT 1").execute(&self.connection_pool))
            .await?;

        Ok(())
    }
}
