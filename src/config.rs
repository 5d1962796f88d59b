//! Configuration from command line flags, with environment variables as fallback

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::deletion::DEFAULT_WORKERS;
use crate::storage;

const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_COOKIE_NAME: &str = "ShortenerCookie";

/// Snipper, a URL shortener
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(short = 'a', long, env = "SERVER_ADDRESS", default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Prefix of every short URL handed out
    #[arg(short = 'b', long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Path of the link log, used when no database is configured
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<PathBuf>,

    /// Postgres connection string
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Secret to sign identity cookies with, a temporary one is generated when missing
    #[arg(short = 's', long, env = "SECRET_STRING", hide_env_values = true)]
    pub secret: Option<String>,

    /// Name of the identity cookie
    #[arg(short = 'c', long, env = "COOKIE_NAME", default_value = DEFAULT_COOKIE_NAME)]
    pub cookie_name: String,

    /// Deadline of a single database statement, in milliseconds
    #[arg(long, env = "DATABASE_TIMEOUT_MS", default_value_t = 3000)]
    pub database_timeout_ms: u64,

    /// Number of storage calls the deletion pipeline may run at the same time
    #[arg(long, env = "DELETE_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub delete_workers: usize,
}

impl Config {
    /// Storage to use
    ///
    /// A database wins over a file, memory is the last resort
    pub fn storage(&self) -> storage::Config {
        if let Some(dsn) = non_empty(self.database_dsn.as_deref()) {
            return storage::Config::Postgres {
                dsn: dsn.to_string(),
                timeout: Duration::from_millis(self.database_timeout_ms),
            };
        }

        if let Some(path) = self
            .file_storage_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return storage::Config::File(path.clone());
        }

        storage::Config::Memory
    }

    /// The configured secret, if any
    pub fn secret(&self) -> Option<&str> {
        non_empty(self.secret.as_deref())
    }
}

/// Only keep values that are set and not empty
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("snipper").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_storage_precedence() {
        let config = parse(&["-f", "links.log", "-d", "postgres://localhost/links"]);
        assert!(matches!(config.storage(), storage::Config::Postgres { .. }));

        let config = parse(&["-f", "links.log", "-d", ""]);
        assert!(matches!(config.storage(), storage::Config::File(_)));

        let config = parse(&[]);
        assert!(matches!(config.storage(), storage::Config::Memory));
    }

    #[test]
    fn test_flags() {
        let config = parse(&[
            "-a",
            "localhost:9000",
            "-b",
            "https://sho.rt",
            "-s",
            "verysecret",
            "-c",
            "owner",
            "--delete-workers",
            "3",
        ]);

        assert_eq!(config.address, "localhost:9000");
        assert_eq!(config.base_url, "https://sho.rt");
        assert_eq!(config.secret(), Some("verysecret"));
        assert_eq!(config.cookie_name, "owner");
        assert_eq!(config.delete_workers, 3);
    }

    #[test]
    fn test_empty_secret_is_missing() {
        let config = parse(&["-s", ""]);

        assert_eq!(config.secret(), None);
    }
}
