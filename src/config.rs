use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    /// Jira Cloud account email. Without it the token is sent as a bearer token.
    pub user: Option<String>,
    pub token: String,
    pub timeout: Duration,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jira: JiraConfig,
    pub database_path: PathBuf,
    pub blob_root: PathBuf,
    pub bind_addr: String,
    pub import_concurrency: usize,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("JIRA_URL")
            .or_else(|| lookup("JIRA_BASE_URL"))
            .ok_or(ConfigError::Missing("JIRA_URL"))?
            .trim_end_matches('/')
            .to_string();
        let token = lookup("JIRA_TOKEN").ok_or(ConfigError::Missing("JIRA_TOKEN"))?;
        let user = lookup("JIRA_USER").filter(|user| !user.is_empty());

        let jira = JiraConfig {
            base_url,
            user,
            token,
            timeout: Duration::from_secs(positive(&lookup, "JIRA_TIMEOUT_SECS", 30)?),
            page_size: positive(&lookup, "JIRA_PAGE_SIZE", 100)?,
        };

        Ok(Config {
            jira,
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage/jira_importer.db")),
            blob_root: lookup("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage/blobs")),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            import_concurrency: positive(&lookup, "IMPORT_CONCURRENCY", 4)?,
            request_timeout: Duration::from_secs(positive(&lookup, "REQUEST_TIMEOUT_SECS", 300)?),
        })
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}
