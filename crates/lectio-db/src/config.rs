use std::env;

/// Database configuration.
///
/// Reads from the `LECTIO_DATABASE_URL` environment variable, falling back to
/// `postgresql://localhost:5432/lectio` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/lectio";

    /// Environment variable consulted by [`DbConfig::from_env`].
    pub const ENV_VAR: &str = "LECTIO_DATABASE_URL";

    /// Build a config from the environment.
    pub fn from_env() -> Self {
        let database_url =
            env::var(Self::ENV_VAR).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Extract the database name from the URL.
    ///
    /// Returns `None` if the URL has no path component.
    pub fn database_name(&self) -> Option<&str> {
        self.database_url
            .rsplit('/')
            .next()
            .map(|s| s.split('?').next().unwrap_or(s))
            .filter(|s| !s.is_empty() && !s.contains(':'))
    }

    /// The same server's `postgres` database, keeping any connection
    /// parameters. `CREATE DATABASE` is issued from there.
    pub fn maintenance_url(&self) -> String {
        let (base, params) = match self.database_url.split_once('?') {
            Some((base, params)) => (base, Some(params)),
            None => (self.database_url.as_str(), None),
        };
        let Some(pos) = base.rfind('/') else {
            return self.database_url.clone();
        };
        let mut url = format!("{}/postgres", &base[..pos]);
        if let Some(params) = params {
            url.push('?');
            url.push_str(params);
        }
        url
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
