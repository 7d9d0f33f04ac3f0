//! Gateway configuration file.
//!
//! ```toml
//! [server]
//! port = 5000
//!
//! [[backends]]
//! name = "postgresql"
//! store = "library"
//! dialect = "postgres"
//! [backends.driver]
//! type = "postgres"
//! host = "localhost"
//! database = "bibliotheque"
//! username = "unigate"
//!
//! [[backends]]
//! name = "oracle"
//! store = "enrollment"
//! dialect = "oracle"
//! [backends.driver]
//! type = "oracle"
//! username = "scolarite"
//! connect_string = "//localhost:1521/XEPDB1"
//!
//! [policy]
//! loan_period_days = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::mysql::{MySqlConfig, MySqlConnector};
#[cfg(feature = "oracle")]
use crate::db::oracle::OracleConnector;
use crate::db::oracle::OracleConfig;
use crate::db::postgres::{PostgresConfig, PostgresConnector};
use crate::db::Connector;
use crate::error::{GatewayError, Result};
use crate::gateway::Policy;
use crate::http::HttpServerConfig;
use crate::routing::{BackendSelector, Store};
use crate::sql::Dialect;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub policy: Policy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Name used by the backend-addressed endpoints, e.g. `/query/{name}`.
    pub name: String,
    pub store: Store,
    pub dialect: Dialect,
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriverConfig {
    Postgres(PostgresConfig),
    Mysql(MySqlConfig),
    Oracle(OracleConfig),
}

impl DriverConfig {
    fn name(&self) -> &'static str {
        match self {
            DriverConfig::Postgres(_) => "postgres",
            DriverConfig::Mysql(_) => "mysql",
            DriverConfig::Oracle(_) => "oracle",
        }
    }

    fn speaks(&self, dialect: Dialect) -> bool {
        matches!(
            (self, dialect),
            (DriverConfig::Postgres(_), Dialect::Postgres)
                | (DriverConfig::Mysql(_), Dialect::MySql)
                | (DriverConfig::Oracle(_), Dialect::Oracle)
        )
    }

    fn password_mut(&mut self) -> &mut String {
        match self {
            DriverConfig::Postgres(pg) => &mut pg.password,
            DriverConfig::Mysql(my) => &mut my.password,
            DriverConfig::Oracle(ora) => &mut ora.password,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("unigate")
            .join("unigate.toml")
    }

    /// Read, fill passwords from the environment and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::parse(&content)?;
        config.apply_password_env(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(path = %path.display(), backends = config.backends.len(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// `UNIGATE_<NAME>_PASSWORD` for every backend whose password is empty.
    pub fn apply_password_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for backend in &mut self.backends {
            let key = password_env_key(&backend.name);
            let password = backend.driver.password_mut();
            if password.is_empty() {
                if let Some(value) = lookup(&key) {
                    *password = value;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(GatewayError::Config("no backends configured".into()));
        }
        for backend in &self.backends {
            if !backend.driver.speaks(backend.dialect) {
                return Err(GatewayError::Config(format!(
                    "backend '{}': driver '{}' cannot speak the {} dialect",
                    backend.name,
                    backend.driver.name(),
                    backend.dialect
                )));
            }
        }
        if self.policy.probe_limit == 0 || self.policy.search_limit == 0 {
            return Err(GatewayError::Config("row limits must be at least 1".into()));
        }
        Ok(())
    }

    /// Connect a pool per backend. Pools open connections lazily.
    ///
    /// Without the `oracle` feature, Oracle backends are skipped with a
    /// warning and their store stays unrouted.
    pub fn build_selector(&self) -> Result<BackendSelector> {
        let mut builder = BackendSelector::builder();
        for backend in &self.backends {
            let connector: Arc<dyn Connector> = match &backend.driver {
                DriverConfig::Postgres(pg) => {
                    info!(
                        backend = %backend.name,
                        target = %pg.display_string(),
                        "postgres pool configured"
                    );
                    Arc::new(PostgresConnector::new(pg)?)
                }
                DriverConfig::Mysql(my) => {
                    info!(backend = %backend.name, "mysql pool configured");
                    Arc::new(MySqlConnector::new(my)?)
                }
                #[cfg(feature = "oracle")]
                DriverConfig::Oracle(ora) => {
                    info!(
                        backend = %backend.name,
                        target = %ora.display_string(),
                        "oracle connector configured"
                    );
                    Arc::new(OracleConnector::new(ora)?)
                }
                #[cfg(not(feature = "oracle"))]
                DriverConfig::Oracle(ora) => {
                    tracing::warn!(
                        backend = %backend.name,
                        target = %ora.display_string(),
                        "built without the oracle feature; backend skipped"
                    );
                    continue;
                }
            };
            builder = builder.register(
                backend.name.clone(),
                backend.store,
                backend.dialect,
                connector,
            );
        }
        builder.build()
    }

    /// Stores without a configured backend.
    pub fn missing_stores(&self) -> Vec<Store> {
        Store::ALL
            .into_iter()
            .filter(|store| !self.backends.iter().any(|b| b.store == *store))
            .collect()
    }
}

fn password_env_key(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("UNIGATE_{}_PASSWORD", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::LogicalEntity;

    const SAMPLE: &str = r#"
[server]
port = 8080
cors_origins = ["http://localhost:5173"]

[[backends]]
name = "mysql"
store = "grading"
dialect = "mysql"
[backends.driver]
type = "mysql"
url = "mysql://unigate@localhost:3306/notes"

[[backends]]
name = "postgresql"
store = "library"
dialect = "postgresql"
[backends.driver]
type = "postgres"
host = "localhost"
database = "bibliotheque"
username = "unigate"
ssl_mode = "disable"

[policy]
loan_period_days = 14
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].dialect, Dialect::Postgres);
        match &config.backends[1].driver {
            DriverConfig::Postgres(pg) => {
                assert_eq!(pg.port, 5432);
                assert_eq!(pg.pool_size, 8);
            }
            other => panic!("unexpected driver {:?}", other),
        }
        assert_eq!(config.policy.loan_period_days, 14);
        assert_eq!(config.policy.required_credits, 180);
        assert!(config.validate().is_ok());
        assert_eq!(config.missing_stores(), vec![Store::Enrollment]);
    }

    #[test]
    fn test_password_from_env() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.apply_password_env(|key| match key {
            "UNIGATE_POSTGRESQL_PASSWORD" => Some("s3cret".to_string()),
            _ => None,
        });
        match &config.backends[1].driver {
            DriverConfig::Postgres(pg) => assert_eq!(pg.password, "s3cret"),
            other => panic!("unexpected driver {:?}", other),
        }
        match &config.backends[0].driver {
            DriverConfig::Mysql(my) => assert!(my.password.is_empty()),
            other => panic!("unexpected driver {:?}", other),
        }
    }

    #[test]
    fn test_env_key_normalisation() {
        assert_eq!(password_env_key("pg-main"), "UNIGATE_PG_MAIN_PASSWORD");
    }

    #[test]
    fn test_driver_dialect_mismatch() {
        let content = SAMPLE.replace("dialect = \"mysql\"", "dialect = \"postgres\"");
        let err = Config::parse(&content).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("cannot speak"));
    }

    const ORACLE_BACKEND: &str = r#"
[[backends]]
name = "oracle"
store = "enrollment"
dialect = "oracle"
[backends.driver]
type = "oracle"
username = "scolarite"
connect_string = "//localhost:1521/XEPDB1"
"#;

    #[test]
    fn test_oracle_backend() {
        let mut config = Config::parse(&format!("{}\n{}", SAMPLE, ORACLE_BACKEND)).unwrap();
        config.validate().unwrap();
        assert!(config.missing_stores().is_empty());
        config.apply_password_env(|key| {
            (key == "UNIGATE_ORACLE_PASSWORD").then(|| "ora".to_string())
        });
        match &config.backends[2].driver {
            DriverConfig::Oracle(ora) => {
                assert_eq!(ora.password, "ora");
                assert_eq!(ora.display_string(), "scolarite@//localhost:1521/XEPDB1");
            }
            other => panic!("unexpected driver {:?}", other),
        }
    }

    #[test]
    fn test_oracle_driver_needs_oracle_dialect() {
        let content = format!("{}\n{}", SAMPLE, ORACLE_BACKEND)
            .replace("dialect = \"oracle\"", "dialect = \"mysql\"");
        let err = Config::parse(&content).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("cannot speak"));
    }

    #[cfg(not(feature = "oracle"))]
    #[tokio::test]
    async fn test_oracle_backend_skipped_without_feature() {
        let config = Config::parse(&format!("{}\n{}", SAMPLE, ORACLE_BACKEND)).unwrap();
        let selector = config.build_selector().unwrap();
        assert!(selector.resolve(LogicalEntity::Student).is_err());
        assert!(selector.resolve(LogicalEntity::Book).is_ok());
    }

    #[cfg(feature = "oracle")]
    #[tokio::test]
    async fn test_oracle_backend_registered_with_feature() {
        let config = Config::parse(&format!("{}\n{}", SAMPLE, ORACLE_BACKEND)).unwrap();
        let selector = config.build_selector().unwrap();
        assert_eq!(selector.resolve(LogicalEntity::Student).unwrap().name, "oracle");
    }

    #[test]
    fn test_empty_config_is_invalid() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server, HttpServerConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_driver_type() {
        let content = SAMPLE.replace("type = \"mysql\"", "type = \"sqlite\"");
        assert_eq!(Config::parse(&content).unwrap_err().kind(), "config");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/unigate.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[tokio::test]
    async fn test_build_selector_rejects_duplicate_store() {
        let content = SAMPLE.replace("store = \"grading\"", "store = \"library\"");
        let config = Config::parse(&content).unwrap();
        let err = config.build_selector().unwrap_err();
        assert!(err.to_string().contains("store 'library'"));
    }

    #[test]
    fn test_shipped_sample_is_valid() {
        let config = Config::parse(include_str!("../config/unigate.toml")).unwrap();
        config.validate().unwrap();
        assert!(config.missing_stores().is_empty());
        assert_eq!(config.policy, Policy::default());
        assert_eq!(config.server, HttpServerConfig::default());
    }

    #[test]
    fn test_default_path() {
        assert!(Config::default_path().ends_with("unigate/unigate.toml"));
    }
}
