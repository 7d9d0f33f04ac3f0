//! Entity → backend routing.
//!
//! Each logical entity lives in exactly one store, and each store is served
//! by exactly one configured backend. The selector is built once and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::Connector;
use crate::error::{GatewayError, Result};
use crate::sql::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalEntity {
    Student,
    Grade,
    Book,
    Loan,
    Payment,
}

impl LogicalEntity {
    pub fn name(self) -> &'static str {
        match self {
            LogicalEntity::Student => "student",
            LogicalEntity::Grade => "grade",
            LogicalEntity::Book => "book",
            LogicalEntity::Loan => "loan",
            LogicalEntity::Payment => "payment",
        }
    }

    /// The store that owns this entity's data.
    pub fn home(self) -> Store {
        match self {
            LogicalEntity::Student | LogicalEntity::Payment => Store::Enrollment,
            LogicalEntity::Grade => Store::Grading,
            LogicalEntity::Book | LogicalEntity::Loan => Store::Library,
        }
    }
}

impl fmt::Display for LogicalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for LogicalEntity {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "student" => Ok(LogicalEntity::Student),
            "grade" => Ok(LogicalEntity::Grade),
            "book" => Ok(LogicalEntity::Book),
            "loan" => Ok(LogicalEntity::Loan),
            "payment" => Ok(LogicalEntity::Payment),
            other => Err(GatewayError::UnknownEntity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Enrollment,
    Grading,
    Library,
}

impl Store {
    pub const ALL: [Store; 3] = [Store::Enrollment, Store::Grading, Store::Library];

    pub fn name(self) -> &'static str {
        match self {
            Store::Enrollment => "enrollment",
            Store::Grading => "grading",
            Store::Library => "library",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A configured backend: its public name, the store it serves, the dialect
/// it speaks and the connector that reaches it.
#[derive(Clone)]
pub struct BackendHandle {
    pub name: String,
    pub store: Store,
    pub dialect: Dialect,
    pub connector: Arc<dyn Connector>,
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("dialect", &self.dialect)
            .field("driver", &self.connector.driver())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BackendSelector {
    backends: Vec<BackendHandle>,
}

impl BackendSelector {
    pub fn builder() -> BackendSelectorBuilder {
        BackendSelectorBuilder::default()
    }

    /// The backend that owns `entity`.
    pub fn resolve(&self, entity: LogicalEntity) -> Result<&BackendHandle> {
        let store = entity.home();
        self.backends
            .iter()
            .find(|b| b.store == store)
            .ok_or_else(|| GatewayError::UnknownEntity(entity.name().to_string()))
    }

    /// Look a backend up by the name used in backend-addressed endpoints.
    pub fn by_name(&self, name: &str) -> Result<&BackendHandle> {
        self.backends
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| GatewayError::UnknownBackend(name.to_string()))
    }

    pub fn backends(&self) -> &[BackendHandle] {
        &self.backends
    }
}

#[derive(Default)]
pub struct BackendSelectorBuilder {
    backends: Vec<BackendHandle>,
}

impl BackendSelectorBuilder {
    pub fn register(
        mut self,
        name: impl Into<String>,
        store: Store,
        dialect: Dialect,
        connector: Arc<dyn Connector>,
    ) -> Self {
        self.backends.push(BackendHandle {
            name: name.into(),
            store,
            dialect,
            connector,
        });
        self
    }

    pub fn build(self) -> Result<BackendSelector> {
        for (i, backend) in self.backends.iter().enumerate() {
            if backend.name.is_empty() {
                return Err(GatewayError::Config("backend name must not be empty".into()));
            }
            for other in &self.backends[..i] {
                if other.name == backend.name {
                    return Err(GatewayError::Config(format!(
                        "backend '{}' is defined twice",
                        backend.name
                    )));
                }
                if other.store == backend.store {
                    return Err(GatewayError::Config(format!(
                        "store '{}' is served by both '{}' and '{}'",
                        backend.store, other.name, backend.name
                    )));
                }
            }
        }
        Ok(BackendSelector {
            backends: self.backends,
        })
    }
}
