pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod http;
pub mod ops;
pub mod orchestrator;
pub mod routing;
pub mod shape;
pub mod sql;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use gateway::{Clock, FixedClock, Gateway, Policy, SystemClock};
pub use routing::{BackendSelector, LogicalEntity, Store};
