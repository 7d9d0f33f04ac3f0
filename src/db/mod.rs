mod connector;
pub mod mysql;
pub mod oracle;
pub mod postgres;
mod row;

#[cfg(test)]
pub mod memory;

pub use connector::{Connector, Session};
pub use row::Row;
