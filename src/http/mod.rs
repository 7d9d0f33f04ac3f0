//! # HTTP API
//!
//! JSON endpoints over the [`Gateway`](crate::gateway::Gateway). Every body
//! carries `status: "success" | "error"`; errors add `message` and the
//! machine-readable `error` kind.
//!
//! # Endpoints
//!
//! - `/health` - Liveness
//! - `/connect`, `/query`, `/student/*`, `/stats/*` - Backend-addressed reads
//! - `/books/*` - Library reads, borrow and return
//! - `/admin/*` - Inserts, sample data and full listings
//! - `/dashboard`, `/graduation` - Cross-store views

pub mod config;
pub mod server;
mod admin_routes;
mod campus_routes;
mod library_routes;
mod response;
mod student_routes;

pub use config::HttpServerConfig;
pub use response::{ErrorResponse, Success};
pub use server::HttpServer;
