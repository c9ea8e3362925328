//! Built-in connectors: filesystem, HTTP, and read-only SQL.
//!
//! Each connector owns its own safety layer — path confinement, SSRF
//! blocking, read-only SQL verification — independent of the policy engine.
//! The harness enforces the caller-facing allow/deny decision; connectors
//! enforce the backend-facing one.

pub mod fs;
pub mod http;
pub mod sql;

pub use fs::FsConnector;
pub use http::HttpConnector;
pub use sql::SqlConnector;
