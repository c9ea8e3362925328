//! Thin transports over a [`gateway_core::Harness`]: a framed stdio loop and
//! an HTTP façade. Neither transport carries business logic — every
//! decision is made by the harness they wrap.

pub mod http_facade;
pub mod stdio;

pub use http_facade::serve_http;
pub use stdio::serve_stdio;
