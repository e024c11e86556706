//! Outbound HTTP plumbing shared by provider adapters and collaborators.

pub mod http;

pub use http::HttpTransport;
