//! High-level orchestrators: the client-credentials engine and the self-service secret rotation
//! layered on top of it.

pub mod client_credentials;
pub mod client_secret;

pub use client_credentials::*;
pub use client_secret::*;
