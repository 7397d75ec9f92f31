//! Scope sets and secret wrappers shared by the assertion, endpoint, and flow layers.

pub mod scope;
pub mod secret;

pub use scope::*;
pub use secret::*;
