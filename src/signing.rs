//! Signing keys pinned to one signature algorithm and key id.
//!
//! [`KeyReference`] is the closed set of key sources the client signs with: freshly generated
//! RSA or elliptic-curve pairs and keys parsed from an existing private JWK. The algorithm family
//! is checked once at construction, so every later signing call can trust the key/algorithm
//! pairing.

pub mod algorithm;
pub mod jwk;
pub mod key;

pub use algorithm::*;
pub use jwk::*;
pub use key::*;
