//! Optional observability helpers for HelseID calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `helseid_client.flow` with the `flow`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment `helseid_client_flow_total` for every attempt/success/failure
//!   labeled by `flow` + `outcome`, `helseid_client_token_cache_total` labeled by `outcome`, and
//!   `helseid_client_dpop_nonce_retry_total`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Engine-level client-credentials token acquisition.
	ClientCredentials,
	/// A single token-endpoint exchange, nonce retry included.
	TokenEndpoint,
	/// Discovery document resolution.
	Discovery,
	/// Self-service client-secret rotation.
	ClientSecretRotation,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::TokenEndpoint => "token_endpoint",
			FlowKind::Discovery => "discovery",
			FlowKind::ClientSecretRotation => "client_secret_rotation",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a client operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure returned to the caller, as an error or as an OAuth error value.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of a token-cache lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// A live entry was returned.
	Hit,
	/// Nothing usable was cached.
	Miss,
}
impl CacheOutcome {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Hit => "hit",
			CacheOutcome::Miss => "miss",
		}
	}
}
