// self
use crate::obs::{CacheOutcome, FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"helseid_client_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a token-cache hit or miss.
pub fn record_token_cache(outcome: CacheOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("helseid_client_token_cache_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records that a token request was resent with a server-issued DPoP nonce.
pub fn record_nonce_retry() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("helseid_client_dpop_nonce_retry_total").increment(1);
	}
}
