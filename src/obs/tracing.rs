// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span for one client operation; also the place outcomes are recorded from.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("helseid_client.flow", flow = kind.as_str(), stage);

			Self { kind, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self { kind }
		}
	}

	/// Flow kind the span was opened for.
	pub fn kind(&self) -> FlowKind {
		self.kind
	}

	/// Counts `outcome` for this span's flow and, with tracing, logs it inside the span.
	pub fn record(&self, outcome: FlowOutcome) {
		obs::record_flow_outcome(self.kind, outcome);

		#[cfg(feature = "tracing")]
		self.span.in_scope(|| tracing::debug!(outcome = outcome.as_str(), "flow outcome"));
	}

	/// Records success or failure from `result` and hands it back.
	pub fn finish<T>(&self, result: Result<T>) -> Result<T> {
		match &result {
			Ok(_) => self.record(FlowOutcome::Success),
			Err(_e) => {
				self.record(FlowOutcome::Failure);

				#[cfg(feature = "tracing")]
				self.span.in_scope(|| tracing::warn!(error = %_e, "flow failed"));
			},
		}

		result
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}
