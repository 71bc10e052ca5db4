// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapper used around token and data operations.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with the flow kind, call site, and scope name.
	pub fn new(kind: FlowKind, stage: &'static str, scope: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("rte_client.flow", flow = kind.as_str(), stage, scope);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, scope);

			Self {}
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

	/// Emits a debug event inside the span; never pass secrets here.
	pub fn note(&self, message: &'static str) {
		#[cfg(feature = "tracing")]
		{
			self.span.in_scope(|| tracing::debug!("{message}"));
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = message;
		}
	}
}
