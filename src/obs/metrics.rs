// self
use crate::{obs::ResolutionOutcome, resolver::ResolutionMode};

/// Records a resolution outcome via the global metrics recorder (when enabled).
pub fn record_resolution_outcome(mode: ResolutionMode, outcome: ResolutionOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"azure_v2_identity_resolution_total",
			"mode" => mode.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (mode, outcome);
	}
}
