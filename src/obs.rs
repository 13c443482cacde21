//! Observability for identity resolution.
//!
//! Diagnostics flow through an injected [`ResolutionSink`] instead of a process-wide
//! logger, so hosts and tests decide where failure lines end up. [`TracingSink`] is the
//! default.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `azure_v2_identity.resolve` with the `mode` and
//!   `stage` fields, and to let [`TracingSink`] forward diagnostics as events.
//! - Enable `metrics` to increment the `azure_v2_identity_resolution_total` counter for every
//!   attempt/success/failure, labeled by `mode` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, auth::ResolvedIdentity, resolver::ResolutionMode};

/// Outcome labels recorded for each resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionOutcome {
	/// Entry to the resolver.
	Attempt,
	/// Identity resolved.
	Success,
	/// Failure (or empty identity) handed back to the caller.
	Failure,
}
impl ResolutionOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ResolutionOutcome::Attempt => "attempt",
			ResolutionOutcome::Success => "success",
			ResolutionOutcome::Failure => "failure",
		}
	}
}
impl Display for ResolutionOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Single-line diagnostics emitted on resolution failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
	/// No source in the fallback chain produced an email.
	EmailUnresolved,
	/// Remote lookup (profile or signing keys) failed or did not finish.
	RequestFailed {
		/// Rendered error.
		error: String,
	},
	/// Token was rejected before any identity could be read.
	Rejected {
		/// Stable error label (see [`Error::label`]).
		reason: &'static str,
		/// Rendered error.
		error: String,
	},
	/// Resolver built without signature verification.
	VerificationDisabled,
}
impl Diagnostic {
	/// Builds the diagnostic that matches `err`.
	pub fn from_error(err: &Error) -> Self {
		match err {
			Error::UnresolvedIdentity => Self::EmailUnresolved,
			Error::Transport(_) | Error::Profile(_) | Error::Timeout | Error::Cancelled =>
				Self::RequestFailed { error: err.to_string() },
			_ => Self::Rejected { reason: err.label(), error: err.to_string() },
		}
	}
}
impl Display for Diagnostic {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::EmailUnresolved => f.write_str("failed to get email address"),
			Self::RequestFailed { error } => write!(f, "failed making request {error}"),
			Self::Rejected { reason, error } =>
				write!(f, "access token rejected ({reason}): {error}"),
			Self::VerificationDisabled => f.write_str(
				"signature verification is disabled; any well-formed token will be trusted",
			),
		}
	}
}

/// Injected structured-logging capability used by the resolver.
pub trait ResolutionSink
where
	Self: Send + Sync,
{
	/// Receives a failure diagnostic.
	fn diagnostic(&self, mode: ResolutionMode, diagnostic: &Diagnostic);

	/// Receives a successful resolution. The default implementation does nothing.
	fn resolved(&self, _mode: ResolutionMode, _identity: &ResolvedIdentity) {}
}

/// Sink forwarding diagnostics to `tracing` (no-op without the `tracing` feature).
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;
impl ResolutionSink for TracingSink {
	fn diagnostic(&self, mode: ResolutionMode, diagnostic: &Diagnostic) {
		#[cfg(feature = "tracing")]
		{
			::tracing::warn!(target: "azure_v2_identity", mode = mode.as_str(), "{diagnostic}");
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (mode, diagnostic);
		}
	}

	fn resolved(&self, mode: ResolutionMode, identity: &ResolvedIdentity) {
		#[cfg(feature = "tracing")]
		{
			::tracing::debug!(
				target: "azure_v2_identity",
				mode = mode.as_str(),
				has_user_id = identity.user_id.is_some(),
				"identity resolved"
			);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (mode, identity);
		}
	}
}

/// Sink that keeps diagnostics in memory, for audit hooks and tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySink(Arc<Mutex<Vec<(ResolutionMode, Diagnostic)>>>);
impl MemorySink {
	/// Snapshot of recorded diagnostics in arrival order.
	pub fn diagnostics(&self) -> Vec<(ResolutionMode, Diagnostic)> {
		self.0.lock().clone()
	}

	/// Rendered diagnostic lines in arrival order.
	pub fn lines(&self) -> Vec<String> {
		self.0.lock().iter().map(|(_, diagnostic)| diagnostic.to_string()).collect()
	}
}
impl ResolutionSink for MemorySink {
	fn diagnostic(&self, mode: ResolutionMode, diagnostic: &Diagnostic) {
		self.0.lock().push((mode, diagnostic.clone()));
	}
}
