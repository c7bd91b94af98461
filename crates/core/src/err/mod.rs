use thiserror::Error;

/// Errors surfaced by the store and the query subsystem.
///
/// Stale writer updates are not errors; writers report them through
/// [`crate::store::UpdateStatus`] and callers log them at most.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The caller violated the API contract (missing parent, invalid
	/// arguments).
	#[error("{0}")]
	Argument(String),
	/// FETCH or TIMESERIES referenced a path that is not in the store.
	#[error("{0}")]
	NotFound(String),
	/// The analyzer rejected the query; the message is reported to the
	/// client verbatim.
	#[error("{0}")]
	Type(String),
	/// Runtime expression evaluation failed (the analyzer should prevent
	/// type mismatches; arithmetic faults remain possible).
	#[error("Invalid operation {0}")]
	Eval(String),
	/// A regular expression could not be compiled.
	#[error("Failed to compile regular expression: {0}")]
	Regex(#[from] regex::Error),
	/// A value could not be parsed into the requested type.
	#[error("Failed to parse '{input}' as {kind}")]
	Parse {
		input: String,
		kind: String,
	},
	/// Invariant violation; the operation is aborted but the store keeps
	/// serving.
	#[error("Internal error: {0}")]
	Internal(String),
}

impl Error {
	/// Whether this error came out of the static query analyzer.
	pub fn is_type_error(&self) -> bool {
		matches!(self, Self::Type(_))
	}
}
