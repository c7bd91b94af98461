use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Static type tag of a [`crate::data::Value`].
///
/// NULL carries no tag; code that needs "NULL or unknown" works with
/// `Option<Kind>`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Kind {
	Integer,
	Decimal,
	String,
	Datetime,
	Binary,
	Regex,
	/// Array over a fixed scalar element type. Arrays never nest.
	Array(Box<Kind>),
}

impl Kind {
	/// Returns the element type for array kinds.
	pub fn elem(&self) -> Option<&Kind> {
		match self {
			Self::Array(elem) => Some(elem),
			_ => None,
		}
	}

	pub fn is_array(&self) -> bool {
		matches!(self, Self::Array(_))
	}

	/// Whether values of this kind take part in arithmetic.
	pub fn is_numeric(&self) -> bool {
		matches!(self, Self::Integer | Self::Decimal)
	}
}

impl Display for Kind {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Integer => f.write_str("INTEGER"),
			Self::Decimal => f.write_str("DECIMAL"),
			Self::String => f.write_str("STRING"),
			Self::Datetime => f.write_str("DATETIME"),
			Self::Binary => f.write_str("BINARY"),
			Self::Regex => f.write_str("REGEX"),
			Self::Array(elem) => write!(f, "[{elem}]"),
		}
	}
}
