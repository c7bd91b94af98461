use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter, Write};

/// Binary arithmetic operators usable inside expressions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Operator {
	Add, // +
	Sub, // -
	Mul, // *
	Div, // /
	Mod, // %
	Concat, // ||
}

impl Display for Operator {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Add => f.write_char('+'),
			Self::Sub => f.write_char('-'),
			Self::Mul => f.write_char('*'),
			Self::Div => f.write_char('/'),
			Self::Mod => f.write_char('%'),
			Self::Concat => f.write_str("||"),
		}
	}
}
