use crate::err::Error;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

/// Raw binary data. The textual form is a sequence of `\xNN` hex pairs,
/// one per byte, which survives a format/parse round-trip.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.0
	}
}

impl From<Vec<u8>> for Bytes {
	fn from(v: Vec<u8>) -> Self {
		Self(v)
	}
}

impl From<&[u8]> for Bytes {
	fn from(v: &[u8]) -> Self {
		Self(v.to_vec())
	}
}

impl Deref for Bytes {
	type Target = Vec<u8>;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl FromStr for Bytes {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let err = || Error::Parse {
			input: s.to_owned(),
			kind: "BINARY".to_owned(),
		};
		let mut out = Vec::with_capacity(s.len() / 4);
		let mut rest = s;
		while !rest.is_empty() {
			let hex = rest.strip_prefix("\\x").ok_or_else(err)?;
			let pair = hex.get(..2).ok_or_else(err)?;
			out.push(u8::from_str_radix(pair, 16).map_err(|_| err())?);
			rest = &hex[2..];
		}
		Ok(Self(out))
	}
}

impl Display for Bytes {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		for byte in &self.0 {
			write!(f, "\\x{byte:02x}")?;
		}
		Ok(())
	}
}
