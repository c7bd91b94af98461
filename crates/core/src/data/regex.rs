use crate::err::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A compiled regular expression. The compiled state is owned by the value;
/// equality, ordering and serialization all go through the source pattern.
#[derive(Clone)]
pub struct Regex(pub(super) regex::Regex);

impl Regex {
	/// The source pattern this regex was compiled from.
	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}

	pub fn is_match(&self, haystack: &str) -> bool {
		self.0.is_match(haystack)
	}
}

impl TryFrom<&str> for Regex {
	type Error = Error;
	fn try_from(pattern: &str) -> Result<Self, Self::Error> {
		Ok(Self(regex::Regex::new(pattern)?))
	}
}

impl FromStr for Regex {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::try_from(s)
	}
}

impl PartialEq for Regex {
	fn eq(&self, other: &Self) -> bool {
		self.as_str() == other.as_str()
	}
}

impl Eq for Regex {}

impl PartialOrd for Regex {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Regex {
	fn cmp(&self, other: &Self) -> Ordering {
		self.as_str().cmp(other.as_str())
	}
}

impl Hash for Regex {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.as_str().hash(state);
	}
}

impl Debug for Regex {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		Display::fmt(self, f)
	}
}

impl Display for Regex {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "/{}/", self.as_str())
	}
}

impl Serialize for Regex {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Regex {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let source = String::deserialize(deserializer)?;
		source.parse().map_err(serde::de::Error::custom)
	}
}
