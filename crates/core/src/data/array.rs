use crate::data::kind::Kind;
use crate::data::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

/// A uniformly-typed collection of scalar values.
///
/// All elements carry the same tag; arrays never contain arrays. The
/// constructors used by parsers and the store uphold this, it is not
/// re-checked on every access.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Array(pub Vec<Value>);

impl Array {
	/// The element tag, when it is statically known. Empty arrays carry no
	/// tag and evaluate as unknown.
	pub fn elem_kind(&self) -> Option<Kind> {
		self.0.first().and_then(Value::kind)
	}

	/// Membership test using typed equality; an element of a different tag
	/// never matches.
	pub fn contains(&self, value: &Value) -> bool {
		self.0.iter().any(|elem| elem.equal(value) == Some(true))
	}
}

impl From<Vec<Value>> for Array {
	fn from(v: Vec<Value>) -> Self {
		Self(v)
	}
}

impl FromIterator<Value> for Array {
	fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl IntoIterator for Array {
	type Item = Value;
	type IntoIter = std::vec::IntoIter<Self::Item>;
	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

impl Deref for Array {
	type Target = Vec<Value>;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl Display for Array {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.write_str("[")?;
		for (i, elem) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			Display::fmt(elem, f)?;
		}
		f.write_str("]")
	}
}
