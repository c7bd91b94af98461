use std::collections::BTreeMap;
use unicase::UniCase;

/// Name-ordered container used for every child set in the store tree.
///
/// Keys compare case-insensitively, so `web1` and `WEB1` are the same entry;
/// the name's original spelling is preserved by the stored object itself.
/// There is no removal: the store grows monotonically in its key set.
#[derive(Clone, Debug)]
pub struct NameMap<T>(BTreeMap<UniCase<String>, T>);

impl<T> Default for NameMap<T> {
	fn default() -> Self {
		Self(BTreeMap::new())
	}
}

impl<T> NameMap<T> {
	pub fn new() -> Self {
		Self(BTreeMap::new())
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	pub fn get(&self, name: &str) -> Option<&T> {
		self.0.get(&UniCase::new(name.to_owned()))
	}

	pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
		self.0.get_mut(&UniCase::new(name.to_owned()))
	}

	/// Insert-or-get: returns the existing entry for `name` or inserts the
	/// one built by `init`.
	pub fn entry_or_insert_with(&mut self, name: &str, init: impl FnOnce() -> T) -> &mut T {
		self.0.entry(UniCase::new(name.to_owned())).or_insert_with(init)
	}

	/// Iterates the values in case-insensitive name order.
	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.0.values()
	}
}
