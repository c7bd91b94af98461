//! The validated query AST handed to the analyzer and executor. Parsing the
//! surface syntax into these shapes happens in the frontend, outside of
//! this crate.

use crate::data::{Datetime, Value};
use crate::expr::Matcher;
use crate::store::EntityKind;
use serde::{Deserialize, Serialize};

/// A top-level client command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Query {
	Fetch(Fetch),
	List(List),
	Lookup(Lookup),
	Store(Store),
	Timeseries(Timeseries),
}

/// FETCH dereferences a single named object and returns its full subtree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fetch {
	pub kind: EntityKind,
	/// Parent host; required for everything but hosts, forbidden for hosts.
	pub hostname: Option<String>,
	pub name: String,
	pub filter: Option<Matcher>,
}

/// LIST scans all objects of a kind and returns shallow records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct List {
	pub kind: EntityKind,
	pub filter: Option<Matcher>,
}

/// LOOKUP scans all objects of a kind and returns full subtrees for those
/// satisfying the matcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lookup {
	pub kind: EntityKind,
	pub matcher: Option<Matcher>,
	pub filter: Option<Matcher>,
}

/// STORE submits one object through the writer API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Store {
	pub kind: EntityKind,
	/// Parent host; required for everything but hosts, forbidden for hosts.
	pub hostname: Option<String>,
	pub name: String,
	/// For attributes: the service or metric the attribute hangs off,
	/// when it is not attached to the host directly.
	pub parent_kind: Option<EntityKind>,
	pub parent: Option<String>,
	/// For metrics: the time-series store type and identifier; both come
	/// together or not at all.
	pub store_type: Option<String>,
	pub store_id: Option<String>,
	/// For attributes: the value to record; NULL otherwise.
	pub value: Value,
	/// Unset means "now".
	pub last_update: Option<Datetime>,
}

impl Store {
	/// A STORE HOST command.
	pub fn host(name: impl Into<String>, last_update: Option<Datetime>) -> Self {
		Self {
			kind: EntityKind::Host,
			hostname: None,
			name: name.into(),
			parent_kind: None,
			parent: None,
			store_type: None,
			store_id: None,
			value: Value::Null,
			last_update,
		}
	}

	/// A STORE SERVICE command.
	pub fn service(
		hostname: impl Into<String>,
		name: impl Into<String>,
		last_update: Option<Datetime>,
	) -> Self {
		Self {
			kind: EntityKind::Service,
			hostname: Some(hostname.into()),
			..Self::host(name, last_update)
		}
	}

	/// A STORE METRIC command.
	pub fn metric(
		hostname: impl Into<String>,
		name: impl Into<String>,
		last_update: Option<Datetime>,
	) -> Self {
		Self {
			kind: EntityKind::Metric,
			hostname: Some(hostname.into()),
			..Self::host(name, last_update)
		}
	}

	/// A STORE ATTRIBUTE command targeting the host itself.
	pub fn attribute(
		hostname: impl Into<String>,
		name: impl Into<String>,
		value: Value,
		last_update: Option<Datetime>,
	) -> Self {
		Self {
			kind: EntityKind::Attribute,
			hostname: Some(hostname.into()),
			value,
			..Self::host(name, last_update)
		}
	}
}

/// TIMESERIES asks the backend recorded for a metric for a window of data
/// points.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Timeseries {
	pub hostname: String,
	pub metric: String,
	pub start: Datetime,
	pub end: Datetime,
}
