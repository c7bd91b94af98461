use crate::data::{Datetime, Value};
use crate::store::tree::NameMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// The four kinds of stored objects.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
	Host,
	Service,
	Metric,
	Attribute,
}

impl EntityKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Host => "host",
			Self::Service => "service",
			Self::Metric => "metric",
			Self::Attribute => "attribute",
		}
	}
}

impl Display for EntityKind {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Reference to a time-series recorded for a metric: an opaque pair naming
/// the backing store and the identifier within it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRef {
	pub store_type: String,
	pub store_id: String,
}

/// Whether a writer call changed the stored state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateStatus {
	/// The object was created or brought up to date.
	Updated,
	/// The supplied timestamp was not newer than the stored one; nothing
	/// changed. Multiple backends may report the same fact, so this is
	/// informational, not an error.
	Stale,
}

/// Common metadata carried by every stored object.
#[derive(Clone, Debug)]
pub struct Header {
	name: String,
	last_update: Datetime,
	/// Moving average of the gaps between updates, in nanoseconds.
	interval: u64,
	/// Sorted, deduplicated identifiers of the backends that contributed.
	backends: Vec<String>,
}

impl Header {
	pub(crate) fn new(name: &str, last_update: Datetime, backend: Option<&str>) -> Self {
		let mut header = Self {
			name: name.to_owned(),
			last_update,
			interval: 0,
			backends: Vec::new(),
		};
		header.record_backend(backend);
		header
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn last_update(&self) -> Datetime {
		self.last_update
	}

	/// The update-interval EWMA in nanoseconds.
	pub fn interval(&self) -> u64 {
		self.interval
	}

	pub fn backends(&self) -> &[String] {
		&self.backends
	}

	/// Applies the timestamp ordering rules: older and equal timestamps are
	/// stale no-ops; a strictly newer timestamp advances `last_update`,
	/// feeds the interval average and records the reporting backend.
	pub(crate) fn touch(&mut self, ts: Datetime, backend: Option<&str>) -> UpdateStatus {
		match ts.cmp(&self.last_update) {
			Ordering::Less | Ordering::Equal => UpdateStatus::Stale,
			Ordering::Greater => {
				let gap = ts.as_nanos() - self.last_update.as_nanos();
				self.interval = if self.interval == 0 {
					gap
				} else {
					// gain 1/16; signed because the new gap may undershoot
					// the current average
					(self.interval as i64 + (gap as i64 - self.interval as i64) / 16) as u64
				};
				self.last_update = ts;
				self.record_backend(backend);
				UpdateStatus::Updated
			}
		}
	}

	pub(crate) fn record_backend(&mut self, backend: Option<&str>) {
		if let Some(backend) = backend {
			if let Err(pos) = self.backends.binary_search_by(|b| b.as_str().cmp(backend)) {
				self.backends.insert(pos, backend.to_owned());
			}
		}
	}
}

/// A monitored host; the only root object type.
#[derive(Clone, Debug)]
pub struct Host {
	pub(crate) header: Header,
	pub(crate) services: NameMap<Service>,
	pub(crate) metrics: NameMap<Metric>,
	pub(crate) attributes: NameMap<Attribute>,
}

impl Host {
	pub(crate) fn new(name: &str, last_update: Datetime, backend: Option<&str>) -> Self {
		Self {
			header: Header::new(name, last_update, backend),
			services: NameMap::new(),
			metrics: NameMap::new(),
			attributes: NameMap::new(),
		}
	}

	pub fn name(&self) -> &str {
		self.header.name()
	}

	pub fn last_update(&self) -> Datetime {
		self.header.last_update()
	}

	pub fn interval(&self) -> u64 {
		self.header.interval()
	}

	pub fn backends(&self) -> &[String] {
		self.header.backends()
	}

	pub fn service(&self, name: &str) -> Option<&Service> {
		self.services.get(name)
	}

	pub fn metric(&self, name: &str) -> Option<&Metric> {
		self.metrics.get(name)
	}

	pub fn attribute(&self, name: &str) -> Option<&Attribute> {
		self.attributes.get(name)
	}

	pub fn services(&self) -> impl Iterator<Item = &Service> {
		self.services.iter()
	}

	pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
		self.metrics.iter()
	}

	pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
		self.attributes.iter()
	}
}

/// A service running on a host.
#[derive(Clone, Debug)]
pub struct Service {
	pub(crate) header: Header,
	/// Name of the owning host; children never outlive their parent.
	pub(crate) host: String,
	pub(crate) attributes: NameMap<Attribute>,
}

impl Service {
	pub(crate) fn new(host: &str, name: &str, last_update: Datetime, backend: Option<&str>) -> Self {
		Self {
			header: Header::new(name, last_update, backend),
			host: host.to_owned(),
			attributes: NameMap::new(),
		}
	}

	pub fn name(&self) -> &str {
		self.header.name()
	}

	pub fn hostname(&self) -> &str {
		&self.host
	}

	pub fn last_update(&self) -> Datetime {
		self.header.last_update()
	}

	pub fn interval(&self) -> u64 {
		self.header.interval()
	}

	pub fn backends(&self) -> &[String] {
		self.header.backends()
	}

	pub fn attribute(&self, name: &str) -> Option<&Attribute> {
		self.attributes.get(name)
	}

	pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
		self.attributes.iter()
	}
}

/// A metric collected for a host, optionally backed by a time-series store.
#[derive(Clone, Debug)]
pub struct Metric {
	pub(crate) header: Header,
	pub(crate) host: String,
	/// Once set, the handle may be replaced but never cleared.
	pub(crate) timeseries: Option<TimeseriesRef>,
	pub(crate) attributes: NameMap<Attribute>,
}

impl Metric {
	pub(crate) fn new(
		host: &str,
		name: &str,
		timeseries: Option<TimeseriesRef>,
		last_update: Datetime,
		backend: Option<&str>,
	) -> Self {
		Self {
			header: Header::new(name, last_update, backend),
			host: host.to_owned(),
			timeseries,
			attributes: NameMap::new(),
		}
	}

	pub fn name(&self) -> &str {
		self.header.name()
	}

	pub fn hostname(&self) -> &str {
		&self.host
	}

	pub fn last_update(&self) -> Datetime {
		self.header.last_update()
	}

	pub fn interval(&self) -> u64 {
		self.header.interval()
	}

	pub fn backends(&self) -> &[String] {
		self.header.backends()
	}

	pub fn timeseries_handle(&self) -> Option<&TimeseriesRef> {
		self.timeseries.as_ref()
	}

	pub fn attribute(&self, name: &str) -> Option<&Attribute> {
		self.attributes.get(name)
	}

	pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
		self.attributes.iter()
	}
}

/// A named value attached to a host, service or metric.
#[derive(Clone, Debug)]
pub struct Attribute {
	pub(crate) header: Header,
	pub(crate) value: Value,
}

impl Attribute {
	pub(crate) fn new(name: &str, value: Value, last_update: Datetime, backend: Option<&str>) -> Self {
		Self {
			header: Header::new(name, last_update, backend),
			value,
		}
	}

	pub fn name(&self) -> &str {
		self.header.name()
	}

	pub fn last_update(&self) -> Datetime {
		self.header.last_update()
	}

	pub fn interval(&self) -> u64 {
		self.header.interval()
	}

	pub fn backends(&self) -> &[String] {
		self.header.backends()
	}

	pub fn value(&self) -> &Value {
		&self.value
	}
}

/// Borrowed view over any stored object, used by matchers, expressions and
/// the JSON writer.
#[derive(Clone, Copy, Debug)]
pub enum Obj<'a> {
	Host(&'a Host),
	Service(&'a Service),
	Metric(&'a Metric),
	Attribute(&'a Attribute),
}

impl<'a> Obj<'a> {
	pub fn kind(&self) -> EntityKind {
		match self {
			Self::Host(_) => EntityKind::Host,
			Self::Service(_) => EntityKind::Service,
			Self::Metric(_) => EntityKind::Metric,
			Self::Attribute(_) => EntityKind::Attribute,
		}
	}

	pub fn header(&self) -> &'a Header {
		match *self {
			Self::Host(h) => &h.header,
			Self::Service(s) => &s.header,
			Self::Metric(m) => &m.header,
			Self::Attribute(a) => &a.header,
		}
	}

	pub fn name(&self) -> &'a str {
		self.header().name()
	}

	/// The named attribute of this object; attributes have none themselves.
	pub fn attribute(&self, name: &str) -> Option<&'a Attribute> {
		match *self {
			Self::Host(h) => h.attributes.get(name),
			Self::Service(s) => s.attributes.get(name),
			Self::Metric(m) => m.attributes.get(name),
			Self::Attribute(_) => None,
		}
	}

	/// Iterates this object's children of the given kind in name order.
	pub fn children(&self, kind: EntityKind) -> Box<dyn Iterator<Item = Obj<'a>> + 'a> {
		match (*self, kind) {
			(Self::Host(h), EntityKind::Service) => {
				Box::new(h.services.iter().map(Obj::Service))
			}
			(Self::Host(h), EntityKind::Metric) => Box::new(h.metrics.iter().map(Obj::Metric)),
			(Self::Host(h), EntityKind::Attribute) => {
				Box::new(h.attributes.iter().map(Obj::Attribute))
			}
			(Self::Service(s), EntityKind::Attribute) => {
				Box::new(s.attributes.iter().map(Obj::Attribute))
			}
			(Self::Metric(m), EntityKind::Attribute) => {
				Box::new(m.attributes.iter().map(Obj::Attribute))
			}
			_ => Box::new(std::iter::empty()),
		}
	}
}
