//! The in-memory object store: a tree of hosts, their services, metrics and
//! attributes, shared between writer threads (source adapters) and reader
//! threads (query execution).
//!
//! One readers-writer lock guards the whole tree. Writers hold the write
//! lock for the duration of a single writer-API call; readers hold the read
//! lock for the duration of one scan, including result serialization. The
//! last-writer-wins rule is decided by the supplied timestamps, not by
//! arrival order.

pub(crate) mod entity;
pub(crate) mod json;
pub(crate) mod tree;

pub use self::entity::{
	Attribute, EntityKind, Header, Host, Metric, Obj, Service, TimeseriesRef, UpdateStatus,
};
pub use self::json::JsonFormatter;
pub use self::tree::NameMap;

use crate::data::{Datetime, Value};
use crate::err::Error;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;

/// The process-wide store root. Cheap to share by reference; all access goes
/// through [`Store::writer`] / [`Store::writer_for`] and [`Store::reader`].
#[derive(Debug, Default)]
pub struct Store {
	hosts: RwLock<NameMap<Host>>,
}

impl Store {
	pub fn new() -> Self {
		Self::default()
	}

	/// A writer handle without a backend identity, as used by the frontend
	/// STORE command.
	pub fn writer(&self) -> Writer<'_> {
		Writer {
			store: self,
			backend: None,
		}
	}

	/// A writer handle for one source adapter; every update made through it
	/// records `backend` on the objects it touches.
	pub fn writer_for(&self, backend: impl Into<String>) -> Writer<'_> {
		Writer {
			store: self,
			backend: Some(backend.into()),
		}
	}

	/// Acquires the read lock for the duration of one scan. The returned
	/// handle exposes a consistent snapshot: no partial updates are visible
	/// while it is alive.
	pub fn reader(&self) -> Reader<'_> {
		Reader {
			hosts: self.hosts.read(),
		}
	}
}

/// The writer API used by source adapters. All operations share the same
/// return semantics: `Ok(Updated)` when the object was created or brought up
/// to date, `Ok(Stale)` when the supplied timestamp was not newer than the
/// stored one (nothing changed), and `Err` for contract violations such as a
/// missing parent.
#[derive(Clone, Debug)]
pub struct Writer<'a> {
	store: &'a Store,
	backend: Option<String>,
}

impl Writer<'_> {
	fn backend(&self) -> Option<&str> {
		self.backend.as_deref()
	}

	/// A zero timestamp means "now"; adapters without a time source may
	/// leave it unset.
	fn resolve_ts(last_update: Datetime) -> Datetime {
		if last_update.is_zero() {
			Datetime::now()
		} else {
			last_update
		}
	}

	pub fn store_host(&self, name: &str, last_update: Datetime) -> Result<UpdateStatus, Error> {
		let ts = Self::resolve_ts(last_update);
		let mut hosts = self.store.hosts.write();
		match hosts.get_mut(name) {
			Some(host) => {
				let status = host.header.touch(ts, self.backend());
				if status == UpdateStatus::Stale {
					debug!(
						"store: cannot update host '{name}': value too old ({ts} <= {})",
						host.last_update()
					);
				}
				Ok(status)
			}
			None => {
				hosts.entry_or_insert_with(name, || Host::new(name, ts, self.backend()));
				Ok(UpdateStatus::Updated)
			}
		}
	}

	pub fn store_service(
		&self,
		host: &str,
		name: &str,
		last_update: Datetime,
	) -> Result<UpdateStatus, Error> {
		let ts = Self::resolve_ts(last_update);
		let mut hosts = self.store.hosts.write();
		let parent = hosts
			.get_mut(host)
			.ok_or_else(|| missing_parent(EntityKind::Service, name, host))?;
		match parent.services.get_mut(name) {
			Some(service) => {
				let status = service.header.touch(ts, self.backend());
				if status == UpdateStatus::Stale {
					debug!(
						"store: cannot update service '{host}.{name}': value too old ({ts} <= {})",
						service.last_update()
					);
				}
				Ok(status)
			}
			None => {
				parent
					.services
					.entry_or_insert_with(name, || Service::new(host, name, ts, self.backend()));
				Ok(UpdateStatus::Updated)
			}
		}
	}

	pub fn store_metric(
		&self,
		host: &str,
		name: &str,
		timeseries: Option<TimeseriesRef>,
		last_update: Datetime,
	) -> Result<UpdateStatus, Error> {
		let ts = Self::resolve_ts(last_update);
		let mut hosts = self.store.hosts.write();
		let parent = hosts
			.get_mut(host)
			.ok_or_else(|| missing_parent(EntityKind::Metric, name, host))?;
		match parent.metrics.get_mut(name) {
			Some(metric) => {
				let status = metric.header.touch(ts, self.backend());
				match status {
					UpdateStatus::Updated => {
						// a null handle never clears a recorded one
						if let Some(handle) = timeseries {
							metric.timeseries = Some(handle);
						}
					}
					UpdateStatus::Stale => {
						debug!(
							"store: cannot update metric '{host}.{name}': value too old ({ts} <= {})",
							metric.last_update()
						);
					}
				}
				Ok(status)
			}
			None => {
				parent.metrics.entry_or_insert_with(name, || {
					Metric::new(host, name, timeseries, ts, self.backend())
				});
				Ok(UpdateStatus::Updated)
			}
		}
	}

	pub fn store_attribute(
		&self,
		host: &str,
		key: &str,
		value: Value,
		last_update: Datetime,
	) -> Result<UpdateStatus, Error> {
		let ts = Self::resolve_ts(last_update);
		let mut hosts = self.store.hosts.write();
		let parent = hosts
			.get_mut(host)
			.ok_or_else(|| missing_parent(EntityKind::Attribute, key, host))?;
		Ok(Self::update_attribute(
			&mut parent.attributes,
			host,
			key,
			value,
			ts,
			self.backend(),
		))
	}

	pub fn store_service_attribute(
		&self,
		host: &str,
		service: &str,
		key: &str,
		value: Value,
		last_update: Datetime,
	) -> Result<UpdateStatus, Error> {
		let ts = Self::resolve_ts(last_update);
		let mut hosts = self.store.hosts.write();
		let parent = hosts
			.get_mut(host)
			.ok_or_else(|| missing_parent(EntityKind::Attribute, key, host))?;
		let service = parent.services.get_mut(service).ok_or_else(|| {
			Error::Argument(format!(
				"Failed to store attribute {key}: service {host}.{service} not found"
			))
		})?;
		Ok(Self::update_attribute(
			&mut service.attributes,
			host,
			key,
			value,
			ts,
			self.backend(),
		))
	}

	pub fn store_metric_attribute(
		&self,
		host: &str,
		metric: &str,
		key: &str,
		value: Value,
		last_update: Datetime,
	) -> Result<UpdateStatus, Error> {
		let ts = Self::resolve_ts(last_update);
		let mut hosts = self.store.hosts.write();
		let parent = hosts
			.get_mut(host)
			.ok_or_else(|| missing_parent(EntityKind::Attribute, key, host))?;
		let metric = parent.metrics.get_mut(metric).ok_or_else(|| {
			Error::Argument(format!(
				"Failed to store attribute {key}: metric {host}.{metric} not found"
			))
		})?;
		Ok(Self::update_attribute(
			&mut metric.attributes,
			host,
			key,
			value,
			ts,
			self.backend(),
		))
	}

	fn update_attribute(
		attributes: &mut NameMap<Attribute>,
		host: &str,
		key: &str,
		value: Value,
		ts: Datetime,
		backend: Option<&str>,
	) -> UpdateStatus {
		match attributes.get_mut(key) {
			Some(attr) => {
				let status = attr.header.touch(ts, backend);
				match status {
					UpdateStatus::Updated => attr.value = value,
					UpdateStatus::Stale => {
						debug!(
							"store: cannot update attribute '{host}.{key}': value too old ({ts} <= {})",
							attr.last_update()
						);
					}
				}
				status
			}
			None => {
				attributes.entry_or_insert_with(key, || Attribute::new(key, value, ts, backend));
				UpdateStatus::Updated
			}
		}
	}
}

fn missing_parent(kind: EntityKind, name: &str, host: &str) -> Error {
	Error::Argument(format!(
		"Failed to store {kind} {name}: host {host} not found"
	))
}

/// Scoped read access to a consistent snapshot of the tree.
pub struct Reader<'a> {
	hosts: RwLockReadGuard<'a, NameMap<Host>>,
}

impl Reader<'_> {
	pub fn host(&self, name: &str) -> Option<&Host> {
		self.hosts.get(name)
	}

	pub fn hosts(&self) -> impl Iterator<Item = &Host> {
		self.hosts.iter()
	}

	/// Resolves a direct child of `host` by kind and name.
	pub fn get_child<'h>(
		&self,
		host: &'h Host,
		kind: EntityKind,
		name: &str,
	) -> Option<Obj<'h>> {
		match kind {
			EntityKind::Host => None,
			EntityKind::Service => host.service(name).map(Obj::Service),
			EntityKind::Metric => host.metric(name).map(Obj::Metric),
			EntityKind::Attribute => host.attribute(name).map(Obj::Attribute),
		}
	}

	/// Scans all objects of the given kind in name order (host-major for
	/// children), yielding each object together with its owning host.
	pub fn scan(&self, kind: EntityKind) -> Box<dyn Iterator<Item = (&Host, Obj<'_>)> + '_> {
		match kind {
			EntityKind::Host => Box::new(self.hosts.iter().map(|h| (h, Obj::Host(h)))),
			EntityKind::Service => Box::new(
				self.hosts
					.iter()
					.flat_map(|h| h.services.iter().map(move |s| (h, Obj::Service(s)))),
			),
			EntityKind::Metric => Box::new(
				self.hosts
					.iter()
					.flat_map(|h| h.metrics.iter().map(move |m| (h, Obj::Metric(m)))),
			),
			// attribute scans are rejected by the analyzer
			EntityKind::Attribute => Box::new(std::iter::empty()),
		}
	}
}
