//! Query execution: drives validated queries against the store and renders
//! results. Scans acquire the read lock once, through [`Store::reader`],
//! and hold it until the last record has been written to the in-memory
//! result buffer; flushing that buffer to a client happens after release.

use crate::analyzer;
use crate::ast::{self, Query};
use crate::data::Datetime;
use crate::err::Error;
use crate::expr::{EvalCtx, Matcher, Truth};
use crate::store::{EntityKind, Host, JsonFormatter, Obj, Store, TimeseriesRef};
use tracing::debug;

/// Window of a TIMESERIES request.
#[derive(Clone, Copy, Debug)]
pub struct TimeseriesOpts {
	pub start: Datetime,
	pub end: Datetime,
}

/// Interface to a time-series store (RRD files and the like). The core only
/// records opaque handles; fetching data points is delegated through this
/// trait, outside of the store lock.
pub trait TimeseriesBackend {
	/// Fetches the data points for `opts` and returns them serialized as
	/// JSON.
	fn fetch(&self, handle: &TimeseriesRef, opts: &TimeseriesOpts) -> Result<String, Error>;
}

/// Validates and executes a single query, returning the JSON payload (or
/// the confirmation line for STORE).
pub fn execute(
	store: &Store,
	query: &Query,
	timeseries: Option<&dyn TimeseriesBackend>,
) -> Result<String, Error> {
	if let Err(err) = analyzer::analyze(query) {
		debug!("frontend: rejected query: {err}");
		return Err(err);
	}
	match query {
		Query::Fetch(fetch) => exec_fetch(store, fetch),
		Query::List(list) => exec_list(store, list),
		Query::Lookup(lookup) => exec_lookup(store, lookup),
		Query::Store(stmt) => exec_store(store, stmt),
		Query::Timeseries(ts) => exec_timeseries(store, ts, timeseries),
	}
}

fn passes(filter: Option<&Matcher>, obj: Obj, host: &Host, now: Datetime) -> bool {
	match filter {
		Some(filter) => filter.matches(&EvalCtx::new(obj, Some(host), now)) == Truth::True,
		None => true,
	}
}

fn exec_fetch(store: &Store, fetch: &ast::Fetch) -> Result<String, Error> {
	let now = Datetime::now();
	let reader = store.reader();
	let hostname = fetch.hostname.as_deref().unwrap_or(&fetch.name);
	let not_found = || {
		Error::NotFound(format!(
			"Failed to fetch {} {}: host {hostname} not found",
			fetch.kind, fetch.name
		))
	};
	let host = reader.host(hostname).ok_or_else(not_found)?;
	// a host hidden by the filter reads as absent
	if !passes(fetch.filter.as_ref(), Obj::Host(host), host, now) {
		return Err(not_found());
	}
	let obj = if fetch.kind == EntityKind::Host {
		Obj::Host(host)
	} else {
		let child = reader
			.get_child(host, fetch.kind, &fetch.name)
			.filter(|obj| passes(fetch.filter.as_ref(), *obj, host, now));
		match child {
			Some(obj) => obj,
			None => {
				return Err(Error::NotFound(format!(
					"Failed to fetch {} {hostname}.{name}: {name} not found",
					fetch.kind,
					name = fetch.name
				)));
			}
		}
	};
	let mut formatter = JsonFormatter::new(fetch.kind, false)?;
	formatter.emit_full(obj, Some(host), fetch.filter.as_ref(), now)?;
	Ok(formatter.finish())
}

fn exec_list(store: &Store, list: &ast::List) -> Result<String, Error> {
	let now = Datetime::now();
	let reader = store.reader();
	let mut formatter = JsonFormatter::new(list.kind, true)?;
	for (host, obj) in reader.scan(list.kind) {
		if passes(list.filter.as_ref(), obj, host, now) {
			formatter.emit(obj)?;
		}
	}
	Ok(formatter.finish())
}

fn exec_lookup(store: &Store, lookup: &ast::Lookup) -> Result<String, Error> {
	let now = Datetime::now();
	let reader = store.reader();
	let mut formatter = JsonFormatter::new(lookup.kind, true)?;
	for (host, obj) in reader.scan(lookup.kind) {
		let matched = match &lookup.matcher {
			Some(matcher) => {
				matcher.matches(&EvalCtx::new(obj, Some(host), now)) == Truth::True
			}
			None => true,
		};
		if matched && passes(lookup.filter.as_ref(), obj, host, now) {
			formatter.emit_full(obj, Some(host), lookup.filter.as_ref(), now)?;
		}
	}
	Ok(formatter.finish())
}

fn exec_store(store: &Store, stmt: &ast::Store) -> Result<String, Error> {
	let writer = store.writer();
	let ts = stmt.last_update.unwrap_or(Datetime(0));
	let hostname = || {
		stmt.hostname
			.as_deref()
			.ok_or_else(|| Error::Internal("STORE without a parent hostname".to_owned()))
	};
	// stale results still confirm; double reports are not errors
	match stmt.kind {
		EntityKind::Host => {
			writer.store_host(&stmt.name, ts)?;
		}
		EntityKind::Service => {
			writer.store_service(hostname()?, &stmt.name, ts)?;
		}
		EntityKind::Metric => {
			let handle = match (&stmt.store_type, &stmt.store_id) {
				(Some(store_type), Some(store_id)) => Some(TimeseriesRef {
					store_type: store_type.clone(),
					store_id: store_id.clone(),
				}),
				_ => None,
			};
			writer.store_metric(hostname()?, &stmt.name, handle, ts)?;
		}
		EntityKind::Attribute => match stmt.parent_kind {
			None => {
				writer.store_attribute(hostname()?, &stmt.name, stmt.value.clone(), ts)?;
			}
			Some(EntityKind::Service) => {
				let parent = stmt.parent.as_deref().ok_or_else(|| {
					Error::Internal("STORE attribute without a parent name".to_owned())
				})?;
				writer.store_service_attribute(
					hostname()?,
					parent,
					&stmt.name,
					stmt.value.clone(),
					ts,
				)?;
			}
			Some(EntityKind::Metric) => {
				let parent = stmt.parent.as_deref().ok_or_else(|| {
					Error::Internal("STORE attribute without a parent name".to_owned())
				})?;
				writer.store_metric_attribute(
					hostname()?,
					parent,
					&stmt.name,
					stmt.value.clone(),
					ts,
				)?;
			}
			Some(kind) => {
				return Err(Error::Internal(format!(
					"STORE attribute below a {kind} parent"
				)));
			}
		},
	}
	Ok(format!("Successfully stored {} {}", stmt.kind, stmt.name))
}

fn exec_timeseries(
	store: &Store,
	ts: &ast::Timeseries,
	backend: Option<&dyn TimeseriesBackend>,
) -> Result<String, Error> {
	// resolve the handle under the read lock, fetch outside of it
	let handle = {
		let reader = store.reader();
		let host = reader.host(&ts.hostname).ok_or_else(|| {
			Error::NotFound(format!(
				"Failed to fetch time-series {}.{}: host {} not found",
				ts.hostname, ts.metric, ts.hostname
			))
		})?;
		let metric = host.metric(&ts.metric).ok_or_else(|| {
			Error::NotFound(format!(
				"Failed to fetch time-series {}.{}: metric {} not found",
				ts.hostname, ts.metric, ts.metric
			))
		})?;
		metric
			.timeseries_handle()
			.cloned()
			.ok_or_else(|| {
				Error::NotFound(format!(
					"Failed to fetch time-series {}.{}: no time-series configured",
					ts.hostname, ts.metric
				))
			})?
	};
	let backend = backend.ok_or_else(|| {
		Error::Argument("no time-series backend configured".to_owned())
	})?;
	backend.fetch(
		&handle,
		&TimeseriesOpts {
			start: ts.start,
			end: ts.end,
		},
	)
}
