//! End-to-end query scenarios driving the public API: writer, analyzer,
//! executor and JSON output.

use std::sync::atomic::{AtomicBool, Ordering};

use sysdb_core::ast::{self, Query};
use sysdb_core::data::Datetime;
use sysdb_core::err::Error;
use sysdb_core::exec::{execute, TimeseriesBackend, TimeseriesOpts};
use sysdb_core::expr::{CmpOp, Expression, Field, Matcher};
use sysdb_core::store::{EntityKind, Store, TimeseriesRef, UpdateStatus};
use sysdb_core::Value;

const SEC: u64 = 1_000_000_000;

fn ts(sec: u64) -> Datetime {
	Datetime(sec * SEC)
}

fn age_filter() -> Matcher {
	Matcher::cmp(
		CmpOp::Ge,
		Expression::field(Field::Age),
		Expression::constant(Value::Datetime(Datetime(0))),
	)
}

struct MockTimeseries {
	called: AtomicBool,
}

impl MockTimeseries {
	fn new() -> Self {
		Self {
			called: AtomicBool::new(false),
		}
	}
}

impl TimeseriesBackend for MockTimeseries {
	fn fetch(&self, handle: &TimeseriesRef, opts: &TimeseriesOpts) -> Result<String, Error> {
		self.called.store(true, Ordering::SeqCst);
		Ok(format!(
			"{{\"id\": \"{}\", \"start\": {}, \"end\": {}, \"data\": []}}",
			handle.store_id,
			handle.store_type.len(), // arbitrary but deterministic
			opts.end.as_nanos() - opts.start.as_nanos()
		))
	}
}

#[test]
fn host_lifecycle_is_ordered_by_timestamp() {
	let store = Store::new();
	let w = store.writer();
	assert_eq!(w.store_host("h1", Datetime(1)).unwrap(), UpdateStatus::Updated);
	assert_eq!(w.store_host("h1", Datetime(2)).unwrap(), UpdateStatus::Updated);
	assert_eq!(w.store_host("h1", Datetime(1)).unwrap(), UpdateStatus::Stale);
	let reader = store.reader();
	let host = reader.host("h1").unwrap();
	assert_eq!(host.last_update(), Datetime(2));
	assert_eq!(host.interval(), 1);
}

#[test]
fn lookup_matches_and_filters_subtrees() {
	let store = Store::new();
	let w = store.writer();
	w.store_host("a", ts(1)).unwrap();
	w.store_host("b", ts(3)).unwrap();
	w.store_attribute("a", "k1", Value::from("v1"), ts(1)).unwrap();
	w.store_attribute("a", "k2", Value::from(123i64), ts(2)).unwrap();

	let query = Query::Lookup(ast::Lookup {
		kind: EntityKind::Host,
		matcher: Some(Matcher::any(
			Expression::children(EntityKind::Attribute),
			Matcher::cmp(
				CmpOp::Eq,
				Expression::field(Field::Name),
				Expression::constant("k2"),
			),
		)),
		filter: Some(age_filter()),
	});
	let output = execute(&store, &query, None).unwrap();
	let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
	let hosts = parsed.as_array().unwrap();
	assert_eq!(hosts.len(), 1);
	assert_eq!(hosts[0]["name"], "a");
	let attrs = hosts[0]["attributes"].as_array().unwrap();
	assert_eq!(attrs.len(), 2);
	assert_eq!(attrs[0]["name"], "k1");
	assert_eq!(attrs[1]["name"], "k2");
}

#[test]
fn lookup_with_always_true_matcher_enumerates_in_name_order() {
	let store = Store::new();
	let w = store.writer();
	for name in ["zeta", "alpha", "Beta"] {
		w.store_host(name, ts(1)).unwrap();
	}
	let query = Query::Lookup(ast::Lookup {
		kind: EntityKind::Host,
		matcher: Some(age_filter()),
		filter: None,
	});
	let output = execute(&store, &query, None).unwrap();
	let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
	let names: Vec<_> = parsed
		.as_array()
		.unwrap()
		.iter()
		.map(|h| h["name"].as_str().unwrap().to_owned())
		.collect();
	assert_eq!(names, ["alpha", "Beta", "zeta"]);
}

#[test]
fn iterating_a_scalar_path_is_a_type_error() {
	let store = Store::new();
	let query = Query::Lookup(ast::Lookup {
		kind: EntityKind::Host,
		matcher: Some(Matcher::any(
			Expression::typed(EntityKind::Attribute, Expression::field(Field::Value)),
			Matcher::cmp(CmpOp::Eq, Expression::Element, Expression::constant(1i64)),
		)),
		filter: None,
	});
	match execute(&store, &query, None) {
		Err(Error::Type(msg)) => assert!(msg.contains("attribute.value"), "got: {msg}"),
		other => panic!("expected a type error, got {other:?}"),
	}
}

#[test]
fn fetch_service_renders_the_expected_shape() {
	let store = Store::new();
	let w = store.writer();
	w.store_host("h", ts(5)).unwrap();
	w.store_service("h", "s", ts(5)).unwrap();
	w.store_service_attribute("h", "s", "k", Value::from(42i64), ts(5)).unwrap();

	let query = Query::Fetch(ast::Fetch {
		kind: EntityKind::Service,
		hostname: Some("h".to_owned()),
		name: "s".to_owned(),
		filter: None,
	});
	let output = execute(&store, &query, None).unwrap();
	let t5 = ts(5).to_string();
	let expected = format!(
		concat!(
			"{{\"name\": \"s\", \"last_update\": \"{t}\", ",
			"\"update_interval\": \"0s\", \"backends\": [], ",
			"\"attributes\": [",
			"{{\"name\": \"k\", \"value\": 42, \"last_update\": \"{t}\", ",
			"\"update_interval\": \"0s\", \"backends\": []}}]}}"
		),
		t = t5
	);
	assert_eq!(output, expected);
	// and it parses back into an equivalent structure
	let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
	assert_eq!(parsed["name"], "s");
	assert_eq!(parsed["attributes"][0]["value"], 42);
}

#[test]
fn fetch_of_a_missing_host_reports_not_found() {
	let store = Store::new();
	let query = Query::Fetch(ast::Fetch {
		kind: EntityKind::Host,
		hostname: None,
		name: "x".to_owned(),
		filter: None,
	});
	match execute(&store, &query, None) {
		Err(Error::NotFound(msg)) => {
			assert_eq!(msg, "Failed to fetch host x: host x not found");
		}
		other => panic!("expected not-found, got {other:?}"),
	}
}

#[test]
fn list_returns_shallow_records() {
	let store = Store::new();
	let w = store.writer();
	w.store_host("h1", ts(1)).unwrap();
	w.store_service("h1", "s1", ts(1)).unwrap();
	w.store_service("h1", "s2", ts(2)).unwrap();
	let query = Query::List(ast::List {
		kind: EntityKind::Service,
		filter: None,
	});
	let output = execute(&store, &query, None).unwrap();
	let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
	let services = parsed.as_array().unwrap();
	assert_eq!(services.len(), 2);
	assert_eq!(services[0]["name"], "s1");
	assert!(services[0].get("attributes").is_none());
}

#[test]
fn store_commands_write_through_and_confirm() {
	let store = Store::new();
	let output = execute(&store, &Query::Store(ast::Store::host("h1", Some(ts(1)))), None).unwrap();
	assert_eq!(output, "Successfully stored host h1");

	let output = execute(
		&store,
		&Query::Store(ast::Store::service("h1", "web", Some(ts(1)))),
		None,
	)
	.unwrap();
	assert_eq!(output, "Successfully stored service web");

	let mut metric = ast::Store::metric("h1", "load", Some(ts(1)));
	metric.store_type = Some("rrdtool".to_owned());
	metric.store_id = Some("/var/lib/load.rrd".to_owned());
	execute(&store, &Query::Store(metric), None).unwrap();

	let output = execute(
		&store,
		&Query::Store(ast::Store::attribute("h1", "arch", Value::from("amd64"), Some(ts(2)))),
		None,
	)
	.unwrap();
	assert_eq!(output, "Successfully stored attribute arch");

	// a stale store still confirms; double reports are not errors
	let output = execute(
		&store,
		&Query::Store(ast::Store::attribute("h1", "arch", Value::from("old"), Some(ts(1)))),
		None,
	)
	.unwrap();
	assert_eq!(output, "Successfully stored attribute arch");

	let reader = store.reader();
	let host = reader.host("h1").unwrap();
	assert_eq!(host.attribute("arch").unwrap().value(), &Value::from("amd64"));
	assert!(host.service("web").is_some());
	assert_eq!(
		host.metric("load").unwrap().timeseries_handle(),
		Some(&TimeseriesRef {
			store_type: "rrdtool".to_owned(),
			store_id: "/var/lib/load.rrd".to_owned(),
		})
	);

	drop(reader);

	// a missing parent is a hard error
	let result = execute(
		&store,
		&Query::Store(ast::Store::service("nope", "s", Some(ts(1)))),
		None,
	);
	assert!(matches!(result, Err(Error::Argument(_))));
}

#[test]
fn timeseries_window_is_validated_before_the_backend_runs() {
	let store = Store::new();
	let backend = MockTimeseries::new();
	let query = Query::Timeseries(ast::Timeseries {
		hostname: "h".to_owned(),
		metric: "m".to_owned(),
		start: ts(10),
		end: ts(5),
	});
	match execute(&store, &query, Some(&backend)) {
		Err(Error::Type(msg)) => {
			assert!(msg.starts_with("Start time ("), "got: {msg}");
			assert!(msg.ends_with(") in TIMESERIES command"), "got: {msg}");
		}
		other => panic!("expected a type error, got {other:?}"),
	}
	assert!(!backend.called.load(Ordering::SeqCst));
}

#[test]
fn timeseries_delegates_the_recorded_handle() {
	let store = Store::new();
	let w = store.writer();
	w.store_host("h", ts(1)).unwrap();
	w.store_metric(
		"h",
		"load",
		Some(TimeseriesRef {
			store_type: "rrdtool".to_owned(),
			store_id: "load.rrd".to_owned(),
		}),
		ts(1),
	)
	.unwrap();

	let backend = MockTimeseries::new();
	let query = Query::Timeseries(ast::Timeseries {
		hostname: "h".to_owned(),
		metric: "load".to_owned(),
		start: ts(5),
		end: ts(10),
	});
	let output = execute(&store, &query, Some(&backend)).unwrap();
	assert!(backend.called.load(Ordering::SeqCst));
	let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
	assert_eq!(parsed["id"], "load.rrd");

	// a metric without a recorded handle cannot be queried
	w.store_metric("h", "bare", None, ts(1)).unwrap();
	let query = Query::Timeseries(ast::Timeseries {
		hostname: "h".to_owned(),
		metric: "bare".to_owned(),
		start: ts(5),
		end: ts(10),
	});
	assert!(matches!(execute(&store, &query, Some(&backend)), Err(Error::NotFound(_))));
}

#[test]
fn lookup_output_round_trips_through_a_json_parser() {
	let store = Store::new();
	let w = store.writer_for("collectd");
	w.store_host("db1", ts(1)).unwrap();
	w.store_service("db1", "postgres", ts(2)).unwrap();
	w.store_metric("db1", "load", None, ts(2)).unwrap();
	w.store_attribute("db1", "note", Value::from("contains \"quotes\"\n"), ts(2)).unwrap();

	let query = Query::Lookup(ast::Lookup {
		kind: EntityKind::Host,
		matcher: None,
		filter: None,
	});
	let output = execute(&store, &query, None).unwrap();
	let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
	let host = &parsed.as_array().unwrap()[0];
	assert_eq!(host["name"], "db1");
	assert_eq!(host["backends"][0], "collectd");
	assert_eq!(host["attributes"][0]["value"], "contains \"quotes\"\n");
	assert_eq!(host["metrics"][0]["timeseries"], false);
	assert_eq!(host["services"][0]["name"], "postgres");
}
