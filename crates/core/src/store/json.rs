//! Streaming JSON serialization of stored objects.
//!
//! The formatter is driven object by object and keeps a context stack
//! describing the path to the currently open object, so that siblings of
//! the same kind and children of a different kind nest correctly without
//! buffering whole subtrees.

use crate::data::{Datetime, Duration, Style, Value};
use crate::err::Error;
use crate::expr::{EvalCtx, Matcher, Truth};
use crate::store::entity::{EntityKind, Host, Obj};
use std::fmt::Write;
use tracing::error;

/// Streaming writer for hosts, services, metrics and their attributes.
#[derive(Debug)]
pub struct JsonFormatter {
	buf: String,
	/// The kinds of the currently open objects, root first.
	context: Vec<EntityKind>,
	/// Kind of the objects this request asked for.
	top: EntityKind,
	/// Whether the output is wrapped in a top-level array (LIST / LOOKUP).
	want_array: bool,
}

impl JsonFormatter {
	pub fn new(top: EntityKind, want_array: bool) -> Result<Self, Error> {
		if top == EntityKind::Attribute {
			return Err(Error::Argument(
				"attributes cannot be serialized as top-level objects".to_owned(),
			));
		}
		Ok(Self {
			buf: String::with_capacity(1024),
			context: Vec::with_capacity(4),
			top,
			want_array,
		})
	}

	/// Emits a single shallow record for `obj`.
	pub fn emit(&mut self, obj: Obj) -> Result<(), Error> {
		self.handle_new_object(obj.kind())?;
		let header = obj.header();
		self.buf.push('{');
		let _ = write!(self.buf, "\"name\": {}, ", escape_json(header.name()));
		match obj {
			Obj::Attribute(attr) => {
				let _ = write!(self.buf, "\"value\": {}, ", value_json(attr.value()));
			}
			Obj::Metric(metric) => {
				let _ = write!(
					self.buf,
					"\"timeseries\": {}, ",
					metric.timeseries_handle().is_some()
				);
			}
			_ => {}
		}
		let _ = write!(
			self.buf,
			"\"last_update\": \"{}\", \"update_interval\": \"{}\", \"backends\": [",
			header.last_update(),
			Duration::from_nanos(header.interval())
		);
		for (i, backend) in header.backends().iter().enumerate() {
			if i > 0 {
				self.buf.push(',');
			}
			self.buf.push_str(&escape_json(backend));
		}
		self.buf.push(']');
		// the object stays open; the context machinery closes it when its
		// sibling, parent or the end of the request arrives
		Ok(())
	}

	/// Emits `obj` together with its full subtree. The filter prunes child
	/// records recursively; a parent without surviving children is still
	/// emitted.
	pub fn emit_full(
		&mut self,
		obj: Obj,
		host: Option<&Host>,
		filter: Option<&Matcher>,
		now: Datetime,
	) -> Result<(), Error> {
		self.emit(obj)?;
		let kinds: &[EntityKind] = match obj.kind() {
			EntityKind::Host => {
				&[EntityKind::Attribute, EntityKind::Metric, EntityKind::Service]
			}
			EntityKind::Service | EntityKind::Metric => &[EntityKind::Attribute],
			EntityKind::Attribute => &[],
		};
		for kind in kinds {
			for child in obj.children(*kind) {
				let passes = match filter {
					Some(filter) => {
						filter.matches(&EvalCtx::new(child, host, now)) == Truth::True
					}
					None => true,
				};
				if passes {
					self.emit_full(child, host, filter, now)?;
				}
			}
		}
		Ok(())
	}

	/// Closes all open objects and arrays and returns the JSON text.
	pub fn finish(mut self) -> String {
		if self.context.is_empty() {
			// no content
			if self.want_array {
				self.buf.push_str("[]");
			}
			return self.buf;
		}
		while self.context.len() > 1 {
			self.buf.push_str("}]");
			self.context.pop();
		}
		self.buf.push('}');
		if self.want_array {
			self.buf.push(']');
		}
		self.buf
	}

	/// Maintains the context stack for the next object of kind `kind`,
	/// emitting whatever separators and child-array openers its position
	/// requires.
	fn handle_new_object(&mut self, kind: EntityKind) -> Result<(), Error> {
		if self.context.is_empty() {
			// first object of the request
			if kind != self.top && kind != EntityKind::Host {
				error!(
					"store: unexpected object of type {kind} as the first element \
					 during {} serialization",
					self.top
				);
				return Err(Error::Internal(format!(
					"unexpected {kind} at the start of a {} result",
					self.top
				)));
			}
			if self.want_array {
				self.buf.push('[');
			}
			self.context.push(kind);
			return Ok(());
		}

		if self.current() != EntityKind::Host && kind != EntityKind::Attribute {
			// a sibling further up or a new parent object; rewind to the
			// matching depth
			while self.context.len() > 1 && self.current() != kind {
				self.buf.push_str("}]");
				self.context.pop();
			}
		}

		if kind == self.current() {
			// a sibling of the same kind
			self.buf.push_str("},");
		} else if self.current() == EntityKind::Host || kind == EntityKind::Attribute {
			// all object types may be children of a host; attributes may be
			// children of any type
			let _ = write!(self.buf, ", \"{kind}s\": [");
			self.context.push(kind);
		} else {
			error!(
				"store: unexpected object of type {kind} on level {} during JSON serialization",
				self.context.len()
			);
			return Err(Error::Internal(format!(
				"unexpected {kind} below a {}",
				self.current()
			)));
		}
		Ok(())
	}

	fn current(&self) -> EntityKind {
		// only called with a non-empty stack
		self.context.last().copied().unwrap_or(EntityKind::Host)
	}
}

/// JSON string literal for `s`, quotes included. Control characters use the
/// standard short escapes or `\u00XX`.
fn escape_json(s: &str) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	out.push('"');
	for c in s.chars() {
		match c {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\u{0008}' => out.push_str("\\b"),
			'\u{000c}' => out.push_str("\\f"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			c if (c as u32) < 0x20 => {
				let _ = write!(out, "\\u{:04x}", c as u32);
			}
			c => out.push(c),
		}
	}
	out.push('"');
	out
}

/// Renders an attribute value as a JSON value: numbers stay raw, everything
/// else becomes an escaped string, arrays nest.
fn value_json(value: &Value) -> String {
	match value {
		Value::Null => "null".to_owned(),
		Value::Integer(n) => n.to_string(),
		Value::Decimal(d) if d.is_finite() => d.to_string(),
		Value::Array(elements) => {
			let mut out = String::from("[");
			for (i, elem) in elements.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				out.push_str(&value_json(elem));
			}
			out.push(']');
			out
		}
		other => escape_json(&other.format(Style::Unquoted)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data::{Datetime, Value};
	use crate::store::Store;

	const SEC: u64 = 1_000_000_000;

	fn populate() -> Store {
		let store = Store::new();
		let w = store.writer();
		w.store_host("h1", Datetime(SEC)).unwrap();
		w.store_host("h2", Datetime(3 * SEC)).unwrap();
		w.store_attribute("h1", "k1", Value::from("v1"), Datetime(SEC)).unwrap();
		w.store_attribute("h1", "k2", Value::from("v2"), Datetime(2 * SEC)).unwrap();
		// an older update must not overwrite the stored value
		w.store_attribute("h1", "k2", Value::from("fail"), Datetime(SEC)).unwrap();
		w.store_metric("h1", "m1", None, Datetime(2 * SEC)).unwrap();
		w.store_metric("h2", "m1", None, Datetime(SEC)).unwrap();
		w.store_service("h2", "s1", Datetime(SEC)).unwrap();
		w.store_service("h2", "s2", Datetime(2 * SEC)).unwrap();
		w.store_metric_attribute("h1", "m1", "k3", Value::from(42i64), Datetime(2 * SEC))
			.unwrap();
		w.store_service_attribute("h2", "s2", "k1", Value::from(123i64), Datetime(2 * SEC))
			.unwrap();
		store
	}

	fn t(sec: u64) -> String {
		Datetime(sec * SEC).to_string()
	}

	/// Substitutes the `@T<n>@` timestamp placeholders of the golden text.
	fn golden(template: &str) -> String {
		template
			.replace("@T1@", &t(1))
			.replace("@T2@", &t(2))
			.replace("@T3@", &t(3))
	}

	#[test]
	fn full_subtrees_nest_by_kind() {
		let store = populate();
		let reader = store.reader();
		let mut f = JsonFormatter::new(EntityKind::Host, true).unwrap();
		for (host, obj) in reader.scan(EntityKind::Host) {
			f.emit_full(obj, Some(host), None, Datetime(10 * SEC)).unwrap();
		}
		let expected = golden(concat!(
			"[",
			"{\"name\": \"h1\", \"last_update\": \"@T1@\", ",
			"\"update_interval\": \"0s\", \"backends\": [], ",
			"\"attributes\": [",
			"{\"name\": \"k1\", \"value\": \"v1\", \"last_update\": \"@T1@\", ",
			"\"update_interval\": \"0s\", \"backends\": []},",
			"{\"name\": \"k2\", \"value\": \"v2\", \"last_update\": \"@T2@\", ",
			"\"update_interval\": \"0s\", \"backends\": []}], ",
			"\"metrics\": [",
			"{\"name\": \"m1\", \"timeseries\": false, \"last_update\": \"@T2@\", ",
			"\"update_interval\": \"0s\", \"backends\": [], ",
			"\"attributes\": [",
			"{\"name\": \"k3\", \"value\": 42, \"last_update\": \"@T2@\", ",
			"\"update_interval\": \"0s\", \"backends\": []}]}]},",
			"{\"name\": \"h2\", \"last_update\": \"@T3@\", ",
			"\"update_interval\": \"0s\", \"backends\": [], ",
			"\"metrics\": [",
			"{\"name\": \"m1\", \"timeseries\": false, \"last_update\": \"@T1@\", ",
			"\"update_interval\": \"0s\", \"backends\": []}], ",
			"\"services\": [",
			"{\"name\": \"s1\", \"last_update\": \"@T1@\", ",
			"\"update_interval\": \"0s\", \"backends\": []},",
			"{\"name\": \"s2\", \"last_update\": \"@T2@\", ",
			"\"update_interval\": \"0s\", \"backends\": [], ",
			"\"attributes\": [",
			"{\"name\": \"k1\", \"value\": 123, \"last_update\": \"@T2@\", ",
			"\"update_interval\": \"0s\", \"backends\": []}]}]}",
			"]"
		));
		assert_eq!(f.finish(), expected);
	}

	#[test]
	fn shallow_lists_stay_flat() {
		let store = populate();
		let reader = store.reader();
		let mut f = JsonFormatter::new(EntityKind::Host, true).unwrap();
		for (_, obj) in reader.scan(EntityKind::Host) {
			f.emit(obj).unwrap();
		}
		let expected = golden(concat!(
			"[",
			"{\"name\": \"h1\", \"last_update\": \"@T1@\", ",
			"\"update_interval\": \"0s\", \"backends\": []},",
			"{\"name\": \"h2\", \"last_update\": \"@T3@\", ",
			"\"update_interval\": \"0s\", \"backends\": []}",
			"]"
		));
		assert_eq!(f.finish(), expected);
	}

	#[test]
	fn filters_prune_children_but_not_the_parent() {
		use crate::expr::{CmpOp, Expression, Matcher};
		use crate::expr::Field;
		let store = populate();
		let reader = store.reader();
		// keep only records last updated at or after t2
		let filter = Matcher::cmp(
			CmpOp::Ge,
			Expression::field(Field::LastUpdate),
			Expression::constant(Value::Datetime(Datetime(2 * SEC))),
		);
		let mut f = JsonFormatter::new(EntityKind::Host, true).unwrap();
		for (host, obj) in reader.scan(EntityKind::Host) {
			f.emit_full(obj, Some(host), Some(&filter), Datetime(10 * SEC)).unwrap();
		}
		let parsed: serde_json::Value = serde_json::from_str(&f.finish()).unwrap();
		// h1 keeps k2 but loses k1
		let h1 = &parsed.as_array().unwrap()[0];
		let attrs = h1["attributes"].as_array().unwrap();
		assert_eq!(attrs.len(), 1);
		assert_eq!(attrs[0]["name"], "k2");
		// h2's metric m1 (t1) is pruned entirely
		let h2 = &parsed.as_array().unwrap()[1];
		assert!(h2.get("metrics").is_none());
		assert_eq!(h2["services"].as_array().unwrap().len(), 1);
	}

	#[test]
	fn empty_results_are_an_empty_array() {
		let f = JsonFormatter::new(EntityKind::Host, true).unwrap();
		assert_eq!(f.finish(), "[]");
		let f = JsonFormatter::new(EntityKind::Host, false).unwrap();
		assert_eq!(f.finish(), "");
	}

	#[test]
	fn output_is_valid_json() {
		let store = populate();
		let reader = store.reader();
		let mut f = JsonFormatter::new(EntityKind::Host, true).unwrap();
		for (host, obj) in reader.scan(EntityKind::Host) {
			f.emit_full(obj, Some(host), None, Datetime(10 * SEC)).unwrap();
		}
		let parsed: serde_json::Value = serde_json::from_str(&f.finish()).unwrap();
		let hosts = parsed.as_array().unwrap();
		assert_eq!(hosts.len(), 2);
		assert_eq!(hosts[0]["name"], "h1");
		assert_eq!(hosts[0]["attributes"][1]["value"], "v2");
		assert_eq!(hosts[0]["metrics"][0]["attributes"][0]["value"], 42);
	}

	#[test]
	fn strings_are_escaped() {
		assert_eq!(escape_json("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
		assert_eq!(escape_json("ctl\u{0001}"), "\"ctl\\u0001\"");
	}
}
