//! Expressions evaluated against stored objects. An expression either
//! produces a single [`Value`] or, in iterator position, a sequence that
//! ANY/ALL matchers quantify over: the child set of a kind (a sequence of
//! objects), the backend set, or an array value.

pub(crate) mod matcher;

pub use self::matcher::{CmpOp, Matcher, Truth};

use crate::data::{Datetime, Kind, Operator, Value};
use crate::err::Error;
use crate::store::{EntityKind, Host, Obj};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Header fields addressable from expressions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Field {
	Name,
	LastUpdate,
	Age,
	Interval,
	Backend,
	/// The value of an attribute; only valid in attribute context.
	Value,
	/// Whether a metric has a recorded time-series; only valid in metric
	/// context.
	Timeseries,
}

impl Field {
	/// The statically known result type; attribute values are untyped until
	/// evaluation.
	pub fn kind(&self) -> Option<Kind> {
		match self {
			Self::Name => Some(Kind::String),
			Self::LastUpdate | Self::Age | Self::Interval => Some(Kind::Datetime),
			Self::Backend => Some(Kind::Array(Box::new(Kind::String))),
			Self::Value => None,
			Self::Timeseries => Some(Kind::Integer),
		}
	}
}

impl Display for Field {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Name => f.write_str("name"),
			Self::LastUpdate => f.write_str("last_update"),
			Self::Age => f.write_str("age"),
			Self::Interval => f.write_str("interval"),
			Self::Backend => f.write_str("backend"),
			Self::Value => f.write_str("value"),
			Self::Timeseries => f.write_str("timeseries"),
		}
	}
}

/// An expression tree node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Expression {
	/// A literal value.
	Constant(Value),
	/// A header field of the current object.
	Field(Field),
	/// The value of the named attribute of the current object; NULL when
	/// the attribute is absent.
	Attribute(String),
	/// Switches evaluation context to the named kind. With an inner
	/// expression this is a scalar path (`host.name` resolves against the
	/// object itself or its parent host); without one it denotes the child
	/// set of that kind and is only meaningful as an iterator source.
	Typed {
		kind: EntityKind,
		expr: Option<Box<Expression>>,
	},
	/// Binary arithmetic over two sub-expressions.
	Binary {
		op: Operator,
		left: Box<Expression>,
		right: Box<Expression>,
	},
	/// The value bound by the enclosing ANY/ALL iterator when it quantifies
	/// over a value sequence (backends, arrays).
	Element,
}

/// Everything an evaluation needs besides the expression itself: the object
/// under consideration, its parent host for upward references, the query's
/// single notion of "now", and the iterator element when quantifying over a
/// value sequence.
#[derive(Clone, Copy)]
pub struct EvalCtx<'a> {
	pub obj: Obj<'a>,
	pub host: Option<&'a Host>,
	pub now: Datetime,
	pub element: Option<&'a Value>,
}

impl<'a> EvalCtx<'a> {
	pub fn new(obj: Obj<'a>, host: Option<&'a Host>, now: Datetime) -> Self {
		Self {
			obj,
			host,
			now,
			element: None,
		}
	}
}

impl Expression {
	pub fn constant(value: impl Into<Value>) -> Self {
		Self::Constant(value.into())
	}

	pub fn field(field: Field) -> Self {
		Self::Field(field)
	}

	pub fn attribute(name: impl Into<String>) -> Self {
		Self::Attribute(name.into())
	}

	/// The child set of `kind`, for use as an iterator source.
	pub fn children(kind: EntityKind) -> Self {
		Self::Typed {
			kind,
			expr: None,
		}
	}

	/// A scalar path through a context switch, e.g. `host.name`.
	pub fn typed(kind: EntityKind, expr: Expression) -> Self {
		Self::Typed {
			kind,
			expr: Some(Box::new(expr)),
		}
	}

	/// Whether this expression is an iterator source in the given context:
	/// a child set of the context kind, the backend set, or an array
	/// constant. Decidable syntactically.
	pub fn is_iterable(&self, ctx_kind: EntityKind) -> bool {
		match self {
			Self::Typed {
				kind,
				expr: None,
			} => match ctx_kind {
				EntityKind::Host => {
					matches!(kind, EntityKind::Service | EntityKind::Metric | EntityKind::Attribute)
				}
				EntityKind::Service | EntityKind::Metric => matches!(kind, EntityKind::Attribute),
				EntityKind::Attribute => false,
			},
			Self::Field(Field::Backend) => true,
			Self::Constant(Value::Array(_)) => true,
			_ => false,
		}
	}

	/// Whether this expression resolves the `name` field of an object; such
	/// comparisons are case-insensitive.
	pub(crate) fn is_name(&self) -> bool {
		match self {
			Self::Field(Field::Name) => true,
			Self::Typed {
				expr: Some(expr),
				..
			} => expr.is_name(),
			_ => false,
		}
	}

	/// Evaluates to a single value against the current object.
	pub(crate) fn eval(&self, ctx: &EvalCtx) -> Result<Value, Error> {
		match self {
			Self::Constant(v) => Ok(v.clone()),
			Self::Element => Ok(ctx.element.cloned().unwrap_or(Value::Null)),
			Self::Field(field) => Ok(eval_field(*field, ctx)),
			Self::Attribute(name) => Ok(ctx
				.obj
				.attribute(name)
				.map(|attr| attr.value().clone())
				.unwrap_or(Value::Null)),
			Self::Typed {
				kind,
				expr,
			} => {
				let Some(expr) = expr else {
					// a bare child set has no scalar value
					return Ok(Value::Null);
				};
				if *kind == ctx.obj.kind() {
					// self-reference
					expr.eval(ctx)
				} else if *kind == EntityKind::Host {
					match ctx.host {
						Some(host) => expr.eval(&EvalCtx {
							obj: Obj::Host(host),
							..*ctx
						}),
						None => Ok(Value::Null),
					}
				} else {
					Ok(Value::Null)
				}
			}
			Self::Binary {
				op,
				left,
				right,
			} => Value::expr_eval(*op, &left.eval(ctx)?, &right.eval(ctx)?),
		}
	}

	/// Evaluates to the value sequence an ANY/ALL matcher quantifies over.
	/// Child sets are iterated by the matcher itself, with the child object
	/// as the element context.
	pub(crate) fn eval_iter(&self, ctx: &EvalCtx) -> Result<Vec<Value>, Error> {
		match self {
			Self::Field(Field::Backend) => Ok(ctx
				.obj
				.header()
				.backends()
				.iter()
				.map(|b| Value::from(b.as_str()))
				.collect()),
			Self::Constant(Value::Array(a)) => Ok(a.to_vec()),
			_ => Err(Error::Eval(format!("cannot iterate {self}"))),
		}
	}
}

fn eval_field(field: Field, ctx: &EvalCtx) -> Value {
	let header = ctx.obj.header();
	match field {
		Field::Name => Value::from(header.name()),
		Field::LastUpdate => Value::Datetime(header.last_update()),
		Field::Age => Value::Datetime(header.last_update().age(ctx.now)),
		Field::Interval => Value::Datetime(Datetime(header.interval())),
		Field::Backend => Value::Array(
			header.backends().iter().map(|b| Value::from(b.as_str())).collect(),
		),
		Field::Value => match ctx.obj {
			Obj::Attribute(attr) => attr.value().clone(),
			_ => Value::Null,
		},
		Field::Timeseries => match ctx.obj {
			Obj::Metric(metric) => Value::from(metric.timeseries_handle().is_some()),
			_ => Value::Null,
		},
	}
}

impl Display for Expression {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Constant(v) => f.write_str(&v.format(crate::data::Style::SingleQuoted)),
			Self::Field(field) => Display::fmt(field, f),
			Self::Attribute(name) => write!(f, "attribute[{name}]"),
			Self::Typed {
				kind,
				expr: Some(expr),
			} => write!(f, "{kind}.{expr}"),
			Self::Typed {
				kind,
				expr: None,
			} => Display::fmt(kind, f),
			Self::Binary {
				op,
				left,
				right,
			} => write!(f, "{left} {op} {right}"),
			Self::Element => f.write_str("."),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data::Datetime;
	use crate::store::Store;

	fn populated() -> Store {
		let store = Store::new();
		let w = store.writer_for("test");
		w.store_host("h1", Datetime(10)).unwrap();
		w.store_attribute("h1", "arch", Value::from("amd64"), Datetime(20)).unwrap();
		w.store_service("h1", "sshd", Datetime(30)).unwrap();
		store
	}

	#[test]
	fn fields_resolve_against_the_object_header() {
		let store = populated();
		let reader = store.reader();
		let host = reader.host("h1").unwrap();
		let ctx = EvalCtx::new(Obj::Host(host), Some(host), Datetime(100));
		assert_eq!(
			Expression::field(Field::Name).eval(&ctx).unwrap(),
			Value::from("h1")
		);
		assert_eq!(
			Expression::field(Field::LastUpdate).eval(&ctx).unwrap(),
			Value::Datetime(Datetime(10))
		);
		assert_eq!(
			Expression::field(Field::Age).eval(&ctx).unwrap(),
			Value::Datetime(Datetime(90))
		);
		assert_eq!(
			Expression::attribute("ARCH").eval(&ctx).unwrap(),
			Value::from("amd64")
		);
		assert_eq!(Expression::attribute("missing").eval(&ctx).unwrap(), Value::Null);
	}

	#[test]
	fn parent_host_references_resolve_from_children() {
		let store = populated();
		let reader = store.reader();
		let host = reader.host("h1").unwrap();
		let service = host.service("sshd").unwrap();
		let ctx = EvalCtx::new(Obj::Service(service), Some(host), Datetime(100));
		let expr = Expression::typed(EntityKind::Host, Expression::field(Field::Name));
		assert_eq!(expr.eval(&ctx).unwrap(), Value::from("h1"));
		// self-references work the same way
		let expr = Expression::typed(EntityKind::Service, Expression::field(Field::Name));
		assert_eq!(expr.eval(&ctx).unwrap(), Value::from("sshd"));
	}

	#[test]
	fn backend_sets_and_arrays_are_value_sequences() {
		let store = populated();
		let reader = store.reader();
		let host = reader.host("h1").unwrap();
		let ctx = EvalCtx::new(Obj::Host(host), Some(host), Datetime(100));
		assert_eq!(
			Expression::field(Field::Backend).eval_iter(&ctx).unwrap(),
			vec![Value::from("test")]
		);
		let array = Expression::constant(Value::from(vec![Value::from(1i64), Value::from(2i64)]));
		assert_eq!(
			array.eval_iter(&ctx).unwrap(),
			vec![Value::from(1i64), Value::from(2i64)]
		);
		assert!(Expression::field(Field::Name).eval_iter(&ctx).is_err());
	}

	#[test]
	fn iterability_is_syntactic() {
		assert!(Expression::children(EntityKind::Attribute).is_iterable(EntityKind::Host));
		assert!(Expression::children(EntityKind::Service).is_iterable(EntityKind::Host));
		assert!(!Expression::children(EntityKind::Service).is_iterable(EntityKind::Metric));
		assert!(Expression::field(Field::Backend).is_iterable(EntityKind::Service));
		assert!(!Expression::field(Field::Name).is_iterable(EntityKind::Host));
		assert!(!Expression::typed(EntityKind::Attribute, Expression::field(Field::Value))
			.is_iterable(EntityKind::Host));
	}
}
