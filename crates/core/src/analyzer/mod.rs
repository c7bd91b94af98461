//! Static validation of queries before execution. The analyzer walks
//! matcher and expression trees with the object kind they will evaluate
//! against, infers the result type of every expression, and rejects
//! anything that cannot be evaluated meaningfully. Each rejection carries a
//! single human-readable line naming the offending kind or field.

use crate::ast::{self, Query};
use crate::data::{Kind, Value};
use crate::err::Error;
use crate::expr::{Expression, Field, Matcher};
use crate::store::EntityKind;
use std::fmt::{self, Display, Formatter};

/// What a matcher or expression evaluates against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Scope {
	/// Objects of one kind, as in a LOOKUP matcher.
	Object(EntityKind),
	/// A filter, which is applied to objects of every kind.
	Filter,
}

impl Display for Scope {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Object(kind) => Display::fmt(kind, f),
			Self::Filter => f.write_str("filter"),
		}
	}
}

#[derive(Clone)]
struct Context {
	scope: Scope,
	/// Set while analyzing a quantifier condition; quantifiers do not nest.
	in_iter: bool,
	/// Bound element type while analyzing a condition over a value
	/// sequence; `Some(None)` when the element type is unknown.
	element: Option<Option<Kind>>,
}

impl Context {
	fn new(scope: Scope) -> Self {
		Self {
			scope,
			in_iter: false,
			element: None,
		}
	}
}

/// Statically checks a query. The first violation is returned as a
/// [`Error::Type`] whose message is reported to the client verbatim.
pub fn analyze(query: &Query) -> Result<(), Error> {
	match query {
		Query::Fetch(fetch) => analyze_fetch(fetch),
		Query::List(list) => analyze_list(list),
		Query::Lookup(lookup) => analyze_lookup(lookup),
		Query::Store(store) => analyze_store(store),
		Query::Timeseries(ts) => analyze_timeseries(ts),
	}
}

/// Checks a matcher against the kind of object it will be applied to, as
/// used for conditions supplied outside of a full query.
pub fn analyze_matcher(kind: EntityKind, matcher: &Matcher) -> Result<(), Error> {
	check_matcher(&Context::new(Scope::Object(kind)), matcher)
}

fn reject(message: impl Into<String>) -> Result<(), Error> {
	Err(Error::Type(message.into()))
}

fn analyze_fetch(fetch: &ast::Fetch) -> Result<(), Error> {
	if fetch.kind == EntityKind::Attribute {
		return reject("Invalid object type attribute in FETCH command");
	}
	if fetch.name.is_empty() {
		return reject(format!("Missing object name in FETCH {} command", fetch.kind));
	}
	match (&fetch.kind, &fetch.hostname) {
		(EntityKind::Host, Some(hostname)) => {
			return reject(format!(
				"Unexpected parent hostname '{hostname}' in FETCH HOST command"
			));
		}
		(EntityKind::Host, None) => {}
		(kind, None) => {
			return reject(format!(
				"Missing parent hostname for '{}' in FETCH {kind} command",
				fetch.name
			));
		}
		(_, Some(_)) => {}
	}
	if let Some(filter) = &fetch.filter {
		check_matcher(&Context::new(Scope::Filter), filter)?;
	}
	Ok(())
}

fn analyze_list(list: &ast::List) -> Result<(), Error> {
	if list.kind == EntityKind::Attribute {
		return reject("Invalid object type attribute in LIST command");
	}
	if let Some(filter) = &list.filter {
		check_matcher(&Context::new(Scope::Filter), filter)?;
	}
	Ok(())
}

fn analyze_lookup(lookup: &ast::Lookup) -> Result<(), Error> {
	if lookup.kind == EntityKind::Attribute {
		return reject("Invalid object type attribute in LOOKUP command");
	}
	if let Some(matcher) = &lookup.matcher {
		check_matcher(&Context::new(Scope::Object(lookup.kind)), matcher)?;
	}
	if let Some(filter) = &lookup.filter {
		check_matcher(&Context::new(Scope::Filter), filter)?;
	}
	Ok(())
}

fn analyze_store(store: &ast::Store) -> Result<(), Error> {
	let kind = store.kind;
	if store.name.is_empty() {
		return reject(format!("Missing object name in STORE {kind} command"));
	}
	match (&kind, &store.hostname) {
		(EntityKind::Host, Some(hostname)) => {
			return reject(format!(
				"Unexpected parent hostname '{hostname}' in STORE HOST command"
			));
		}
		(EntityKind::Host, None) => {}
		(_, None) => {
			return reject(format!(
				"Missing parent hostname for '{}' in STORE {kind} command",
				store.name
			));
		}
		(_, Some(_)) => {}
	}
	if kind == EntityKind::Attribute {
		match (&store.parent_kind, &store.parent) {
			(None, Some(parent)) => {
				return reject(format!(
					"Unexpected parent name '{parent}' in STORE attribute command"
				));
			}
			(Some(parent_kind), _)
				if !matches!(parent_kind, EntityKind::Service | EntityKind::Metric) =>
			{
				return reject(format!(
					"Invalid parent type {parent_kind} in STORE attribute command"
				));
			}
			(Some(parent_kind), None) => {
				return reject(format!(
					"Missing {parent_kind} parent name in STORE attribute command"
				));
			}
			_ => {}
		}
	} else if store.parent_kind.is_some() || store.parent.is_some() {
		return reject(format!(
			"Unexpected {} parent name '{}' in STORE {kind} command",
			store.parent_kind.map(|k| k.to_string()).unwrap_or_else(|| "<unknown>".to_owned()),
			store.parent.as_deref().unwrap_or("<unknown>")
		));
	}
	if kind == EntityKind::Metric {
		if store.store_type.is_some() != store.store_id.is_some() {
			return reject(format!(
				"Incomplete metric store {} {} in STORE METRIC command",
				store.store_type.as_deref().unwrap_or("<unknown>"),
				store.store_id.as_deref().unwrap_or("<unknown>")
			));
		}
	} else if store.store_type.is_some() || store.store_id.is_some() {
		return reject(format!(
			"Unexpected metric store {} {} in STORE {kind} command",
			store.store_type.as_deref().unwrap_or("<unknown>"),
			store.store_id.as_deref().unwrap_or("<unknown>")
		));
	}
	if kind != EntityKind::Attribute && !store.value.is_null() {
		return reject(format!(
			"Unexpected value {} in STORE {kind} command",
			store.value.format(crate::data::Style::DoubleQuoted)
		));
	}
	Ok(())
}

fn analyze_timeseries(ts: &ast::Timeseries) -> Result<(), Error> {
	if ts.hostname.is_empty() {
		return reject("Missing hostname in TIMESERIES command");
	}
	if ts.metric.is_empty() {
		return reject("Missing metric name in TIMESERIES command");
	}
	if ts.end <= ts.start {
		return reject(format!(
			"Start time ({}) greater than end time ({}) in TIMESERIES command",
			ts.start, ts.end
		));
	}
	Ok(())
}

fn check_matcher(ctx: &Context, matcher: &Matcher) -> Result<(), Error> {
	match matcher {
		Matcher::And(left, right) | Matcher::Or(left, right) => {
			check_matcher(ctx, left)?;
			check_matcher(ctx, right)
		}
		Matcher::Not(inner) => check_matcher(ctx, inner),
		Matcher::Cmp {
			op,
			left,
			right,
		} => {
			let lt = check_expr(ctx, left)?;
			let rt = check_expr(ctx, right)?;
			// arrays only take part in membership tests
			for t in [&lt, &rt] {
				if matches!(t, Some(kind) if kind.is_array()) {
					return reject(format!(
						"Invalid operation {} {op} {} (array not allowed)",
						type_name(&lt),
						type_name(&rt)
					));
				}
			}
			if let (Some(l), Some(r)) = (&lt, &rt) {
				if l != r {
					return reject(format!(
						"Invalid operation {l} {op} {r} (type mismatch)"
					));
				}
			}
			Ok(())
		}
		Matcher::In {
			left,
			right,
		} => {
			let lt = check_expr(ctx, left)?;
			let rt = check_expr(ctx, right)?;
			if matches!(&rt, Some(kind) if !kind.is_array()) {
				return reject(format!(
					"Invalid operation {} IN {} (array expected)",
					type_name(&lt),
					type_name(&rt)
				));
			}
			// the left operand may be a scalar or an array, but the element
			// types have to match
			if let (Some(l), Some(r)) = (&lt, &rt) {
				let elem = |k: &Kind| k.elem().cloned().unwrap_or_else(|| k.clone());
				if elem(l) != elem(r) {
					return reject(format!(
						"Invalid operation {l} IN {r} (type mismatch)"
					));
				}
			}
			Ok(())
		}
		Matcher::Regex {
			negated,
			left,
			right,
			..
		} => {
			let lt = check_expr(ctx, left)?;
			let rt = check_expr(ctx, right)?;
			// any left operand matches through its textual form
			if matches!(&rt, Some(kind) if !matches!(kind, Kind::Regex | Kind::String)) {
				return reject(format!(
					"Invalid operation {} {} {} (invalid regex)",
					type_name(&lt),
					if *negated { "!~" } else { "=~" },
					type_name(&rt)
				));
			}
			Ok(())
		}
		Matcher::IsNull(expr) | Matcher::IsTrue(expr) | Matcher::IsFalse(expr) => {
			check_expr(ctx, expr).map(|_| ())
		}
		Matcher::Any {
			input,
			cond,
		}
		| Matcher::All {
			input,
			cond,
		} => {
			let quantifier = match matcher {
				Matcher::Any {
					..
				} => "ANY",
				_ => "ALL",
			};
			if ctx.in_iter {
				return reject(format!(
					"Invalid iterator {quantifier} {input} (nested iterators are not supported)"
				));
			}
			check_quantifier(ctx, quantifier, input, cond)
		}
	}
}

/// Validates the bound sequence of an ANY/ALL quantifier and analyzes its
/// condition in the element context.
fn check_quantifier(
	ctx: &Context,
	quantifier: &str,
	input: &Expression,
	cond: &Matcher,
) -> Result<(), Error> {
	match input {
		// the child set of a kind; the condition sees each child object
		Expression::Typed {
			kind,
			expr: None,
		} => {
			let valid = match ctx.scope {
				Scope::Object(EntityKind::Host) => matches!(
					kind,
					EntityKind::Service | EntityKind::Metric | EntityKind::Attribute
				),
				Scope::Object(EntityKind::Service) | Scope::Object(EntityKind::Metric) => {
					*kind == EntityKind::Attribute
				}
				Scope::Object(EntityKind::Attribute) => false,
				// every object a filter sees has attributes; services and
				// metrics would only iterate for some of them
				Scope::Filter => *kind == EntityKind::Attribute,
			};
			if !valid {
				return reject(format!(
					"Invalid expression {kind} in {} context",
					ctx.scope
				));
			}
			let cond_ctx = Context {
				scope: Scope::Object(*kind),
				in_iter: true,
				element: None,
			};
			check_matcher(&cond_ctx, cond)
		}
		// value sequences bind each element for the condition
		Expression::Field(Field::Backend) => {
			let cond_ctx = Context {
				in_iter: true,
				element: Some(Some(Kind::String)),
				..ctx.clone()
			};
			check_matcher(&cond_ctx, cond)
		}
		Expression::Constant(Value::Array(array)) => {
			let cond_ctx = Context {
				in_iter: true,
				element: Some(array.elem_kind()),
				..ctx.clone()
			};
			check_matcher(&cond_ctx, cond)
		}
		Expression::Field(field) => reject(format!(
			"Invalid iterator {quantifier}: cannot iterate '{field}' (scalar value)"
		)),
		Expression::Attribute(name) => reject(format!(
			"Invalid iterator {quantifier}: cannot iterate attribute[{name}] (scalar value)"
		)),
		other => reject(format!(
			"Invalid iterator {quantifier}: cannot iterate {other} (scalar value)"
		)),
	}
}

/// Infers the static result type of an expression; `None` means unknown.
fn check_expr(ctx: &Context, expr: &Expression) -> Result<Option<Kind>, Error> {
	match expr {
		Expression::Constant(value) => Ok(value.kind()),
		Expression::Element => match &ctx.element {
			Some(kind) => Ok(kind.clone()),
			None => Err(Error::Type(
				"Invalid expression '.' outside of an iterator".to_owned(),
			)),
		},
		Expression::Field(field) => {
			match field {
				Field::Value if ctx.scope != Scope::Object(EntityKind::Attribute) => {
					return Err(Error::Type(format!(
						"Invalid expression {}.value",
						ctx.scope
					)));
				}
				Field::Timeseries if ctx.scope != Scope::Object(EntityKind::Metric) => {
					return Err(Error::Type(format!(
						"Invalid expression {}.timeseries",
						ctx.scope
					)));
				}
				_ => {}
			}
			Ok(field.kind())
		}
		Expression::Attribute(name) => {
			if name.is_empty() {
				return Err(Error::Type(
					"Invalid expression attribute[] (missing name)".to_owned(),
				));
			}
			// attribute values are untyped until evaluation
			Ok(None)
		}
		Expression::Typed {
			kind,
			expr: inner,
		} => {
			let Some(inner) = inner else {
				// a bare child set only means something as an iterator source
				return Err(Error::Type(format!(
					"Invalid expression {kind} in {} context",
					ctx.scope
				)));
			};
			let valid = match ctx.scope {
				// self-references and references to the parent host
				Scope::Object(obj) => {
					obj == *kind || (*kind == EntityKind::Host && obj != EntityKind::Attribute)
				}
				Scope::Filter => *kind == EntityKind::Host,
			};
			if !valid {
				return Err(Error::Type(format!(
					"Invalid expression {kind}.{inner} in {} context",
					ctx.scope
				)));
			}
			let inner_ctx = Context {
				scope: Scope::Object(*kind),
				..ctx.clone()
			};
			check_expr(&inner_ctx, inner)
		}
		Expression::Binary {
			op,
			left,
			right,
		} => {
			let lt = check_expr(ctx, left)?;
			let rt = check_expr(ctx, right)?;
			match (&lt, &rt) {
				(Some(l), Some(r)) => match Value::expr_kind(*op, l, r) {
					Some(kind) => Ok(Some(kind)),
					None => Err(Error::Type(format!(
						"Invalid operation {l} {op} {r} (type mismatch)"
					))),
				},
				_ => Ok(None),
			}
		}
	}
}

fn type_name(kind: &Option<Kind>) -> String {
	match kind {
		Some(kind) => kind.to_string(),
		None => "UNKNOWN".to_owned(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data::Datetime;
	use crate::expr::CmpOp;
	use rstest::rstest;

	fn eq(left: Expression, right: Expression) -> Matcher {
		Matcher::cmp(CmpOp::Eq, left, right)
	}

	fn lookup(kind: EntityKind, matcher: Matcher) -> Query {
		Query::Lookup(ast::Lookup {
			kind,
			matcher: Some(matcher),
			filter: None,
		})
	}

	fn message(query: &Query) -> String {
		match analyze(query) {
			Err(Error::Type(msg)) => msg,
			other => panic!("expected a type error, got {other:?}"),
		}
	}

	#[test]
	fn well_typed_lookups_pass() {
		let m = eq(Expression::field(Field::Name), Expression::constant("web1"))
			.and(Matcher::any(
				Expression::children(EntityKind::Attribute),
				eq(Expression::field(Field::Name), Expression::constant("arch")),
			))
			.or(Matcher::IsNull(Expression::attribute("missing")));
		assert!(analyze(&lookup(EntityKind::Host, m)).is_ok());
	}

	#[test]
	fn value_field_is_attribute_only() {
		let q = lookup(
			EntityKind::Host,
			eq(Expression::field(Field::Value), Expression::constant(1i64)),
		);
		assert_eq!(message(&q), "Invalid expression host.value");
	}

	#[test]
	fn timeseries_field_is_metric_only() {
		let q = lookup(EntityKind::Service, Matcher::IsTrue(Expression::field(Field::Timeseries)));
		assert_eq!(message(&q), "Invalid expression service.timeseries");
		let q = lookup(EntityKind::Metric, Matcher::IsTrue(Expression::field(Field::Timeseries)));
		assert!(analyze(&q).is_ok());
	}

	#[test]
	fn scalar_paths_cannot_be_iterated() {
		let q = lookup(
			EntityKind::Host,
			Matcher::any(
				Expression::typed(EntityKind::Attribute, Expression::field(Field::Value)),
				eq(Expression::Element, Expression::constant(1i64)),
			),
		);
		assert_eq!(
			message(&q),
			"Invalid iterator ANY: cannot iterate attribute.value (scalar value)"
		);
		let q = lookup(
			EntityKind::Host,
			Matcher::any(
				Expression::field(Field::Name),
				eq(Expression::Element, Expression::constant("x")),
			),
		);
		assert_eq!(
			message(&q),
			"Invalid iterator ANY: cannot iterate 'name' (scalar value)"
		);
	}

	#[test]
	fn iterators_do_not_nest() {
		let inner = Matcher::any(
			Expression::field(Field::Backend),
			eq(Expression::Element, Expression::constant("b")),
		);
		let q = lookup(
			EntityKind::Host,
			Matcher::any(Expression::children(EntityKind::Service), inner),
		);
		assert_eq!(
			message(&q),
			"Invalid iterator ANY backend (nested iterators are not supported)"
		);
	}

	#[rstest]
	#[case::service_in_service(EntityKind::Service, EntityKind::Service)]
	#[case::service_in_metric(EntityKind::Metric, EntityKind::Service)]
	#[case::metric_in_attribute(EntityKind::Attribute, EntityKind::Metric)]
	fn child_sets_must_match_the_context(
		#[case] scope: EntityKind,
		#[case] child: EntityKind,
	) {
		let m = Matcher::any(
			Expression::children(child),
			eq(Expression::field(Field::Name), Expression::constant("x")),
		);
		match analyze_matcher(scope, &m) {
			Err(Error::Type(msg)) => {
				assert_eq!(msg, format!("Invalid expression {child} in {scope} context"));
			}
			other => panic!("expected a type error, got {other:?}"),
		}
	}

	#[test]
	fn cross_type_comparisons_are_rejected() {
		let q = lookup(
			EntityKind::Host,
			eq(Expression::field(Field::Name), Expression::constant(42i64)),
		);
		assert_eq!(message(&q), "Invalid operation STRING = INTEGER (type mismatch)");
	}

	#[test]
	fn arrays_do_not_compare() {
		let q = lookup(
			EntityKind::Host,
			eq(
				Expression::field(Field::Backend),
				Expression::constant(Value::from(vec![Value::from("b")])),
			),
		);
		assert_eq!(
			message(&q),
			"Invalid operation [STRING] = [STRING] (array not allowed)"
		);
	}

	#[test]
	fn membership_needs_an_array() {
		let q = lookup(
			EntityKind::Host,
			Matcher::In {
				left: Expression::field(Field::Name),
				right: Expression::constant("web1"),
			},
		);
		assert_eq!(message(&q), "Invalid operation STRING IN STRING (array expected)");
		let q = lookup(
			EntityKind::Host,
			Matcher::In {
				left: Expression::field(Field::Name),
				right: Expression::constant(Value::from(vec![Value::from(1i64)])),
			},
		);
		assert_eq!(
			message(&q),
			"Invalid operation STRING IN [INTEGER] (type mismatch)"
		);
	}

	#[test]
	fn regex_operands_must_be_patterns() {
		let q = lookup(
			EntityKind::Host,
			Matcher::regex(Expression::field(Field::Name), Expression::constant(42i64)),
		);
		assert_eq!(message(&q), "Invalid operation STRING =~ INTEGER (invalid regex)");
	}

	#[test]
	fn arithmetic_types_follow_the_oracle() {
		let sum = Expression::Binary {
			op: crate::data::Operator::Add,
			left: Box::new(Expression::field(Field::Age)),
			right: Box::new(Expression::field(Field::Interval)),
		};
		let q = lookup(
			EntityKind::Host,
			Matcher::cmp(
				CmpOp::Gt,
				sum,
				Expression::constant(Value::Datetime(Datetime(0))),
			),
		);
		assert!(analyze(&q).is_ok());
		let bad = Expression::Binary {
			op: crate::data::Operator::Add,
			left: Box::new(Expression::field(Field::Name)),
			right: Box::new(Expression::constant(1i64)),
		};
		let q = lookup(EntityKind::Host, Matcher::IsNull(bad));
		assert_eq!(message(&q), "Invalid operation STRING + INTEGER (type mismatch)");
	}

	#[test]
	fn fetch_parent_matrix() {
		let q = Query::Fetch(ast::Fetch {
			kind: EntityKind::Host,
			hostname: Some("h1".to_owned()),
			name: "h1".to_owned(),
			filter: None,
		});
		assert_eq!(
			message(&q),
			"Unexpected parent hostname 'h1' in FETCH HOST command"
		);
		let q = Query::Fetch(ast::Fetch {
			kind: EntityKind::Service,
			hostname: None,
			name: "s1".to_owned(),
			filter: None,
		});
		assert_eq!(
			message(&q),
			"Missing parent hostname for 's1' in FETCH service command"
		);
		let q = Query::Fetch(ast::Fetch {
			kind: EntityKind::Attribute,
			hostname: Some("h1".to_owned()),
			name: "k".to_owned(),
			filter: None,
		});
		assert_eq!(message(&q), "Invalid object type attribute in FETCH command");
	}

	#[test]
	fn store_argument_matrix() {
		let mut host = ast::Store::host("h1", None);
		host.hostname = Some("other".to_owned());
		assert_eq!(
			message(&Query::Store(host)),
			"Unexpected parent hostname 'other' in STORE HOST command"
		);

		let mut metric = ast::Store::metric("h1", "m1", None);
		metric.store_type = Some("rrdtool".to_owned());
		assert_eq!(
			message(&Query::Store(metric)),
			"Incomplete metric store rrdtool <unknown> in STORE METRIC command"
		);

		let mut service = ast::Store::service("h1", "s1", None);
		service.value = Value::from("nope");
		assert_eq!(
			message(&Query::Store(service)),
			"Unexpected value \"nope\" in STORE service command"
		);

		let mut attr = ast::Store::attribute("h1", "k", Value::from(1i64), None);
		attr.parent_kind = Some(EntityKind::Service);
		assert_eq!(
			message(&Query::Store(attr)),
			"Missing service parent name in STORE attribute command"
		);
	}

	#[test]
	fn timeseries_window_must_be_ordered() {
		let q = Query::Timeseries(ast::Timeseries {
			hostname: "h".to_owned(),
			metric: "m".to_owned(),
			start: Datetime(10),
			end: Datetime(5),
		});
		let msg = message(&q);
		assert!(msg.starts_with("Start time ("));
		assert!(msg.ends_with(") in TIMESERIES command"));
	}
}
