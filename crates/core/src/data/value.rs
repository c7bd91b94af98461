use crate::data::array::Array;
use crate::data::bytes::Bytes;
use crate::data::datetime::Datetime;
use crate::data::kind::Kind;
use crate::data::operator::Operator;
use crate::data::regex::Regex;
use crate::err::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

/// Quoting style for [`Value::format`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Style {
	#[default]
	Unquoted,
	SingleQuoted,
	DoubleQuoted,
}

/// A single datum: an attribute value, a query constant, or the result of
/// evaluating an expression against a stored object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Value {
	#[default]
	Null,
	Integer(i64),
	Decimal(f64),
	String(String),
	Datetime(Datetime),
	Binary(Bytes),
	Regex(Regex),
	Array(Array),
}

impl Value {
	/// The static tag of this value; NULL has none.
	pub fn kind(&self) -> Option<Kind> {
		match self {
			Self::Null => None,
			Self::Integer(_) => Some(Kind::Integer),
			Self::Decimal(_) => Some(Kind::Decimal),
			Self::String(_) => Some(Kind::String),
			Self::Datetime(_) => Some(Kind::Datetime),
			Self::Binary(_) => Some(Kind::Binary),
			Self::Regex(_) => Some(Kind::Regex),
			Self::Array(a) => a.elem_kind().map(|elem| Kind::Array(Box::new(elem))),
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// The boolean reading used by ISTRUE / ISFALSE: integers are booleans,
	/// everything else has no truth value.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Integer(n) => Some(*n != 0),
			_ => None,
		}
	}

	/// Typed comparison. Total within one tag; comparisons across tags, with
	/// NULL, with NaN, or against regexes are indeterminate.
	pub fn compare(&self, other: &Value) -> Option<Ordering> {
		match (self, other) {
			(Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
			(Self::Decimal(a), Self::Decimal(b)) => a.partial_cmp(b),
			(Self::String(a), Self::String(b)) => Some(a.cmp(b)),
			(Self::Datetime(a), Self::Datetime(b)) => Some(a.cmp(b)),
			(Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
			_ => None,
		}
	}

	/// Typed equality; `None` when the comparison is indeterminate.
	pub fn equal(&self, other: &Value) -> Option<bool> {
		self.compare(other).map(|ord| ord == Ordering::Equal)
	}

	/// Renders this value as text. Formatting is total: every value has a
	/// representation in every style.
	pub fn format(&self, style: Style) -> String {
		match self {
			Self::Null => "NULL".to_owned(),
			Self::Integer(n) => n.to_string(),
			Self::Decimal(d) => d.to_string(),
			Self::String(s) => match style {
				Style::Unquoted => s.clone(),
				Style::SingleQuoted => quote(s, '\''),
				Style::DoubleQuoted => quote(s, '"'),
			},
			Self::Datetime(dt) => quote_plain(&dt.to_string(), style),
			Self::Binary(b) => quote_plain(&b.to_string(), style),
			Self::Regex(re) => quote_plain(&re.to_string(), style),
			Self::Array(a) => {
				let mut out = String::from("[");
				for (i, elem) in a.iter().enumerate() {
					if i > 0 {
						out.push_str(", ");
					}
					out.push_str(&elem.format(style));
				}
				out.push(']');
				out
			}
		}
	}

	/// Parses the unquoted textual form back into a value of the given
	/// kind. Array literals are assembled by the query parser from their
	/// elements and cannot be parsed from flat text.
	pub fn parse(input: &str, kind: &Kind) -> Result<Value, Error> {
		let err = || Error::Parse {
			input: input.to_owned(),
			kind: kind.to_string(),
		};
		match kind {
			Kind::Integer => input.trim().parse().map(Value::Integer).map_err(|_| err()),
			Kind::Decimal => input.trim().parse().map(Value::Decimal).map_err(|_| err()),
			Kind::String => Ok(Value::String(input.to_owned())),
			Kind::Datetime => input.parse().map(Value::Datetime),
			Kind::Binary => input.parse().map(Value::Binary),
			Kind::Regex => input.parse().map(Value::Regex),
			Kind::Array(_) => Err(Error::Argument(format!(
				"Cannot parse array literal '{input}'"
			))),
		}
	}

	/// Static result type of `a op b`: a pure function of the two tags,
	/// consumed by the analyzer. `None` means the operands are incompatible.
	pub fn expr_kind(op: Operator, a: &Kind, b: &Kind) -> Option<Kind> {
		match (op, a, b) {
			(Operator::Concat, Kind::String, Kind::String) => Some(Kind::String),
			(Operator::Concat, Kind::Binary, Kind::Binary) => Some(Kind::Binary),
			(Operator::Concat, _, _) => None,
			(Operator::Add, Kind::String, Kind::String) => Some(Kind::String),
			(_, Kind::Integer, Kind::Integer) => Some(Kind::Integer),
			(_, Kind::Integer, Kind::Decimal)
			| (_, Kind::Decimal, Kind::Integer)
			| (_, Kind::Decimal, Kind::Decimal) => Some(Kind::Decimal),
			(_, Kind::Datetime, Kind::Datetime) => Some(Kind::Datetime),
			_ => None,
		}
	}

	/// Concrete arithmetic. Type mismatches here mean the analyzer was
	/// bypassed; they surface as evaluation errors, as do arithmetic faults
	/// the analyzer cannot see (division by zero, datetime underflow).
	pub fn expr_eval(op: Operator, a: &Value, b: &Value) -> Result<Value, Error> {
		let fault = |reason: &str| {
			Error::Eval(format!(
				"{} {op} {} ({reason})",
				kind_name(a),
				kind_name(b)
			))
		};
		match (a, b) {
			(Value::Integer(x), Value::Integer(y)) => match op {
				Operator::Add => Ok(Value::Integer(x.wrapping_add(*y))),
				Operator::Sub => Ok(Value::Integer(x.wrapping_sub(*y))),
				Operator::Mul => Ok(Value::Integer(x.wrapping_mul(*y))),
				Operator::Div => x
					.checked_div(*y)
					.map(Value::Integer)
					.ok_or_else(|| fault("division by zero")),
				Operator::Mod => x
					.checked_rem(*y)
					.map(Value::Integer)
					.ok_or_else(|| fault("division by zero")),
				Operator::Concat => Err(fault("type mismatch")),
			},
			(Value::Decimal(_), Value::Decimal(_))
			| (Value::Decimal(_), Value::Integer(_))
			| (Value::Integer(_), Value::Decimal(_)) => {
				let (x, y) = (as_decimal(a), as_decimal(b));
				match op {
					Operator::Add => Ok(Value::Decimal(x + y)),
					Operator::Sub => Ok(Value::Decimal(x - y)),
					Operator::Mul => Ok(Value::Decimal(x * y)),
					Operator::Div => Ok(Value::Decimal(x / y)),
					Operator::Mod => Ok(Value::Decimal(x % y)),
					Operator::Concat => Err(fault("type mismatch")),
				}
			}
			(Value::Datetime(x), Value::Datetime(y)) => {
				let (x, y) = (x.as_nanos(), y.as_nanos());
				let ns = match op {
					Operator::Add => x.checked_add(y).ok_or_else(|| fault("overflow"))?,
					Operator::Sub => x.checked_sub(y).ok_or_else(|| fault("underflow"))?,
					Operator::Mul => x.checked_mul(y).ok_or_else(|| fault("overflow"))?,
					Operator::Div => x.checked_div(y).ok_or_else(|| fault("division by zero"))?,
					Operator::Mod => x.checked_rem(y).ok_or_else(|| fault("division by zero"))?,
					Operator::Concat => return Err(fault("type mismatch")),
				};
				Ok(Value::Datetime(Datetime(ns)))
			}
			(Value::String(x), Value::String(y)) if matches!(op, Operator::Add | Operator::Concat) => {
				let mut out = String::with_capacity(x.len() + y.len());
				out.push_str(x);
				out.push_str(y);
				Ok(Value::String(out))
			}
			(Value::Binary(x), Value::Binary(y)) if op == Operator::Concat => {
				let mut out = Vec::with_capacity(x.len() + y.len());
				out.extend_from_slice(x);
				out.extend_from_slice(y);
				Ok(Value::Binary(Bytes(out)))
			}
			_ => Err(fault("type mismatch")),
		}
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Integer(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Decimal(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::String(v.to_owned())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::String(v)
	}
}

impl From<Datetime> for Value {
	fn from(v: Datetime) -> Self {
		Self::Datetime(v)
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Integer(v as i64)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Self::Array(v.into())
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.write_str(&self.format(Style::Unquoted))
	}
}

fn as_decimal(v: &Value) -> f64 {
	match v {
		Value::Integer(n) => *n as f64,
		Value::Decimal(d) => *d,
		_ => f64::NAN,
	}
}

fn kind_name(v: &Value) -> String {
	match v.kind() {
		Some(kind) => kind.to_string(),
		None => "NULL".to_owned(),
	}
}

/// Wraps a string in the requested quotes, escaping the quote character,
/// backslashes, and control characters.
fn quote(s: &str, q: char) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	out.push(q);
	for c in s.chars() {
		match c {
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			c if c == q => {
				out.push('\\');
				out.push(c);
			}
			c => out.push(c),
		}
	}
	out.push(q);
	out
}

fn quote_plain(s: &str, style: Style) -> String {
	match style {
		Style::Unquoted => s.to_owned(),
		Style::SingleQuoted => format!("'{s}'"),
		Style::DoubleQuoted => format!("\"{s}\""),
	}
}
