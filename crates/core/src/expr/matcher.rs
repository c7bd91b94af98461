use crate::data::{Regex, Style, Value};
use crate::expr::{EvalCtx, Expression};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use unicase::UniCase;

/// Three-valued matching result. Indeterminate answers arise from missing
/// attributes, type-mismatched comparisons and failed evaluations; at the
/// root of a matcher they mean "skip".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Truth {
	True,
	False,
	Unknown,
}

impl Truth {
	pub fn is_true(&self) -> bool {
		*self == Self::True
	}

	pub fn and(self, other: Truth) -> Truth {
		match (self, other) {
			(Self::False, _) | (_, Self::False) => Self::False,
			(Self::True, Self::True) => Self::True,
			_ => Self::Unknown,
		}
	}

	pub fn or(self, other: Truth) -> Truth {
		match (self, other) {
			(Self::True, _) | (_, Self::True) => Self::True,
			(Self::False, Self::False) => Self::False,
			_ => Self::Unknown,
		}
	}

	/// Negation flips true and false; indeterminate stays indeterminate.
	pub fn not(self) -> Truth {
		match self {
			Self::True => Self::False,
			Self::False => Self::True,
			Self::Unknown => Self::Unknown,
		}
	}
}

impl From<bool> for Truth {
	fn from(b: bool) -> Self {
		if b {
			Self::True
		} else {
			Self::False
		}
	}
}

/// Comparison operators over scalar values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
	Lt,
	Le,
	Eq,
	Ne,
	Ge,
	Gt,
}

impl CmpOp {
	fn check(&self, ord: Ordering) -> bool {
		match self {
			Self::Lt => ord == Ordering::Less,
			Self::Le => ord != Ordering::Greater,
			Self::Eq => ord == Ordering::Equal,
			Self::Ne => ord != Ordering::Equal,
			Self::Ge => ord != Ordering::Less,
			Self::Gt => ord == Ordering::Greater,
		}
	}
}

impl Display for CmpOp {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Lt => f.write_str("<"),
			Self::Le => f.write_str("<="),
			Self::Eq => f.write_str("="),
			Self::Ne => f.write_str("!="),
			Self::Ge => f.write_str(">="),
			Self::Gt => f.write_str(">"),
		}
	}
}

/// A matcher tree node, producing a [`Truth`] against a stored object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Matcher {
	And(Box<Matcher>, Box<Matcher>),
	Or(Box<Matcher>, Box<Matcher>),
	Not(Box<Matcher>),
	/// Typed comparison of two scalar expressions.
	Cmp {
		op: CmpOp,
		left: Expression,
		right: Expression,
	},
	/// Membership test; the right operand must evaluate to an array.
	In {
		left: Expression,
		right: Expression,
	},
	/// Regular-expression match. The left operand is coerced to its
	/// unquoted textual form; a constant string pattern is compiled at
	/// first use and cached for the lifetime of the node.
	Regex {
		negated: bool,
		left: Expression,
		right: Expression,
		#[serde(skip)]
		cache: OnceCell<Option<Regex>>,
	},
	/// True iff the operand evaluates to NULL, including "attribute
	/// absent".
	IsNull(Expression),
	IsTrue(Expression),
	IsFalse(Expression),
	/// True iff any element of the sequence satisfies the condition; false
	/// for the empty sequence.
	Any {
		input: Expression,
		cond: Box<Matcher>,
	},
	/// True iff every element of the sequence satisfies the condition; true
	/// for the empty sequence.
	All {
		input: Expression,
		cond: Box<Matcher>,
	},
}

impl Matcher {
	pub fn and(self, other: Matcher) -> Matcher {
		Matcher::And(Box::new(self), Box::new(other))
	}

	pub fn or(self, other: Matcher) -> Matcher {
		Matcher::Or(Box::new(self), Box::new(other))
	}

	#[allow(clippy::should_implement_trait)]
	pub fn not(self) -> Matcher {
		Matcher::Not(Box::new(self))
	}

	pub fn cmp(op: CmpOp, left: Expression, right: Expression) -> Matcher {
		Matcher::Cmp {
			op,
			left,
			right,
		}
	}

	pub fn regex(left: Expression, right: Expression) -> Matcher {
		Matcher::Regex {
			negated: false,
			left,
			right,
			cache: OnceCell::new(),
		}
	}

	pub fn nregex(left: Expression, right: Expression) -> Matcher {
		Matcher::Regex {
			negated: true,
			left,
			right,
			cache: OnceCell::new(),
		}
	}

	pub fn any(input: Expression, cond: Matcher) -> Matcher {
		Matcher::Any {
			input,
			cond: Box::new(cond),
		}
	}

	pub fn all(input: Expression, cond: Matcher) -> Matcher {
		Matcher::All {
			input,
			cond: Box::new(cond),
		}
	}

	/// Evaluates this matcher against the context object.
	pub fn matches(&self, ctx: &EvalCtx) -> Truth {
		match self {
			Self::And(left, right) => {
				let l = left.matches(ctx);
				// short-circuit on the decisive value
				if l == Truth::False {
					return Truth::False;
				}
				l.and(right.matches(ctx))
			}
			Self::Or(left, right) => {
				let l = left.matches(ctx);
				if l == Truth::True {
					return Truth::True;
				}
				l.or(right.matches(ctx))
			}
			Self::Not(inner) => inner.matches(ctx).not(),
			Self::Cmp {
				op,
				left,
				right,
			} => {
				let (Ok(l), Ok(r)) = (left.eval(ctx), right.eval(ctx)) else {
					return Truth::Unknown;
				};
				if l.is_null() || r.is_null() {
					return Truth::Unknown;
				}
				// object names compare case-insensitively
				if left.is_name() || right.is_name() {
					if let (Value::String(a), Value::String(b)) = (&l, &r) {
						let ord = UniCase::new(a.as_str()).cmp(&UniCase::new(b.as_str()));
						return Truth::from(op.check(ord));
					}
				}
				match l.compare(&r) {
					Some(ord) => Truth::from(op.check(ord)),
					None => Truth::Unknown,
				}
			}
			Self::In {
				left,
				right,
			} => {
				let (Ok(l), Ok(r)) = (left.eval(ctx), right.eval(ctx)) else {
					return Truth::Unknown;
				};
				let Value::Array(elements) = r else {
					return Truth::Unknown;
				};
				match l {
					Value::Null => Truth::Unknown,
					Value::Array(members) => {
						Truth::from(members.iter().all(|m| elements.contains(m)))
					}
					value => Truth::from(elements.contains(&value)),
				}
			}
			Self::Regex {
				negated,
				left,
				right,
				cache,
			} => {
				let value = match left.eval(ctx) {
					Ok(Value::Null) | Err(_) => return Truth::Unknown,
					Ok(value) => value,
				};
				let text = value.format(Style::Unquoted);
				let matched = match right {
					Expression::Constant(Value::Regex(re)) => re.is_match(&text),
					Expression::Constant(Value::String(pattern)) => {
						match cache.get_or_init(|| pattern.parse().ok()) {
							Some(re) => re.is_match(&text),
							None => return Truth::Unknown,
						}
					}
					expr => match expr.eval(ctx) {
						Ok(Value::Regex(re)) => re.is_match(&text),
						Ok(Value::String(pattern)) => match pattern.parse::<Regex>() {
							Ok(re) => re.is_match(&text),
							Err(_) => return Truth::Unknown,
						},
						_ => return Truth::Unknown,
					},
				};
				let truth = Truth::from(matched);
				if *negated {
					truth.not()
				} else {
					truth
				}
			}
			Self::IsNull(expr) => match expr.eval(ctx) {
				Ok(value) => Truth::from(value.is_null()),
				Err(_) => Truth::Unknown,
			},
			Self::IsTrue(expr) => match expr.eval(ctx) {
				Ok(value) => match value.as_bool() {
					Some(b) => Truth::from(b),
					None => Truth::Unknown,
				},
				Err(_) => Truth::Unknown,
			},
			Self::IsFalse(expr) => match expr.eval(ctx) {
				Ok(value) => match value.as_bool() {
					Some(b) => Truth::from(!b),
					None => Truth::Unknown,
				},
				Err(_) => Truth::Unknown,
			},
			Self::Any {
				input,
				cond,
			} => quantify(input, cond, ctx, Quantifier::Any),
			Self::All {
				input,
				cond,
			} => quantify(input, cond, ctx, Quantifier::All),
		}
	}
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Quantifier {
	Any,
	All,
}

/// Runs the inner matcher once per element of the bound sequence. Child
/// sets bind the child object as the element context; value sequences bind
/// the value to [`Expression::Element`]. ANY is true as soon as one element
/// matches and false over the empty sequence; ALL dually.
fn quantify(input: &Expression, cond: &Matcher, ctx: &EvalCtx, q: Quantifier) -> Truth {
	let mut unknown = false;
	let mut check = |truth: Truth| -> Option<Truth> {
		match (q, truth) {
			(Quantifier::Any, Truth::True) => Some(Truth::True),
			(Quantifier::All, Truth::False) => Some(Truth::False),
			(_, Truth::Unknown) => {
				unknown = true;
				None
			}
			_ => None,
		}
	};
	if let Expression::Typed {
		kind,
		expr: None,
	} = input
	{
		for child in ctx.obj.children(*kind) {
			let child_ctx = EvalCtx {
				obj: child,
				..*ctx
			};
			if let Some(decisive) = check(cond.matches(&child_ctx)) {
				return decisive;
			}
		}
	} else {
		let Ok(items) = input.eval_iter(ctx) else {
			return Truth::Unknown;
		};
		for item in &items {
			let elem_ctx = EvalCtx {
				element: Some(item),
				..*ctx
			};
			if let Some(decisive) = check(cond.matches(&elem_ctx)) {
				return decisive;
			}
		}
	}
	match (q, unknown) {
		(_, true) => Truth::Unknown,
		(Quantifier::Any, false) => Truth::False,
		(Quantifier::All, false) => Truth::True,
	}
}

impl Display for Matcher {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::And(l, r) => write!(f, "({l} AND {r})"),
			Self::Or(l, r) => write!(f, "({l} OR {r})"),
			Self::Not(m) => write!(f, "(NOT {m})"),
			Self::Cmp {
				op,
				left,
				right,
			} => write!(f, "{left} {op} {right}"),
			Self::In {
				left,
				right,
			} => write!(f, "{left} IN {right}"),
			Self::Regex {
				negated,
				left,
				right,
				..
			} => write!(f, "{left} {} {right}", if *negated { "!~" } else { "=~" }),
			Self::IsNull(e) => write!(f, "{e} IS NULL"),
			Self::IsTrue(e) => write!(f, "{e} IS TRUE"),
			Self::IsFalse(e) => write!(f, "{e} IS FALSE"),
			Self::Any {
				input,
				cond,
			} => write_iter(f, "ANY", input, cond),
			Self::All {
				input,
				cond,
			} => write_iter(f, "ALL", input, cond),
		}
	}
}

fn write_iter(
	f: &mut Formatter,
	quantifier: &str,
	input: &Expression,
	cond: &Matcher,
) -> fmt::Result {
	// the usual shapes quantify a comparison over the element itself or
	// over one of its fields
	match cond {
		Matcher::Cmp {
			op,
			left: Expression::Element,
			right,
		} => write!(f, "{quantifier} {input} {op} {right}"),
		Matcher::Cmp {
			op,
			left: Expression::Field(field),
			right,
		} => write!(f, "{quantifier} {input}.{field} {op} {right}"),
		_ => write!(f, "{quantifier} {input} MATCHING {cond}"),
	}
}
