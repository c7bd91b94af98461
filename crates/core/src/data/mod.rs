//! The value model: every fact stored in the tree and every constant in a
//! query is a [`Value`]. Values are owned, deeply cloned, totally
//! formattable, and compared only within a single type tag.

pub(crate) mod array;
pub(crate) mod bytes;
pub(crate) mod datetime;
pub(crate) mod duration;
pub(crate) mod kind;
pub(crate) mod operator;
pub(crate) mod regex;
pub(crate) mod value;

pub use self::array::Array;
pub use self::bytes::Bytes;
pub use self::datetime::Datetime;
pub use self::duration::Duration;
pub use self::kind::Kind;
pub use self::operator::Operator;
pub use self::regex::Regex;
pub use self::value::{Style, Value};
