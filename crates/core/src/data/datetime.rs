use crate::err::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The calendar rendering used everywhere a datetime becomes text. The
/// fraction is omitted when the timestamp falls on a whole second, so
/// formatting and parsing round-trip at nanosecond precision.
const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// A point in time as nanoseconds since the UNIX epoch, always UTC.
#[derive(
	Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Datetime(pub u64);

impl Datetime {
	/// The current wall-clock time.
	pub fn now() -> Self {
		let ns = Utc::now().timestamp_nanos_opt().unwrap_or_default();
		Self(ns.max(0) as u64)
	}

	pub fn as_nanos(&self) -> u64 {
		self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == 0
	}

	/// Nanoseconds elapsed between `self` and the (not earlier) instant
	/// `now`.
	pub fn age(&self, now: Datetime) -> Datetime {
		Datetime(now.0.saturating_sub(self.0))
	}

	fn to_chrono(self) -> DateTime<Utc> {
		Utc.timestamp_nanos(self.0 as i64)
	}
}

impl From<u64> for Datetime {
	fn from(ns: u64) -> Self {
		Self(ns)
	}
}

impl From<Datetime> for u64 {
	fn from(dt: Datetime) -> Self {
		dt.0
	}
}

impl FromStr for Datetime {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// Adapters hand over raw nanosecond counts; clients write calendar
		// timestamps.
		if let Ok(ns) = s.parse::<u64>() {
			return Ok(Self(ns));
		}
		let parsed = DateTime::parse_from_str(s, FORMAT).map_err(|_| Error::Parse {
			input: s.to_owned(),
			kind: "DATETIME".to_owned(),
		})?;
		let ns = parsed.timestamp_nanos_opt().ok_or_else(|| Error::Parse {
			input: s.to_owned(),
			kind: "DATETIME".to_owned(),
		})?;
		Ok(Self(ns.max(0) as u64))
	}
}

impl Display for Datetime {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "{}", self.to_chrono().format(FORMAT))
	}
}
