//! The core of SysDB, a multi-backend system-information database.
//!
//! Source adapters push host, service, metric and attribute facts through
//! the [`store::Writer`] API; updates merge by timestamp, so the store
//! always reflects the latest known state regardless of arrival order.
//! Clients read through validated [`ast::Query`] values executed by
//! [`exec::execute`], which scans a consistent snapshot, evaluates typed
//! matcher trees with three-valued logic and streams matching subtrees as
//! JSON.
//!
//! Transports, source adapters, daemon bootstrap and time-series storage
//! live outside of this crate; the latter plugs in through
//! [`exec::TimeseriesBackend`].

pub mod analyzer;
pub mod ast;
pub mod data;
pub mod err;
pub mod exec;
pub mod expr;
pub mod store;

pub use crate::data::Value;
pub use crate::err::Error;
pub use crate::exec::{execute, TimeseriesBackend, TimeseriesOpts};
pub use crate::store::{EntityKind, Store, UpdateStatus};
