//! Agni - Prometheus to collectd metrics bridge
//!
//! Reads a manifest of named series, evaluates each series' Prometheus query
//! on a fixed interval and writes the result as a collectd `PUTVAL` line:
//! - Manifest loading and series validation
//! - Querier capability (Prometheus HTTP API implementation)
//! - One independent polling task per series
//! - collectd exec-plugin line formatting

pub mod config;
pub mod emitter;
pub mod manifest;
pub mod poller;
pub mod querier;

pub use emitter::{LineSink, PutVal, StdioSink};
pub use manifest::{ManifestError, Plugin, Series, SeriesKind};
pub use poller::{Clock, PollOutcome, Poller, SystemClock};
pub use querier::{QueryError, Querier};
