/*!
# Agni DevKit - Test doubles for the bridge

Helpers for exercising pollers without a Prometheus server:
- Scripted querier (values, failures, latency, call log)
- Recording sink for `PUTVAL` and diagnostic lines
- Clock driven by tokio's pausable time
- Harness wiring them into a `Poller`
*/

pub mod querier_stub;
pub mod test_utils;

pub use querier_stub::{MockQuerier, QueryCall};
pub use test_utils::{RecordingSink, TestClock, TestHarness};
