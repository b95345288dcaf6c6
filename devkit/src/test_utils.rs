/*!
Test harness for pollers

Wires a [`MockQuerier`], a [`RecordingSink`] and a [`TestClock`] into a
`Poller`, spawns pollers from manifest YAML and aborts them on drop. Meant to
run under `#[tokio::test(start_paused = true)]` so intervals elapse instantly.
*/

use crate::querier_stub::MockQuerier;
use agni_bridge::manifest::parse_manifest;
use agni_bridge::{Clock, LineSink, Poller};
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Sink keeping every line in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    puts: Mutex<Vec<String>>,
    diagnostics: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.lock().unwrap().clone()
    }

    /// `PUTVAL` lines whose identifier ends with `/<kind>-<name>`
    pub fn puts_for(&self, series_key: &str) -> Vec<String> {
        let needle = format!("/{} ", series_key);
        self.puts()
            .into_iter()
            .filter(|line| line.contains(&needle))
            .collect()
    }

    /// Wait until at least `count` `PUTVAL` lines were written
    pub async fn wait_for_puts(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.puts.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.puts.lock().unwrap().len() >= count
    }

    pub fn clear(&self) {
        self.puts.lock().unwrap().clear();
        self.diagnostics.lock().unwrap().clear();
    }
}

impl LineSink for RecordingSink {
    fn put(&self, line: &str) {
        self.puts.lock().unwrap().push(line.to_string());
    }

    fn diagnostic(&self, line: &str) {
        self.diagnostics.lock().unwrap().push(line.to_string());
    }
}

/// Wall clock that starts at a fixed Unix time and follows tokio's clock,
/// so it advances with paused time
#[derive(Debug, Clone)]
pub struct TestClock {
    base: DateTime<Utc>,
    origin: Instant,
}

impl TestClock {
    pub fn at(unix_secs: i64) -> Self {
        Self {
            base: Utc.timestamp_opt(unix_secs, 0).unwrap(),
            origin: Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.base + elapsed
    }
}

/// Complete poller setup with test doubles
pub struct TestHarness {
    pub querier: MockQuerier,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<TestClock>,
    hostname: String,
    interval_secs: u64,
    handles: Vec<JoinHandle<()>>,
}

impl TestHarness {
    /// Harness for `hostname`, polling every `interval_secs`, clock at Unix 1000
    pub fn new(hostname: &str, interval_secs: u64) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        Self {
            querier: MockQuerier::new(),
            sink: Arc::new(RecordingSink::new()),
            clock: Arc::new(TestClock::at(1000)),
            hostname: hostname.to_string(),
            interval_secs,
            handles: Vec::new(),
        }
    }

    pub fn with_querier(mut self, querier: MockQuerier) -> Self {
        self.querier = querier;
        self
    }

    pub fn starting_at(mut self, unix_secs: i64) -> Self {
        self.clock = Arc::new(TestClock::at(unix_secs));
        self
    }

    pub fn poller(&self) -> Poller {
        Poller::new(
            Arc::new(self.querier.clone()),
            self.sink.clone(),
            self.hostname.as_str(),
            self.interval_secs,
        )
        .with_clock(self.clock.clone())
    }

    /// Parse `manifest_yaml` and spawn its pollers; returns the poller count
    pub fn start(&mut self, manifest_yaml: &str) -> Result<usize> {
        let plugins = parse_manifest(manifest_yaml)?;
        let handles = self.poller().spawn_all(&plugins);
        let count = handles.len();
        self.handles.extend(handles);
        Ok(count)
    }

    /// Abort every spawned poller
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.stop();
    }
}
