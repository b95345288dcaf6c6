//! Series polling
//!
//! Every (plugin, series) pair gets its own tokio task that, forever:
//! 1. records the start of the tick,
//! 2. evaluates the series query at that instant,
//! 3. writes a `PUTVAL` line or a diagnostic line,
//! 4. sleeps for whatever is left of the interval.
//!
//! A query slower than the interval starts the next tick immediately; missed
//! ticks are never caught up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::emitter::{diagnostic_line, LineSink, PutVal};
use crate::manifest::{Plugin, Series};
use crate::querier::Querier;

/// Wall-clock source for query timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What one tick produced
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Value(f64),
    Failed(String),
}

/// Shared state handed to every polling task
#[derive(Clone)]
pub struct Poller {
    querier: Arc<dyn Querier>,
    sink: Arc<dyn LineSink>,
    clock: Arc<dyn Clock>,
    hostname: Arc<str>,
    interval_secs: u64,
}

impl Poller {
    pub fn new(
        querier: Arc<dyn Querier>,
        sink: Arc<dyn LineSink>,
        hostname: impl Into<Arc<str>>,
        interval_secs: u64,
    ) -> Self {
        Self {
            querier,
            sink,
            clock: Arc::new(SystemClock),
            hostname: hostname.into(),
            interval_secs,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Spawn one task per series of every plugin
    pub fn spawn_all(&self, plugins: &[Plugin]) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for plugin in plugins {
            let plugin_name: Arc<str> = Arc::from(plugin.name.as_str());
            for series in &plugin.series {
                handles.push(self.spawn(plugin_name.clone(), series.clone()));
            }
        }

        info!(
            "Started {} pollers (interval {}s, host {})",
            handles.len(),
            self.interval_secs,
            self.hostname
        );
        handles
    }

    /// Spawn the polling loop of one series
    pub fn spawn(&self, plugin: Arc<str>, series: Series) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(&plugin, &series).await })
    }

    /// Poll `series` forever
    pub async fn run(&self, plugin: &str, series: &Series) {
        let interval = self.interval();

        loop {
            let started = Instant::now();
            self.poll_once(plugin, series).await;

            let elapsed = started.elapsed();
            match remaining(interval, elapsed) {
                Some(pause) => tokio::time::sleep(pause).await,
                None => debug!(
                    "{}/{}: query took {:?}, longer than the {}s interval",
                    plugin,
                    series.name(),
                    elapsed,
                    self.interval_secs
                ),
            }
        }
    }

    /// One tick: query at the current instant and write the result
    pub async fn poll_once(&self, plugin: &str, series: &Series) -> PollOutcome {
        let t0 = self.clock.now();

        match self.querier.query(t0, series.query()).await {
            Ok(value) => {
                let line = PutVal {
                    hostname: &self.hostname,
                    plugin,
                    series,
                    interval_secs: self.interval_secs,
                    timestamp: t0.timestamp(),
                    value,
                };
                self.sink.put(&line.to_string());
                PollOutcome::Value(value)
            }
            Err(e) => {
                self.sink.diagnostic(&diagnostic_line(plugin, series, &e));
                PollOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Time left in the interval after a tick that took `elapsed`
pub fn remaining(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|pause| !pause.is_zero())
}
