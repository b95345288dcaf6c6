/*!
Mock querier for developing without Prometheus

Replies are scripted per query expression: a queue of one-shot replies, then
a fallback reply repeated forever. Every call is recorded with the timestamp
it was asked for and the (tokio) instant it started, so scheduling can be
asserted under paused time.
*/

use agni_bridge::{QueryError, Querier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct QueryCall {
    pub query: String,
    pub at: DateTime<Utc>,
    pub started: Instant,
}

#[derive(Debug, Clone)]
enum Reply {
    Value(f64),
    Fail(String),
}

impl Reply {
    fn into_result(self) -> Result<f64, QueryError> {
        match self {
            Reply::Value(v) => Ok(v),
            Reply::Fail(cause) => Err(QueryError::Other(cause)),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<Reply>,
    fallback: Option<Reply>,
    delay: Duration,
}

/// Querier with scripted replies, safe to share between pollers
#[derive(Clone, Default)]
pub struct MockQuerier {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<QueryCall>>>,
}

impl MockQuerier {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, query: &str, edit: impl FnOnce(&mut Script)) {
        let mut scripts = self.scripts.lock().unwrap();
        edit(scripts.entry(query.to_string()).or_default());
    }

    /// Always answer `value` once queued replies are used up
    pub fn returns(self, query: &str, value: f64) -> Self {
        self.script(query, |s| s.fallback = Some(Reply::Value(value)));
        self
    }

    /// Always fail with `cause` once queued replies are used up
    pub fn fails(self, query: &str, cause: &str) -> Self {
        self.script(query, |s| s.fallback = Some(Reply::Fail(cause.to_string())));
        self
    }

    /// Queue one-shot replies, consumed in order before the fallback
    pub fn then(self, query: &str, replies: Vec<Result<f64, &str>>) -> Self {
        self.script(query, |s| {
            s.queued.extend(replies.into_iter().map(|r| match r {
                Ok(v) => Reply::Value(v),
                Err(cause) => Reply::Fail(cause.to_string()),
            }))
        });
        self
    }

    /// Simulated backend latency for `query`
    pub fn with_delay(self, query: &str, delay: Duration) -> Self {
        self.script(query, |s| s.delay = delay);
        self
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, query: &str) -> Vec<QueryCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.query == query)
            .cloned()
            .collect()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls_for(query).len()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Querier for MockQuerier {
    async fn query(&self, at: DateTime<Utc>, query: &str) -> Result<f64, QueryError> {
        self.calls.lock().unwrap().push(QueryCall {
            query: query.to_string(),
            at,
            started: Instant::now(),
        });

        let (reply, delay) = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(query) {
                Some(script) => (
                    script.queued.pop_front().or_else(|| script.fallback.clone()),
                    script.delay,
                ),
                None => (None, Duration::ZERO),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        reply
            .unwrap_or_else(|| {
                debug!("No reply scripted for '{}', failing the call", query);
                Reply::Fail(format!("no reply scripted for query '{}'", query))
            })
            .into_result()
    }
}
