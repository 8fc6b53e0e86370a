//! In-process connector for unit tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    config::{ServerTarget, SystemTarget},
    error::{CollectError, CollectResult},
    value::{Row, Value},
};

use super::{Connector, Session};

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    calls: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connected: Mutex<Vec<String>>,
}

/// Answers calls from a fixed set of results keyed by function name
#[derive(Default)]
pub struct MockConnector {
    results: HashMap<String, Row>,
    unreachable: HashSet<String>,
    delays: HashMap<String, Duration>,
    server_delays: HashMap<String, Duration>,
    counters: Arc<Counters>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `function` with a single table
    pub fn with_table(mut self, function: &str, table: &str, rows: Vec<Row>) -> Self {
        let table_value = Value::List(rows.into_iter().map(Value::Map).collect());
        self.results
            .insert(function.to_string(), [(table.to_string(), table_value)].into());
        self
    }

    /// Answer `function` with an arbitrary result
    pub fn with_result(mut self, function: &str, result: Row) -> Self {
        self.results.insert(function.to_string(), result);
        self
    }

    pub fn with_unreachable(mut self, server: &str) -> Self {
        self.unreachable.insert(server.to_string());
        self
    }

    pub fn with_delay(mut self, function: &str, delay: Duration) -> Self {
        self.delays.insert(function.to_string(), delay);
        self
    }

    /// Every call made on a session to `server` hangs for `delay`
    pub fn with_server_delay(mut self, server: &str, delay: Duration) -> Self {
        self.server_delays.insert(server.to_string(), delay);
        self
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Servers a session was opened to, in order
    pub fn connected(&self) -> Vec<String> {
        self.counters.connected.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _system: &SystemTarget,
        server: &ServerTarget,
    ) -> CollectResult<Box<dyn Session>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.contains(&server.name) {
            return Err(CollectError::Connection(format!(
                "{} is unreachable",
                server.name
            )));
        }

        self.counters
            .connected
            .lock()
            .unwrap()
            .push(server.name.clone());
        let current = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_in_flight
            .fetch_max(current, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            results: self.results.clone(),
            delays: self.delays.clone(),
            server_delay: self.server_delays.get(&server.name).copied(),
            counters: self.counters.clone(),
        }))
    }
}

struct MockSession {
    results: HashMap<String, Row>,
    delays: HashMap<String, Duration>,
    server_delay: Option<Duration>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Session for MockSession {
    async fn call(
        &mut self,
        function: &str,
        _params: &BTreeMap<String, Value>,
    ) -> CollectResult<Row> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(function).or(self.server_delay.as_ref()) {
            tokio::time::sleep(*delay).await;
        }
        self.results
            .get(function)
            .cloned()
            .ok_or_else(|| CollectError::Call(format!("FU_NOT_FOUND: {function}")))
    }

    async fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
