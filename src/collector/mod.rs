//! Collection pipeline
//!
//! A scrape fans out over three levels, each one built from [`parallel_map`]:
//!
//! ```text
//!                   collect()
//!                      │ one task per metric
//!          ┌───────────┼───────────┐
//!       metric A    metric B    metric C
//!                      │ one task per system
//!               ┌──────┴──────┐
//!            system 1      system 2
//!                             │ one task per server (or only the first)
//!                       ┌─────┴─────┐
//!                    server a    server b   → Invoker → aggregate
//! ```
//!
//! Results are merged on the way back up. A failing target contributes no
//! rows, it never fails the scrape. The scrape deadline is enforced at the
//! leaves: a target still busy when it passes is dropped like a failed one,
//! after its session is closed. The collector keeps no state between scrapes,
//! so overlapping scrapes are independent.

pub mod fanout;
pub mod invoke;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::{
    CollectionResult, MetricSnapshot, StatRow,
    config::{SystemTarget, TableMetric},
    connector::Connector,
};

pub use fanout::parallel_map;
pub use invoke::Invoker;

/// Computes a fresh [`CollectionResult`] for every scrape
#[derive(Clone)]
pub struct Collector {
    metrics: Arc<[Arc<TableMetric>]>,
    systems: Arc<[Arc<SystemTarget>]>,
    invoker: Invoker,
    scrape_timeout: Option<Duration>,
}

impl Collector {
    pub fn new(
        metrics: Vec<TableMetric>,
        systems: Vec<SystemTarget>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            metrics: metrics.into_iter().map(Arc::new).collect(),
            systems: systems.into_iter().map(Arc::new).collect(),
            invoker: Invoker::new(connector),
            scrape_timeout: None,
        }
    }

    /// Limit the number of remote calls running at the same time
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.invoker = self.invoker.with_max_in_flight(max_in_flight);
        self
    }

    /// Give up on targets that have not answered after `timeout`
    pub fn with_scrape_timeout(mut self, timeout: Duration) -> Self {
        self.scrape_timeout = Some(timeout);
        self
    }

    /// Collect all metrics from all systems.
    ///
    /// Every metric yields a snapshot. With a scrape timeout, targets that
    /// have not answered in time contribute no rows.
    #[instrument(skip(self))]
    pub async fn collect(&self) -> CollectionResult {
        let start = Instant::now();
        let deadline = self.scrape_timeout.map(|timeout| start + timeout);

        let snapshots = parallel_map(self.metrics.iter().cloned(), |metric| {
            collect_metric(metric, self.systems.clone(), self.invoker.clone(), deadline)
        })
        .await;

        debug!(
            metrics = snapshots.len(),
            elapsed = ?start.elapsed(),
            "finished scrape"
        );
        snapshots
    }
}

async fn collect_metric(
    metric: Arc<TableMetric>,
    systems: Arc<[Arc<SystemTarget>]>,
    invoker: Invoker,
    deadline: Option<Instant>,
) -> Vec<MetricSnapshot> {
    let stats = parallel_map(systems.iter().cloned(), |system| {
        collect_system(metric.clone(), system, invoker.clone(), deadline)
    })
    .await;

    vec![MetricSnapshot {
        name: metric.name.clone(),
        help: metric.help.clone(),
        kind: metric.kind,
        stats,
    }]
}

async fn collect_system(
    metric: Arc<TableMetric>,
    system: Arc<SystemTarget>,
    invoker: Invoker,
    deadline: Option<Instant>,
) -> Vec<StatRow> {
    // function modules with system wide results are only called once
    let servers = if metric.all_servers {
        system.servers.clone()
    } else {
        system.servers.iter().take(1).cloned().collect()
    };

    parallel_map(servers, |server| {
        let metric = metric.clone();
        let system = system.clone();
        let invoker = invoker.clone();
        async move {
            invoker
                .invoke(&metric, &system, &server, deadline)
                .await
                .unwrap_or_default()
        }
    })
    .await
}
