//! Prometheus adapter
//!
//! [`Exporter`] turns the result of one scrape into metric families. Label
//! sets are only known after aggregation, so no descriptors are registered up
//! front: `desc()` is empty and every `collect()` builds the families from
//! scratch. The exporter is registered once in the registry that serves
//! `/metrics`.

use std::collections::{HashMap, HashSet};

use prometheus::{
    CounterVec, GaugeVec, Opts,
    core::{Collector as PrometheusCollector, Desc},
    proto::MetricFamily,
};
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tracing::{error, instrument, warn};

use crate::{MetricSnapshot, collector::Collector, config::MetricKind};

#[derive(Clone)]
pub struct Exporter {
    collector: Collector,
}

impl Exporter {
    pub fn new(collector: Collector) -> Self {
        Self { collector }
    }

    /// Run a scrape and convert it into metric families
    #[instrument(skip(self))]
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let snapshots = self.collector.collect().await;
        snapshots.iter().flat_map(families).collect()
    }

    /// Descriptors of everything a scrape currently produces
    ///
    /// Performs a full collection to find out. The registry never asks for
    /// descriptors (`desc()` is empty), so this is what the binary logs at
    /// startup to show which families the targets answer with.
    pub async fn describe(&self) -> Vec<Desc> {
        self.gather()
            .await
            .iter()
            .filter_map(|family| {
                let labels = family
                    .get_metric()
                    .first()
                    .map(|metric| {
                        metric
                            .get_label()
                            .iter()
                            .map(|label| label.get_name().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                Desc::new(
                    family.get_name().to_string(),
                    family.get_help().to_string(),
                    labels,
                    HashMap::new(),
                )
                .inspect_err(|e| error!(metric = family.get_name(), error = %e, "invalid descriptor"))
                .ok()
            })
            .collect()
    }

    /// Run [`Exporter::gather`] from synchronous code.
    ///
    /// On a multi-threaded runtime the current worker is handed over to
    /// blocking mode. Anywhere else the scrape runs on a private runtime in a
    /// helper thread.
    fn gather_blocking(&self) -> Vec<MetricFamily> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.gather()))
            }
            _ => std::thread::scope(|scope| {
                scope
                    .spawn(|| match Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => runtime.block_on(self.gather()),
                        Err(e) => {
                            error!("can't start runtime for scrape: {e}");
                            Vec::new()
                        }
                    })
                    .join()
                    .unwrap_or_else(|_| {
                        error!("scrape thread panicked");
                        Vec::new()
                    })
            }),
        }
    }
}

impl PrometheusCollector for Exporter {
    fn desc(&self) -> Vec<&Desc> {
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gather_blocking()
    }
}

/// Metric families of one snapshot, empty if it has no rows
pub fn families(snapshot: &MetricSnapshot) -> Vec<MetricFamily> {
    let Some(first) = snapshot.stats.first() else {
        return Vec::new();
    };

    let name = snapshot.name.to_lowercase();
    let help = if snapshot.help.is_empty() {
        name.clone()
    } else {
        snapshot.help.clone()
    };
    let labels: Vec<&str> = first.labels.iter().map(String::as_str).collect();
    let opts = Opts::new(name, help);

    // gauges keep the last value of a repeated label set, counters add up
    let mut seen = HashSet::new();
    for stat in &snapshot.stats {
        if !seen.insert(stat.label_values.as_slice()) {
            warn!(
                metric = %snapshot.name,
                labels = ?stat.label_values,
                "label set repeated within one scrape"
            );
        }
    }

    let result = match snapshot.kind {
        MetricKind::Gauge => GaugeVec::new(opts, &labels).map(|gauges| {
            for stat in &snapshot.stats {
                let values: Vec<&str> = stat.label_values.iter().map(String::as_str).collect();
                match gauges.get_metric_with_label_values(&values) {
                    Ok(gauge) => gauge.set(stat.value),
                    Err(e) => error!(metric = %snapshot.name, error = %e, "dropping sample"),
                }
            }
            gauges.collect()
        }),
        MetricKind::Counter => CounterVec::new(opts, &labels).map(|counters| {
            for stat in &snapshot.stats {
                let values: Vec<&str> = stat.label_values.iter().map(String::as_str).collect();
                match counters.get_metric_with_label_values(&values) {
                    Ok(counter) => counter.inc_by(stat.value),
                    Err(e) => error!(metric = %snapshot.name, error = %e, "dropping sample"),
                }
            }
            counters.collect()
        }),
    };

    result.unwrap_or_else(|e| {
        error!(metric = %snapshot.name, error = %e, "can't build metric family");
        Vec::new()
    })
}
