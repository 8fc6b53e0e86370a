pub mod aggregate;
pub mod collector;
pub mod config;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod exporter;
pub mod server;
pub mod util;
pub mod value;

use config::MetricKind;

/// Label names carried by every sample
pub const STAT_LABELS: [&str; 4] = ["system", "usage", "server", "count"];

/// One aggregated measurement
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub value: f64,
    pub labels: Vec<String>,
    pub label_values: Vec<String>,
}

impl StatRow {
    /// Build a row with the standard label set; all values are lower-cased.
    pub fn new(value: f64, system: &str, usage: &str, server: &str, count: &str) -> Self {
        Self {
            value,
            labels: STAT_LABELS.iter().map(|label| label.to_string()).collect(),
            label_values: [system, usage, server, count]
                .iter()
                .map(|value| value.to_lowercase())
                .collect(),
        }
    }

    /// Value of the label with the given name
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .position(|label| label == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
    }
}

/// All rows computed for one metric during one scrape
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub stats: Vec<StatRow>,
}

/// Everything computed during one scrape
pub type CollectionResult = Vec<MetricSnapshot>;
