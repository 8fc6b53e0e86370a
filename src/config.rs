use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::value::Value;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exporter: ExporterConfig,

    pub gateway: GatewayConfig,

    #[serde(default)]
    pub systems: Vec<SystemTarget>,

    #[serde(default)]
    pub table_metrics: Vec<TableMetric>,
}

/// Settings of the exporter process itself
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "crate::util::get_addr")]
    pub address: IpAddr,

    #[serde(default = "crate::util::get_port")]
    pub port: u16,

    /// Upper bound for a whole scrape in seconds
    pub scrape_timeout: Option<u64>,

    /// Upper bound for concurrently running remote calls
    pub max_in_flight: Option<usize>,

    /// Bearer token required on `/metrics`
    pub auth_token: Option<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            address: crate::util::get_addr(),
            port: crate::util::get_port(),
            scrape_timeout: None,
            max_in_flight: None,
            auth_token: None,
        }
    }
}

impl ExporterConfig {
    pub fn scrape_timeout(&self) -> Option<Duration> {
        self.scrape_timeout.map(Duration::from_secs)
    }
}

/// Location of the RFC gateway all sessions are opened through
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GatewayConfig {
    pub url: String,

    /// Per request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout: u64,
}

fn default_gateway_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(format!("unknown metric type '{other}'")),
        }
    }
}

impl TryFrom<String> for MetricKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Definition of one metric computed from a remote table
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TableMetric {
    pub name: String,
    pub help: String,

    #[serde(rename = "metric_type")]
    pub kind: MetricKind,

    /// Remote function module to call
    pub function: String,

    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    /// Name of the table in the call result
    pub table: String,

    /// Call every application server of a system instead of only the first one
    #[serde(default)]
    pub all_servers: bool,

    /// Tags a system must carry for this metric to apply
    #[serde(default)]
    pub tag_filter: Vec<String>,

    /// Rows pass if any field matches any of its values
    #[serde(default)]
    pub row_filter: BTreeMap<String, Vec<Value>>,

    /// Buckets counted per field, matched as value prefixes
    #[serde(default)]
    pub row_count: BTreeMap<String, Vec<Value>>,
}

impl TableMetric {
    /// All `(field, bucket)` pairs declared in `row_count`
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.row_count
            .iter()
            .flat_map(|(field, values)| values.iter().map(move |value| (field.as_str(), value)))
    }

    /// True if every tag of the filter is carried by the system
    pub fn applies_to(&self, system: &SystemTarget) -> bool {
        self.tag_filter.iter().all(|wanted| {
            system
                .tags
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(wanted))
        })
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("metric without a name");
        }

        let mut labels = HashSet::new();
        for (field, bucket) in self.buckets() {
            // unsupported bucket types are reported while aggregating
            let Some(bucket) = bucket.as_label() else {
                continue;
            };
            // an empty prefix would match every row
            if bucket.trim().is_empty() {
                bail!(
                    "metric '{}': row_count of field '{field}' contains an empty bucket",
                    self.name
                );
            }
            let label = format!("{field}_{bucket}").to_lowercase();
            if !labels.insert(label.clone()) {
                bail!(
                    "metric '{}': row_count bucket label '{label}' is declared more than once",
                    self.name
                );
            }
        }
        Ok(())
    }
}

/// One application server instance of a system
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ServerTarget {
    pub name: String,
    pub sysnr: String,
}

impl ServerTarget {
    pub fn new(name: impl Into<String>, sysnr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sysnr: sysnr.into(),
        }
    }
}

/// A remote backend system
#[derive(Clone, serde::Deserialize)]
pub struct SystemTarget {
    pub name: String,

    /// Message server or central instance used for the initial connection
    pub server: String,
    pub sysnr: String,
    pub client: String,

    #[serde(default = "default_lang")]
    pub lang: String,
    pub user: String,

    /// Filled in from the environment after loading
    #[serde(skip)]
    pub password: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub usage: String,

    /// Application servers, discovered at startup unless configured
    #[serde(default)]
    pub servers: Vec<ServerTarget>,
}

impl fmt::Debug for SystemTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTarget")
            .field("name", &self.name)
            .field("server", &self.server)
            .field("sysnr", &self.sysnr)
            .field("client", &self.client)
            .field("lang", &self.lang)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tags", &self.tags)
            .field("usage", &self.usage)
            .field("servers", &self.servers)
            .finish()
    }
}

fn default_lang() -> String {
    String::from("en")
}

impl Config {
    /// Check cross-entry constraints that serde cannot express
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for metric in &self.table_metrics {
            metric.validate()?;
            if !names.insert(metric.name.to_lowercase()) {
                bail!("metric '{}' is defined more than once", metric.name);
            }
        }

        let mut systems = HashSet::new();
        for system in &self.systems {
            if !systems.insert(system.name.to_lowercase()) {
                bail!("system '{}' is defined more than once", system.name);
            }
        }

        Ok(())
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content).context("invalid configuration file")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read config file {path}"))?;
    parse_config(&file_content)
}
