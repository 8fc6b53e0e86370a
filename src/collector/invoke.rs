//! Collection from a single (metric, system, server) target

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, instrument, trace, warn};

use crate::{
    StatRow,
    aggregate::aggregate,
    config::{ServerTarget, SystemTarget, TableMetric},
    connector::{Connector, call_once_until, within},
    error::CollectError,
    value::field,
};

/// Calls the function module of a metric on one application server and
/// aggregates the returned table
#[derive(Clone)]
pub struct Invoker {
    connector: Arc<dyn Connector>,

    /// Bounds the number of remote calls in flight across a scrape
    limiter: Option<Arc<Semaphore>>,
}

impl Invoker {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            limiter: None,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(max_in_flight.max(1))));
        self
    }

    /// Collect the rows of one target.
    ///
    /// Returns `None` if the metric does not apply to the system, if the
    /// target is still busy at `deadline` or if anything on the way fails;
    /// failures are logged. An opened session is always closed.
    #[instrument(skip_all, fields(metric = %metric.name, system = %system.name, server = %server.name))]
    pub async fn invoke(
        &self,
        metric: &TableMetric,
        system: &SystemTarget,
        server: &ServerTarget,
        deadline: Option<Instant>,
    ) -> Option<Vec<StatRow>> {
        // all tags of the metric must be present on the system
        if !metric.applies_to(system) {
            trace!("metric does not apply to system");
            return None;
        }

        let _permit = match &self.limiter {
            Some(limiter) => match within(deadline, limiter.clone().acquire_owned()).await {
                Some(permit) => Some(permit.ok()?),
                None => {
                    warn!("no call slot free before the scrape deadline");
                    return None;
                }
            },
            None => None,
        };

        let response = match call_once_until(
            self.connector.as_ref(),
            system,
            server,
            &metric.function,
            &metric.params,
            deadline,
        )
        .await
        {
            Ok(response) => response,
            Err(e @ CollectError::Timeout(_)) => {
                warn!(error = %e, "target did not answer in time");
                return None;
            }
            Err(e @ CollectError::Connection(_)) => {
                error!(error = %e, "can't connect to server");
                return None;
            }
            Err(e) => {
                error!(error = %e, "can't call function module");
                return None;
            }
        };

        let Some(table) = field(&response, &metric.table) else {
            let e = CollectError::MalformedResponse(format!("table {} is missing", metric.table));
            error!(error = %e, "can't read result table");
            return None;
        };

        let rows = match table.as_table() {
            Ok(rows) => rows,
            Err(e) => {
                let e = CollectError::from(e);
                error!(error = %e, "can't read result table");
                return None;
            }
        };

        trace!(rows = rows.len(), "aggregating result table");

        Some(aggregate(
            rows,
            metric,
            &system.name,
            &system.usage,
            &server.name,
        ))
    }
}
