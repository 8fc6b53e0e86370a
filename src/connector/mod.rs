//! Sessions to remote systems
//!
//! The collection pipeline only talks to backends through the [`Connector`]
//! and [`Session`] traits. A session is owned by exactly one task and must be
//! closed by it once the call is done.
//!
//! ## Implementations
//!
//! - **gateway**: JSON over HTTP to an RFC gateway service

pub mod gateway;
#[cfg(test)]
pub(crate) mod mock;

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use tokio::time::{Instant, timeout_at};

use crate::{
    config::{ServerTarget, SystemTarget},
    error::{CollectError, CollectResult},
    value::{Row, Value},
};

pub use gateway::GatewayConnector;

/// Opens sessions to application servers
///
/// Implementations must be `Send + Sync`, the same connector is used by every
/// collection task of a scrape.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a session to one application server of a system
    async fn connect(
        &self,
        system: &SystemTarget,
        server: &ServerTarget,
    ) -> CollectResult<Box<dyn Session>>;
}

/// An open session to one application server
#[async_trait]
pub trait Session: Send {
    /// Call a remote function module
    ///
    /// The result maps table and export parameter names to their values,
    /// tables being lists of rows with upper-cased field names.
    async fn call(&mut self, function: &str, params: &BTreeMap<String, Value>)
    -> CollectResult<Row>;

    /// Release the session. Failures are only logged.
    async fn close(&mut self);
}

/// Connect, perform a single call and close the session again.
///
/// The session is closed whether or not the call succeeded.
pub async fn call_once(
    connector: &dyn Connector,
    system: &SystemTarget,
    server: &ServerTarget,
    function: &str,
    params: &BTreeMap<String, Value>,
) -> CollectResult<Row> {
    call_once_until(connector, system, server, function, params, None).await
}

/// Like [`call_once`], but give up on the connection or the call at
/// `deadline`.
///
/// A call cut off by the deadline still closes its session before
/// returning [`CollectError::Timeout`].
pub async fn call_once_until(
    connector: &dyn Connector,
    system: &SystemTarget,
    server: &ServerTarget,
    function: &str,
    params: &BTreeMap<String, Value>,
    deadline: Option<Instant>,
) -> CollectResult<Row> {
    let mut session = within(deadline, connector.connect(system, server))
        .await
        .ok_or_else(|| CollectError::Timeout(format!("connecting to {}", server.name)))??;

    let result = within(deadline, session.call(function, params))
        .await
        .unwrap_or_else(|| Err(CollectError::Timeout(format!("{function} on {}", server.name))));

    session.close().await;
    result
}

/// Await `future`, or return `None` once `deadline` has passed
pub(crate) async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}
