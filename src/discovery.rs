//! Startup enrichment of the configured systems
//!
//! Before the first scrape every system needs its password and the list of
//! its application servers. Passwords are read from the environment, server
//! lists are asked from the system itself unless they are configured.

use std::collections::BTreeMap;

use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::{ServerTarget, SystemTarget},
    connector::{Connector, call_once},
    error::{CollectError, CollectResult},
    util::{get_password, password_var},
    value::field,
};

/// Function module listing the application servers of a system
pub const SERVER_LIST_FUNCTION: &str = "TH_SERVER_LIST";

const SERVER_LIST_TABLE: &str = "LIST";

/// Fill in missing passwords from `RFC_PASSWORD_<SYSTEM>` variables.
pub fn resolve_credentials(systems: &mut [SystemTarget]) {
    for system in systems.iter_mut().filter(|system| system.password.is_none()) {
        match get_password(&system.name) {
            Some(password) => system.password = Some(password),
            None => error!(
                system = %system.name,
                "can't find password for system, expected it in {}",
                password_var(&system.name)
            ),
        }
    }
}

/// Ask every system without configured servers for its application servers.
///
/// If the list can't be retrieved the connection host of the system is used
/// as its only server.
pub async fn discover_servers(connector: &dyn Connector, systems: &mut [SystemTarget]) {
    for system in systems
        .iter_mut()
        .filter(|system| system.servers.is_empty())
    {
        let central = ServerTarget::new(&system.server, &system.sysnr);

        match list_servers(connector, system, &central).await {
            Ok(servers) if !servers.is_empty() => {
                info!(system = %system.name, servers = servers.len(), "discovered application servers");
                system.servers = servers;
            }
            Ok(_) => {
                warn!(system = %system.name, "server list is empty, using {}", central.name);
                system.servers = vec![central];
            }
            Err(e) => {
                error!(system = %system.name, error = %e, "can't retrieve application servers, using {}", central.name);
                system.servers = vec![central];
            }
        }
    }
}

/// Retrieve the application servers of a system
#[instrument(skip_all, fields(system = %system.name))]
pub async fn list_servers(
    connector: &dyn Connector,
    system: &SystemTarget,
    central: &ServerTarget,
) -> CollectResult<Vec<ServerTarget>> {
    let response = call_once(
        connector,
        system,
        central,
        SERVER_LIST_FUNCTION,
        &BTreeMap::new(),
    )
    .await?;

    let table = field(&response, SERVER_LIST_TABLE).ok_or_else(|| {
        CollectError::MalformedResponse(format!("table {SERVER_LIST_TABLE} is missing"))
    })?;

    table
        .as_table()?
        .into_iter()
        .map(|row| -> CollectResult<ServerTarget> {
            let name = field(row, "NAME")
                .ok_or_else(|| CollectError::MalformedResponse("server without NAME".to_string()))?
                .as_str()?;
            let server = parse_server_name(name)?;
            debug!("found application server {} ({})", server.name, server.sysnr);
            Ok(server)
        })
        .collect()
}

/// Split an instance name like `host_SID_00` into host and system number
pub fn parse_server_name(name: &str) -> CollectResult<ServerTarget> {
    let mut parts = name.trim().rsplitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(sysnr), Some(_sid), Some(host)) if !host.trim().is_empty() => {
            Ok(ServerTarget::new(host.trim(), sysnr.trim()))
        }
        _ => Err(CollectError::MalformedResponse(format!(
            "unexpected instance name '{name}'"
        ))),
    }
}
