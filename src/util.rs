use std::net::{IpAddr, Ipv4Addr};

const EXPORTER_PORT: &str = "EXPORTER_PORT";

const DEFAULT_PORT: u16 = 9663;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(EXPORTER_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const EXPORTER_ADDR: &str = "EXPORTER_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(EXPORTER_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

const PASSWORD_PREFIX: &str = "RFC_PASSWORD_";

/// Name of the environment variable holding the password of a system
///
/// `prd-01` becomes `RFC_PASSWORD_PRD_01`.
pub fn password_var(system: &str) -> String {
    let suffix: String = system
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{PASSWORD_PREFIX}{suffix}")
}

pub fn get_password(system: &str) -> Option<String> {
    std::env::var(password_var(system)).ok()
}
