use std::{
    collections::BTreeSet,
    net::{Ipv4Addr, TcpListener},
};

use tracing::debug;

/// Returns the subset of `ports` that can currently be bound on all
/// interfaces. Each test listener is dropped straight away.
pub fn check_ports(ports: &[u16]) -> BTreeSet<u16> {
    ports
        .iter()
        .copied()
        .filter(|port| port_available(*port))
        .collect()
}

/// Ports from `ports` that are missing from the free set, in input order.
pub fn occupied_ports(ports: &[u16]) -> Vec<u16> {
    let free = check_ports(ports);
    ports
        .iter()
        .copied()
        .filter(|port| !free.contains(port))
        .collect()
}

fn port_available(port: u16) -> bool {
    match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
        Ok(_listener) => true,
        Err(e) => {
            debug!(port, error = %e, "Port is not available");
            false
        }
    }
}
