//! Free TCP port probing for the circuit daemon's SOCKS and control ports.

use anyhow::{bail, Result};
use std::net::{SocketAddr, TcpListener};

fn port_free(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).is_ok()
}

/// Probes sequentially from `base` for two consecutive-or-not free ports
/// (SOCKS, control), matching the original probing strategy: try a port,
/// move to the next on failure, stop once both are found.
pub fn two_free_ports(base: u16) -> Result<(u16, u16)> {
    let mut found = Vec::with_capacity(2);
    let mut port = base;
    loop {
        if port_free(port) {
            found.push(port);
            if found.len() == 2 {
                return Ok((found[0], found[1]));
            }
        }
        port = match port.checked_add(1) {
            Some(p) => p,
            None => bail!("exhausted port range searching from {}", base),
        };
    }
}
