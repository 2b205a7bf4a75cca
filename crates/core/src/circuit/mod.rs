//! Circuit client (C3): wraps an HTTP client so it routes through a local
//! SOCKS5-speaking anonymizing proxy, and can request a fresh exit identity
//! on demand.
//!
//! The subprocess lifecycle (launch, bootstrap wait, control-port protocol)
//! is behind [`CircuitSupervisor`] so a different anonymizer than the
//! bundled Tor-compatible one can be substituted.

mod ports;
mod tor;

pub use ports::two_free_ports;
pub use tor::TorSupervisor;

use anyhow::{Context, Result};
use std::time::Duration;

/// Process/control-channel lifecycle for an anonymizing circuit daemon.
pub trait CircuitSupervisor: Send {
    /// Launches the subprocess if not already running and blocks until it
    /// reports readiness. Idempotent.
    fn ensure_running(&mut self) -> Result<()>;
    /// Requests a fresh exit circuit ("new identity"). Blocks for acknowledgement.
    fn new_identity(&mut self) -> Result<()>;
    /// The local SOCKS5 port to proxy HTTP traffic through.
    fn socks_port(&self) -> u16;
    /// Terminates the subprocess and removes its transient data directory.
    fn stop(&mut self);
}

impl CircuitSupervisor for Box<dyn CircuitSupervisor> {
    fn ensure_running(&mut self) -> Result<()> {
        (**self).ensure_running()
    }
    fn new_identity(&mut self) -> Result<()> {
        (**self).new_identity()
    }
    fn socks_port(&self) -> u16 {
        (**self).socks_port()
    }
    fn stop(&mut self) {
        (**self).stop()
    }
}

/// High-level client used by the link acquirer: owns a supervisor and hands
/// out curl handles pre-configured to route through it.
pub struct CircuitClient<S: CircuitSupervisor> {
    supervisor: S,
    conn_timeout: Duration,
}

impl<S: CircuitSupervisor> CircuitClient<S> {
    pub fn new(supervisor: S, conn_timeout: Duration) -> Self {
        Self {
            supervisor,
            conn_timeout,
        }
    }

    pub fn ensure_running(&mut self) -> Result<()> {
        self.supervisor.ensure_running()
    }

    pub fn new_identity(&mut self) -> Result<()> {
        self.supervisor.new_identity()
    }

    pub fn stop(&mut self) {
        self.supervisor.stop();
    }

    /// Returns a curl handle configured to route through the proxy, ready
    /// for the caller to set a URL/method/body on. A supervisor reporting
    /// port 0 yields an unproxied handle, used only for exercising the
    /// acquirer state machine against a loopback server in tests.
    pub fn proxied_handle(&self) -> Result<curl::easy::Easy> {
        let mut easy = curl::easy::Easy::new();
        let port = self.supervisor.socks_port();
        if port != 0 {
            easy.proxy(&format!("socks5h://127.0.0.1:{}", port))
                .context("failed to configure SOCKS5 proxy")?;
        }
        easy.connect_timeout(self.conn_timeout)?;
        easy.timeout(self.conn_timeout)?;
        Ok(easy)
    }
}
