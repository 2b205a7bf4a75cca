//! Default [`super::CircuitSupervisor`]: launches a Tor-compatible daemon as
//! a subprocess, waits for it to bootstrap, and speaks the minimal
//! control-port text protocol needed to request a new exit identity.

use super::ports::two_free_ports;
use super::CircuitSupervisor;
use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub struct TorSupervisor {
    binary: String,
    port_base: u16,
    data_dir: PathBuf,
    socks_port: u16,
    control_port: u16,
    process: Option<Child>,
}

impl TorSupervisor {
    pub fn new(binary: impl Into<String>, port_base: u16, run_id: &str) -> Self {
        let data_dir = std::env::temp_dir().join(format!("anondl-circuit-{}", run_id));
        Self {
            binary: binary.into(),
            port_base,
            data_dir,
            socks_port: 0,
            control_port: 0,
            process: None,
        }
    }

    /// Convenience constructor for callers that don't care about the
    /// transient data directory name; stamps it with a fresh UUID so
    /// concurrent downloads never collide.
    pub fn spawn_default(port_base: u16) -> Self {
        Self::new("tor", port_base, &uuid::Uuid::new_v4().to_string())
    }

    fn write_torrc(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)?;
        let torrc_path = self.data_dir.join("torrc");
        let contents = format!(
            "SocksPort {socks}\nControlPort {control}\nDataDirectory {data_dir}\nCookieAuthentication 1\n",
            socks = self.socks_port,
            control = self.control_port,
            data_dir = self.data_dir.display(),
        );
        std::fs::write(&torrc_path, contents)?;
        Ok(torrc_path)
    }

    fn cookie_hex(&self) -> Result<String> {
        let cookie_path = self.data_dir.join("control_auth_cookie");
        let mut f = std::fs::File::open(&cookie_path)
            .with_context(|| format!("failed to open auth cookie {}", cookie_path.display()))?;
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes)?;
        Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    fn control_roundtrip(&self, command: &str) -> Result<String> {
        let mut stream = TcpStream::connect(("127.0.0.1", self.control_port))
            .context("failed to connect to circuit control port")?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        stream.write_all(command.as_bytes())?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(line)
    }
}

impl CircuitSupervisor for TorSupervisor {
    fn ensure_running(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }

        let (socks, control) = two_free_ports(self.port_base)?;
        self.socks_port = socks;
        self.control_port = control;
        let torrc_path = self.write_torrc()?;

        let mut child = Command::new(&self.binary)
            .arg("-f")
            .arg(&torrc_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch circuit daemon '{}'", self.binary))?;

        let stdout = child.stdout.take().context("no stdout from circuit daemon")?;
        let mut reader = BufReader::new(stdout);
        let deadline = Instant::now() + Duration::from_secs(60);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 || line.contains("Bootstrapped 100%") {
                break;
            }
            if Instant::now() > deadline {
                bail!("circuit daemon did not bootstrap within timeout");
            }
        }

        self.process = Some(child);
        Ok(())
    }

    fn new_identity(&mut self) -> Result<()> {
        let cookie = self.cookie_hex()?;
        let auth_reply = self.control_roundtrip(&format!("AUTHENTICATE {}\r\n", cookie))?;
        if !auth_reply.starts_with("250") {
            bail!("circuit control AUTHENTICATE failed: {}", auth_reply.trim());
        }
        let signal_reply = self.control_roundtrip("SIGNAL NEWNYM\r\n")?;
        if !signal_reply.starts_with("250") {
            bail!("circuit control SIGNAL NEWNYM failed: {}", signal_reply.trim());
        }
        Ok(())
    }

    fn socks_port(&self) -> u16 {
        self.socks_port
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

impl Drop for TorSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
