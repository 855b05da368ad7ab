//! SSH port forwarding to the stores through a bastion.
//!
//! Runs the system `ssh` client with one `-L` forward per distinct store
//! target and waits until every local port accepts connections. The child is
//! killed when the [`Tunnel`] guard is dropped.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use idrecon_config::TunnelConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("ssh client not found on PATH")]
    SshNotFound,
    #[error("cannot start ssh ({}): {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tunnel port {local_port} ({remote}) not reachable after {}s", .after.as_secs())]
    Unreachable {
        local_port: u16,
        remote: String,
        after: Duration,
    },
    #[error("ssh exited before the tunnel was up ({status})")]
    Exited { status: ExitStatus },
}

/// One local port forwarded to a remote `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl Forward {
    fn forward_arg(&self) -> String {
        format!("{}:{}:{}", self.local_port, self.remote_host, self.remote_port)
    }
}

/// Assign consecutive local ports starting at `local_port_base`, one per target.
pub fn plan(config: &TunnelConfig, targets: &[(String, u16)]) -> Vec<Forward> {
    targets
        .iter()
        .zip(config.local_port_base..)
        .map(|((host, port), local_port)| Forward {
            local_port,
            remote_host: host.clone(),
            remote_port: *port,
        })
        .collect()
}

/// `ssh` arguments for a forward-only session.
pub fn ssh_args(config: &TunnelConfig, forwards: &[Forward]) -> Vec<String> {
    let mut args = vec![
        "-N".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-p".to_string(),
        config.ssh_port.to_string(),
    ];
    if let Some(ref identity) = config.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    for forward in forwards {
        args.push("-L".to_string());
        args.push(forward.forward_arg());
    }
    args.extend(config.extra_args.iter().cloned());
    args.push(config.destination());
    args
}

pub struct Tunnel {
    child: Child,
    forwards: Vec<Forward>,
}

impl Tunnel {
    /// Start `ssh` and block until every forward is reachable.
    pub fn open(config: &TunnelConfig, targets: &[(String, u16)]) -> Result<Self, TunnelError> {
        let program = which::which("ssh").map_err(|_| TunnelError::SshNotFound)?;
        let forwards = plan(config, targets);
        let args = ssh_args(config, &forwards);
        debug!(program = %program.display(), ?args, "starting ssh");

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TunnelError::Spawn { program, source })?;

        // Guard first, so any early return below kills the child
        let mut tunnel = Self { child, forwards };
        tunnel.wait_ready(config.connect_timeout())?;
        info!(destination = %config.destination(), forwards = tunnel.forwards.len(), "tunnel up");
        Ok(tunnel)
    }

    fn wait_ready(&mut self, limit: Duration) -> Result<(), TunnelError> {
        let deadline = Instant::now() + limit;
        for forward in &self.forwards {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, forward.local_port));
            loop {
                if let Ok(Some(status)) = self.child.try_wait() {
                    return Err(TunnelError::Exited { status });
                }
                if TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok() {
                    debug!(local_port = forward.local_port, "forward reachable");
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(TunnelError::Unreachable {
                        local_port: forward.local_port,
                        remote: format!("{}:{}", forward.remote_host, forward.remote_port),
                        after: limit,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(())
    }

    /// Local endpoint for a remote target, if this tunnel forwards it.
    pub fn route(&self, host: &str, port: u16) -> Option<(String, u16)> {
        route_through(&self.forwards, host, port)
    }
}

fn route_through(forwards: &[Forward], host: &str, port: u16) -> Option<(String, u16)> {
    forwards
        .iter()
        .find(|f| f.remote_host == host && f.remote_port == port)
        .map(|f| (Ipv4Addr::LOCALHOST.to_string(), f.local_port))
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            // Already exited is fine
            debug!(error = %e, "ssh kill");
        }
        match self.child.wait() {
            Ok(status) => debug!(%status, "ssh stopped"),
            Err(e) => warn!(error = %e, "ssh not reaped"),
        }
    }
}
