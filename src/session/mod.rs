//! Backend sessions.
//!
//! A session owns the process (if any) that serves the debugger's control channel and knows
//! how to talk to it: post-connect commands, image load command and debug capabilities.
//! The set of backends is closed, see [`BackendKind`].

mod kind;
pub mod process;
pub mod transport;

pub use kind::{BackendKind, Capabilities};
pub use process::BackendIo;
pub use transport::ServerAddress;

use crate::config::SessionConfig;
use crate::error::Error;
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

/// Port of an externally managed server when none is configured (OpenOCD default).
pub const DEFAULT_EXTERNAL_PORT: u16 = 3333;

/// Started session as seen by the debug adapter.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct SessionInfo {
    pub server_address: ServerAddress,
    /// Backend process id, [`None`] for externally managed servers.
    pub process_id: Option<u32>,
    pub capabilities: Capabilities,
}

/// Session with a debug backend.
///
/// `stop` may be called from any thread at any time, a concurrent `start` returns
/// [`Error::Cancelled`] in that case.
pub struct BackendSession {
    kind: BackendKind,
    config: SessionConfig,
    child: Mutex<Option<Child>>,
    cancelled: AtomicBool,
}

impl BackendSession {
    /// Create a session of given kind, nothing is started until [`BackendSession::start`].
    pub fn create(kind: BackendKind, config: &SessionConfig) -> Self {
        Self {
            kind,
            config: config.clone(),
            child: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Create a session of the configured kind.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::create(config.kind, config)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    pub fn post_connect_commands(&self) -> Vec<String> {
        self.kind.post_connect_commands()
    }

    pub fn load_command(&self, image: &Path) -> String {
        self.kind.load_command(image)
    }

    /// True while session owns a live backend process.
    pub fn is_running(&self) -> bool {
        let mut child = self.child();
        match child.as_mut() {
            Some(c) => matches!(c.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Take stdio pipes of the backend process. Return [`None`] if there is no process or pipes
    /// were taken before.
    pub fn take_io(&self) -> Option<BackendIo> {
        let mut child = self.child();
        let io = BackendIo::take(child.as_mut()?);
        if io.stdin.is_none() && io.stdout.is_none() && io.stderr.is_none() {
            return None;
        }
        Some(io)
    }

    fn child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server_address(&self) -> Result<ServerAddress, Error> {
        if self.kind.supports_socket() {
            if let Some(socket) = &self.config.socket {
                return Ok(ServerAddress::Unix(socket.clone()));
            }
        }
        let port = match (self.config.port, self.kind.owns_process()) {
            (Some(port), _) => port,
            (None, true) => transport::free_port(&self.config.host)?,
            (None, false) => DEFAULT_EXTERNAL_PORT,
        };
        Ok(ServerAddress::Tcp {
            host: self.config.host.clone(),
            port,
        })
    }

    fn resolve_executable(&self) -> Result<PathBuf, Error> {
        let program = match (&self.config.executable, self.kind.default_executable()) {
            (Some(exe), _) => exe.clone(),
            (None, Some(exe)) => PathBuf::from(exe),
            (None, None) => return Err(Error::UnknownKind(self.kind.to_string())),
        };
        which::which(&program)
            .map_err(|e| Error::ExecutableNotFound(program.display().to_string(), e))
    }

    /// Start the backend and wait until its server accepts connections.
    ///
    /// On any error the spawned process is stopped before return.
    pub fn start(&self) -> Result<SessionInfo, Error> {
        self.cancelled.store(false, Ordering::SeqCst);
        let address = self.server_address()?;

        if !self.kind.owns_process() {
            info!(target: "session", "use external {} server at {address}", self.kind);
            return Ok(SessionInfo {
                server_address: address,
                process_id: None,
                capabilities: self.capabilities(),
            });
        }

        if self.child().is_some() {
            return Err(Error::AlreadyStarted);
        }

        let program = self.resolve_executable()?;
        let args = self.kind.launch_args(&self.config, &address);
        debug!(target: "session", "spawn {} {}", program.display(), args.join(" "));
        let child = process::Launch::new(program, args, self.config.capture_output)
            .spawn()
            .map_err(|e| Error::Spawn(self.kind, e))?;
        let pid = child.id();
        info!(target: "session", "{} backend started (pid {pid}), wait for {address}", self.kind);
        *self.child() = Some(child);

        match self.wait_ready(&address) {
            Ok(()) => {
                info!(target: "session", "{} backend ready at {address}", self.kind);
                Ok(SessionInfo {
                    server_address: address,
                    process_id: Some(pid),
                    capabilities: self.capabilities(),
                })
            }
            Err(e) => {
                self.shutdown();
                Err(e)
            }
        }
    }

    fn wait_ready(&self, address: &ServerAddress) -> Result<(), Error> {
        let timeout = self.config.start_timeout();
        let poll = self.config.poll_interval();
        let deadline = Instant::now() + timeout;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            {
                let mut guard = self.child();
                let Some(child) = guard.as_mut() else {
                    return Err(Error::Cancelled);
                };
                if let Some(status) = child.try_wait()? {
                    guard.take();
                    return Err(Error::ProcessExit {
                        addr: address.to_string(),
                        status: status.to_string(),
                    });
                }
            }

            if address.is_reachable(poll) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::StartTimeout(address.to_string(), timeout));
            }
            thread::sleep(poll);
        }
    }

    fn shutdown(&self) {
        let child = self.child().take();
        if let Some(mut child) = child {
            info!(target: "session", "stop {} backend (pid {})", self.kind, child.id());
            process::terminate(&mut child, self.config.grace_period());
        }
    }

    /// Stop the backend. Safe to call without `start`, more than once and concurrently with
    /// `start`.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.shutdown();
    }
}

impl Drop for BackendSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
