use crate::session::BackendKind;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- session errors --------------------------------------------
    #[error("backend executable `{0}` not found: {1}")]
    ExecutableNotFound(String, which::Error),
    #[error("spawn {0} backend: {1}")]
    Spawn(BackendKind, std::io::Error),
    #[error("backend did not open {0} within {1:?}")]
    StartTimeout(String, Duration),
    #[error("backend process exited before opening {addr} (status: {status})")]
    ProcessExit { addr: String, status: String },
    #[error("session start cancelled")]
    Cancelled,
    #[error("session already started")]
    AlreadyStarted,
    #[error("invalid server address `{0}`")]
    InvalidAddress(String),

    // --------------------------------- reply errors ----------------------------------------------
    #[error("reply `{0}` is not a decimal or hex literal")]
    InvalidReply(String),

    // --------------------------------- configuration errors --------------------------------------
    #[error("read config file {0}: {1}")]
    ConfigRead(PathBuf, std::io::Error),
    #[error("parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("unknown backend kind `{0}`")]
    UnknownKind(String),
}

impl Error {
    /// Return a hint to the orchestrator - keep the debug session alive after error or tear it down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::InvalidReply(_) => false,
            Error::AlreadyStarted => false,

            // session can't proceed without a transport endpoint
            Error::ExecutableNotFound(_, _) => true,
            Error::Spawn(_, _) => true,
            Error::StartTimeout(_, _) => true,
            Error::ProcessExit { .. } => true,
            Error::Cancelled => true,
            Error::InvalidAddress(_) => true,
            Error::ConfigRead(_, _) => true,
            Error::ConfigParse(_) => true,
            Error::UnknownKind(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "session", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "session", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
