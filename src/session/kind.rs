use crate::config::SessionConfig;
use crate::mi::quote_cstring;
use crate::session::transport::ServerAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Supported backends.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Default,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Instruction set simulator with assert prompts.
    #[default]
    #[strum(serialize = "simulator")]
    Simulator,
    /// OpenOCD GDB server.
    #[strum(serialize = "openocd")]
    OpenOcd,
    /// SEGGER J-Link GDB server.
    #[strum(serialize = "jlink")]
    JLink,
    /// pyOCD GDB server.
    #[strum(serialize = "pyocd")]
    PyOcd,
    /// GDB server started by someone else, only the address is known.
    #[strum(serialize = "external")]
    External,
}

/// Debug features a backend provides.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Capabilities {
    pub hw_breakpoints: bool,
    pub watchpoints: bool,
    pub multi_thread: bool,
    pub hw_breakpoint_slots: u32,
    /// Memory can be read while the target is running.
    pub live_memory_read: bool,
}

impl BackendKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            BackendKind::Simulator => Capabilities {
                hw_breakpoints: false,
                watchpoints: true,
                multi_thread: false,
                hw_breakpoint_slots: 0,
                live_memory_read: true,
            },
            BackendKind::OpenOcd => Capabilities {
                hw_breakpoints: true,
                watchpoints: true,
                multi_thread: true,
                hw_breakpoint_slots: 4,
                live_memory_read: true,
            },
            BackendKind::JLink => Capabilities {
                hw_breakpoints: true,
                watchpoints: true,
                multi_thread: false,
                hw_breakpoint_slots: 4,
                live_memory_read: true,
            },
            BackendKind::PyOcd => Capabilities {
                hw_breakpoints: true,
                watchpoints: true,
                multi_thread: false,
                hw_breakpoint_slots: 4,
                live_memory_read: false,
            },
            BackendKind::External => Capabilities {
                hw_breakpoints: true,
                watchpoints: true,
                multi_thread: false,
                hw_breakpoint_slots: 2,
                live_memory_read: false,
            },
        }
    }

    /// True if session spawns and owns the backend process.
    pub fn owns_process(self) -> bool {
        !matches!(self, BackendKind::External)
    }

    /// True if backend may listen on a local socket instead of a TCP port.
    pub fn supports_socket(self) -> bool {
        matches!(self, BackendKind::Simulator | BackendKind::External)
    }

    pub fn default_executable(self) -> Option<&'static str> {
        match self {
            BackendKind::Simulator => Some("rvsim"),
            BackendKind::OpenOcd => Some("openocd"),
            BackendKind::JLink => Some("JLinkGDBServerCLExe"),
            BackendKind::PyOcd => Some("pyocd"),
            BackendKind::External => None,
        }
    }

    /// Commands sent right after the debugger connects to the server.
    pub fn post_connect_commands(self) -> Vec<String> {
        let commands: &[&str] = match self {
            BackendKind::Simulator => &[],
            BackendKind::OpenOcd => &["monitor reset halt"],
            BackendKind::JLink => &["monitor reset", "monitor halt"],
            BackendKind::PyOcd => &["monitor reset halt"],
            BackendKind::External => &[],
        };
        commands.iter().map(ToString::to_string).collect()
    }

    /// Command that loads firmware image into the target.
    pub fn load_command(self, image: &Path) -> String {
        let image = quote_cstring(&image.to_string_lossy());
        match self {
            BackendKind::Simulator => format!("monitor load {image}"),
            BackendKind::OpenOcd
            | BackendKind::JLink
            | BackendKind::PyOcd
            | BackendKind::External => format!("load {image}"),
        }
    }

    fn default_args(self, config: &SessionConfig, address: &ServerAddress) -> Vec<String> {
        let mut args: Vec<String> = vec![];
        match self {
            BackendKind::Simulator => {
                match address {
                    ServerAddress::Unix(_) => {
                        args.extend(["--gdb-socket".into(), "{socket}".into()])
                    }
                    ServerAddress::Tcp { .. } => {
                        args.extend(["--gdb-port".into(), "{port}".into()])
                    }
                }
                if config.image.is_some() {
                    args.push("{image}".into());
                }
            }
            BackendKind::OpenOcd => {
                args.extend(["-c".into(), "gdb_port {port}".into()]);
                for file in &config.config_files {
                    args.extend(["-f".into(), file.to_string_lossy().into_owned()]);
                }
            }
            BackendKind::JLink => {
                args.extend(["-if".into(), "JTAG".into()]);
                if config.target.is_some() {
                    args.extend(["-device".into(), "{target}".into()]);
                }
                args.extend([
                    "-port".into(),
                    "{port}".into(),
                    "-nogui".into(),
                    "-singlerun".into(),
                ]);
            }
            BackendKind::PyOcd => {
                args.extend(["gdbserver".into(), "--port".into(), "{port}".into()]);
                if config.target.is_some() {
                    args.extend(["--target".into(), "{target}".into()]);
                }
            }
            BackendKind::External => {}
        }
        args
    }

    /// Backend command line arguments.
    pub fn launch_args(self, config: &SessionConfig, address: &ServerAddress) -> Vec<String> {
        let (port, socket) = match address {
            ServerAddress::Tcp { port, .. } => (port.to_string(), String::new()),
            ServerAddress::Unix(path) => (String::new(), path.to_string_lossy().into_owned()),
        };
        let image = config
            .image
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = config.target.clone().unwrap_or_default();

        let template = match &config.args {
            Some(args) => args.clone(),
            None => self.default_args(config, address),
        };
        template
            .into_iter()
            .map(|arg| {
                arg.replace("{port}", &port)
                    .replace("{socket}", &socket)
                    .replace("{image}", &image)
                    .replace("{target}", &target)
            })
            .chain(config.extra_args.iter().cloned())
            .collect()
    }
}
