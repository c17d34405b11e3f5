use crate::error::Error;
use crate::muted_error;
use crate::session::BackendKind;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend session settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub kind: BackendKind,
    /// Backend executable, looked up in `PATH` when not absolute. Kind default if not set.
    pub executable: Option<PathBuf>,
    pub host: String,
    /// Server TCP port. Spawned backends get a free port when not set.
    pub port: Option<u16>,
    /// Local socket instead of a TCP port (simulator and external sessions only).
    pub socket: Option<PathBuf>,
    /// Replaces default launch arguments. `{port}`, `{socket}`, `{image}` and `{target}`
    /// are substituted.
    pub args: Option<Vec<String>>,
    /// Appended to launch arguments.
    pub extra_args: Vec<String>,
    /// Target device name for hardware probes.
    pub target: Option<String>,
    /// OpenOCD configuration scripts.
    pub config_files: Vec<PathBuf>,
    /// Firmware image.
    pub image: Option<PathBuf>,
    pub start_timeout_ms: u64,
    pub grace_period_ms: u64,
    pub poll_interval_ms: u64,
    /// Pipe backend stdio to the orchestrator, otherwise it goes to null.
    pub capture_output: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Simulator,
            executable: None,
            host: "127.0.0.1".to_string(),
            port: None,
            socket: None,
            args: None,
            extra_args: vec![],
            target: None,
            config_files: vec![],
            image: None,
            start_timeout_ms: 10_000,
            grace_period_ms: 2_000,
            poll_interval_ms: 100,
            capture_output: true,
        }
    }
}

impl SessionConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// Application config.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub session: SessionConfig,
}

impl BridgeConfig {
    const DEFAULT_PATH: &'static str = ".config/mibridge/config.toml";

    /// Load config from a file.
    ///
    /// Without explicit path config is looked up at `~/.config/mibridge/config.toml`,
    /// a missing default file gives the default config.
    pub fn from_file(path: Option<&Path>) -> Result<Self, Error> {
        let data = match path {
            None => {
                let Some(home) = home::home_dir() else {
                    return Ok(Self::default());
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Ok(Self::default()),
                }
            }
            Some(path) => {
                read_to_string(path).map_err(|e| Error::ConfigRead(path.to_path_buf(), e))?
            }
        };
        data.parse()
    }
}

impl std::str::FromStr for BridgeConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::de::from_str(s)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config: BridgeConfig = r#"
            [session]
            kind = "openocd"
            executable = "/opt/openocd/bin/openocd"
            port = 3333
            config_files = ["interface/ftdi.cfg", "target/esp32c3.cfg"]
            start_timeout_ms = 5000
        "#
        .parse()
        .unwrap();

        assert_eq!(config.session.kind, BackendKind::OpenOcd);
        assert_eq!(config.session.port, Some(3333));
        assert_eq!(config.session.config_files.len(), 2);
        assert_eq!(config.session.start_timeout(), Duration::from_secs(5));
        assert_eq!(config.session.host, "127.0.0.1");
        assert!(config.session.capture_output);
    }

    #[test]
    fn test_parse_config_error() {
        assert!(matches!(
            "[session]\nkind = \"qemu\"".parse::<BridgeConfig>(),
            Err(Error::ConfigParse(_))
        ));
        assert!(matches!(
            "[session]\nunknown = 1".parse::<BridgeConfig>(),
            Err(Error::ConfigParse(_))
        ));
        assert_eq!("".parse::<BridgeConfig>().unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_missing_config_file() {
        let path = Path::new("/definitely/not/here/config.toml");
        assert!(matches!(
            BridgeConfig::from_file(Some(path)),
            Err(Error::ConfigRead(p, _)) if p == path
        ));
    }
}
