use anyhow::Context;
use clap::{Parser, Subcommand};
use mibridge::assert::{AssertDecoder, AssertPrompt};
use mibridge::config::BridgeConfig;
use mibridge::mi;
use mibridge::session::{BackendKind, BackendSession};
use serde_json::json;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decode a backend transcript into JSON lines (MI records and assert prompts).
    Decode {
        /// Transcript file, stdin if not set.
        file: Option<PathBuf>,

        /// Print every prompt update, not only prompts waiting for a reply.
        #[arg(long)]
        updates: bool,
    },
    /// Start a backend session and keep it running until Ctrl-C.
    Start {
        /// Config file (default: ~/.config/mibridge/config.toml).
        #[arg(short, long, env = "MIBRIDGE_CONFIG")]
        config: Option<PathBuf>,

        /// Backend kind: simulator, openocd, jlink, pyocd or external.
        #[arg(short, long)]
        kind: Option<BackendKind>,

        /// Backend executable.
        #[arg(long)]
        executable: Option<PathBuf>,

        /// Server TCP port.
        #[arg(short, long)]
        port: Option<u16>,

        /// Firmware image.
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Cmd::Decode { file, updates } => decode(file, updates),
        Cmd::Start {
            config,
            kind,
            executable,
            port,
            image,
        } => {
            let mut config = BridgeConfig::from_file(config.as_deref())
                .context("load configuration")?
                .session;
            if let Some(kind) = kind {
                config.kind = kind;
            }
            if executable.is_some() {
                config.executable = executable;
            }
            if port.is_some() {
                config.port = port;
            }
            if image.is_some() {
                config.image = image;
            }
            run_session(BackendSession::from_config(&config), config.image)
        }
    }
}

fn decode(file: Option<PathBuf>, updates: bool) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = match &file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut decoder = AssertDecoder::new(|prompt: &AssertPrompt| {
        if updates || prompt.awaiting_reply {
            println!("{}", json!({ "prompt": prompt }));
        }
    });

    for line in reader.split(b'\n') {
        let line = line.context("read transcript")?;
        let line = String::from_utf8_lossy(&line);
        if let Some(record) = mi::parse_line(&line) {
            println!("{}", json!({ "record": record }));
        }
        decoder.feed(&line);
        decoder.feed("\n");
    }
    Ok(())
}

fn run_session(session: BackendSession, image: Option<PathBuf>) -> anyhow::Result<()> {
    let session = Arc::new(session);
    let (tx, rx) = mpsc::channel();
    {
        let session = session.clone();
        ctrlc::set_handler(move || {
            session.stop();
            _ = tx.send(());
        })
        .context("install Ctrl-C handler")?;
    }

    let info = session
        .start()
        .with_context(|| format!("start {} session", session.kind()))?;
    let load = image.as_deref().map(|image| session.load_command(image));
    println!(
        "{}",
        json!({
            "session": info,
            "post_connect_commands": session.post_connect_commands(),
            "load_command": load,
        })
    );

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if session.kind().owns_process() && !session.is_running() {
                    log::warn!(target: "session", "backend process exited");
                    break;
                }
            }
        }
    }
    session.stop();
    Ok(())
}
