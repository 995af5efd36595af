// ── tether-relay ─────────────────────────────────────────────────────────────
// Command-line front end for `tether` channels: listen on a channel, push one
// message into it, or act as a single-instance launcher.
#![deny(unsafe_code)]

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tether::{Channel, ChannelConfig, ChannelOptions, IpcError, Result, Role, SingleInstance};

// ── Command line ──────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "tether-relay", about = "Send and receive tether channel messages")]
struct Cli {
    #[command(flatten)]
    target: Target,

    #[command(subcommand)]
    command: Command,
}

/// Which channel to open: a config file, or the identity spelled out.
#[derive(Debug, Args)]
struct Target {
    /// JSON channel config; overrides the identity flags.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application id.
    #[arg(long, global = true)]
    app: Option<String>,

    /// Application version.
    #[arg(long = "app-version", global = true, default_value_t = 1)]
    app_version: u32,

    /// Channel id.
    #[arg(long, global = true, default_value = "commands")]
    channel: String,

    /// Read timeout in milliseconds (default: wait forever).
    #[arg(long, global = true)]
    read_timeout_ms: Option<u64>,

    /// Send timeout in milliseconds (default: wait forever).
    #[arg(long, global = true)]
    send_timeout_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every message arriving on the channel.
    Listen {
        /// Stop after this many messages.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Send one message.
    Send {
        command: u32,
        /// Up to four string parameters.
        params: Vec<String>,
        #[arg(long, default_value_t = 0)]
        flags: u32,
    },
    /// Become the primary instance, or forward `args` to it.
    Instance {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Target {
    fn resolve(&self) -> Result<ChannelConfig> {
        if let Some(path) = &self.config {
            return ChannelConfig::load(path);
        }
        let app = self
            .app
            .as_deref()
            .ok_or(IpcError::InvalidIdentity("--app or --config is required"))?;
        let mut cfg = ChannelConfig::new(app, self.app_version, &self.channel);
        cfg.read_timeout_ms = self.read_timeout_ms;
        cfg.send_timeout_ms = self.send_timeout_ms;
        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("tether-relay: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<()> {
    let cfg = cli.target.resolve()?;
    match cli.command {
        Command::Listen { count } => listen(&cfg, count),
        Command::Send {
            command,
            params,
            flags,
        } => send(&cfg, command, flags, &params),
        Command::Instance { args } => instance(&cfg, &args),
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn open(cfg: &ChannelConfig) -> Result<Channel> {
    let channel = Channel::with_options(cfg.identity()?, cfg.options());
    let outcome = channel.try_initialize()?;
    tracing::info!(
        channel = %channel.identity().channel_id(),
        ?outcome,
        "channel ready"
    );
    Ok(channel)
}

fn listen(cfg: &ChannelConfig, count: Option<usize>) -> Result<()> {
    let channel = open(cfg)?;
    let mut received = 0usize;
    while count.map_or(true, |n| received < n) {
        match channel.try_read() {
            Ok(msg) => {
                received += 1;
                let line = serde_json::json!({
                    "command": msg.command,
                    "flags": msg.flags,
                    "params": msg.params,
                });
                println!("{line}");
            }
            Err(IpcError::Timeout) => {
                tracing::info!(received, "read timed out");
                break;
            }
            Err(IpcError::MessageCorrupted { slot }) => {
                tracing::warn!(slot, "skipping corrupted message");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn send(cfg: &ChannelConfig, command: u32, flags: u32, params: &[String]) -> Result<()> {
    let channel = open(cfg)?;
    if channel.role() == Some(Role::Master) {
        // The region goes away with this process; nobody will see the message.
        tracing::warn!("no listener attached to this channel");
    }
    channel.try_send(command, flags, params)
}

fn instance(cfg: &ChannelConfig, args: &[String]) -> Result<()> {
    let options = ChannelOptions {
        send_timeout: Some(
            cfg.send_timeout_ms
                .map_or(Duration::from_secs(5), Duration::from_millis),
        ),
        ..cfg.options()
    };
    let instance = SingleInstance::with_options(cfg.identity()?, options)?;
    if !instance.is_primary() {
        instance.forward_args(args)?;
        tracing::info!(args = args.len(), "forwarded to primary instance");
        return Ok(());
    }

    tracing::info!("primary instance; waiting for activations");
    while let Some(activation) = instance.next_activation() {
        let line = serde_json::json!({
            "args": activation.args,
            "dropped": activation.dropped,
        });
        println!("{line}");
    }
    Ok(())
}
