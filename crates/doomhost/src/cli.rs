//! Command-line interface.
//!
//! `serve` runs the daemon. `query` and `rcon` drive the engine's UDP
//! protocols directly, which is handy for poking at a hosted instance.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use doomhost_engine::{QueryFlags, RconClient, query};
use doomhost_protocol::ProtocolError;

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::{DoomhostError, DoomhostServer, setup_logging};

#[derive(Parser, Debug)]
#[command(name = "doomhost", version, about = "Hosts and supervises Zandronum servers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the control-plane daemon (the default).
    Serve(ServeArgs),
    /// Query a game server and print its reply as JSON.
    Query(QueryArgs),
    /// Send one RCON command to a game server.
    Rcon(RconArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Control listener address, overriding `network.bind_address`.
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Log level or filter, overriding `logging.level`.
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
            bind: None,
            log_level: None,
            json_logs: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Game server address, e.g. 127.0.0.1:10666.
    pub addr: SocketAddr,

    /// Query flags as decimal or 0x-prefixed hex.
    #[arg(short, long, value_parser = parse_flags)]
    pub flags: Option<QueryFlags>,

    /// Seconds to wait for the reply.
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RconArgs {
    pub addr: SocketAddr,

    #[arg(short, long)]
    pub password: String,

    /// Console command; multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    pub command: Vec<String>,

    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

fn parse_flags(s: &str) -> Result<QueryFlags, String> {
    let bits = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    }
    .map_err(|e| format!("invalid query flags '{s}': {e}"))?;
    Ok(QueryFlags::from_bits(bits))
}

impl AppConfig {
    /// Applies CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &ServeArgs) {
        if let Some(ref bind) = args.bind {
            self.network.bind_address = bind.clone();
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }
}

/// Runs the selected subcommand.
pub async fn run(cli: Cli) -> Result<(), DoomhostError> {
    match cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(args).await,
        Command::Query(args) => run_query(args).await,
        Command::Rcon(args) => run_rcon(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), DoomhostError> {
    let mut config = AppConfig::load_from_file(&args.config).await?;
    config.apply_cli_overrides(&args);
    setup_logging(&config.logging, args.json_logs)?;
    config.validate()?;

    let server = DoomhostServer::builder(config).build().await?;
    server.run().await
}

async fn run_query(args: QueryArgs) -> Result<(), DoomhostError> {
    let flags = args.flags.unwrap_or_default();
    let reply = query::query_with_timeout(args.addr, flags, Duration::from_secs(args.timeout)).await?;
    match reply {
        Some(info) => {
            let json = serde_json::to_string_pretty(&info).map_err(ProtocolError::Encode)?;
            println!("{json}");
        }
        None => println!("{} answered with an unrecognized reply", args.addr),
    }
    Ok(())
}

async fn run_rcon(args: RconArgs) -> Result<(), DoomhostError> {
    let command = args.command.join(" ");
    let client = RconClient::connect(args.addr)
        .await?
        .with_timeout(Duration::from_secs(args.timeout));
    client.login(&args.password).await?;
    client.command(&command).await?;
    println!("sent '{command}' to {}", args.addr);
    Ok(())
}
