//! hcp-cli: command-line front end for an HCP server.
//!
//! Connects, waits for the `meta,welcome` handshake, runs one subcommand and
//! closes the connection.
//!
//! # Usage
//!
//! ```text
//! hcp-cli [OPTIONS] <COMMAND>
//!
//! Commands:
//!   hw    <TARGET.COMMAND> [ARGS]...   Send a hw,control request
//!   meta  <COMMAND> [ARGS]...          Send a meta,cmd request
//!   watch [--kind <KIND>]              Print hw notifications until Ctrl+C
//!
//! Options:
//!   --url <URL>           Server URL [env: HCP_URL]
//!   --config <PATH>       TOML config file [env: HCP_CONFIG]
//!   --timeout-ms <MS>     Request timeout in milliseconds
//! ```
//!
//! Arguments are parsed as JSON where possible (`1`, `true`, `"x"`,
//! `[1,2]`) and passed as plain strings otherwise, so
//! `hcp-cli hw firmata.setPinMode 5 PWM` sends `args: [5, "PWM"]`.
//!
//! # Precedence
//!
//! Command-line flags override the config file, which overrides the built-in
//! defaults.  The log filter comes from `RUST_LOG`, else the config
//! `log_level`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hcp_client::{ClientConfig, HcpClient, Notification, Packet};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Command-line client for HCP hardware-control servers.
#[derive(Debug, Parser)]
#[command(
    name = "hcp-cli",
    about = "Send HCP requests and watch hardware notifications",
    version
)]
struct Cli {
    /// WebSocket URL of the HCP server, e.g. `ws://127.0.0.1:13997`.
    #[arg(long, env = "HCP_URL")]
    url: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "HCP_CONFIG")]
    config: Option<PathBuf>,

    /// Request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a `hw,control` request, e.g. `hw wiseXboard.digitalRead 1`.
    Hw {
        /// `<target>.<command>`.
        command: String,
        /// Command arguments.
        args: Vec<String>,
    },
    /// Send a `meta,cmd` request.
    Meta {
        /// Meta command name.
        command: String,
        /// Command arguments.
        args: Vec<String>,
    },
    /// Print hardware notifications until Ctrl+C.
    Watch {
        /// Only print notifications of this kind (body `type`/`kind`).
        #[arg(long)]
        kind: Option<String>,
    },
}

impl Cli {
    /// Builds the client configuration: file (if any), then flags.
    fn load_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(url) = &self.url {
            config.server_url = url.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
        Ok(config)
    }
}

/// Parses a command-line argument as JSON, falling back to a plain string.
fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn parse_args(args: &[String]) -> Vec<Value> {
    args.iter().map(|a| parse_arg(a)).collect()
}

/// JSON document printed for a response.
fn response_document(packet: &Packet) -> Value {
    json!({
        "header": packet.header(),
        "body": packet.body(),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("connecting to {}", config.server_url);
    let client = HcpClient::new(config.clone());
    client.connect().context("failed to start client")?;
    tokio::time::timeout(config.connect_timeout(), client.wait_for_connected())
        .await
        .with_context(|| {
            format!(
                "no handshake from {} within {:?}",
                config.server_url,
                config.connect_timeout()
            )
        })?;
    info!("connected");

    let result = run(&client, cli.command).await;
    client.close();
    result
}

async fn run(client: &HcpClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Hw { command, args } => {
            let response = client
                .request_hw_control(command.as_str(), parse_args(&args))
                .await
                .with_context(|| format!("hw request {command} failed"))?;
            println!("{}", serde_json::to_string_pretty(&response_document(&response))?);
        }
        Command::Meta { command, args } => {
            let response = client
                .request_meta_cmd(&command, parse_args(&args))
                .await
                .with_context(|| format!("meta request {command} failed"))?;
            println!("{}", serde_json::to_string_pretty(&response_document(&response))?);
        }
        Command::Watch { kind } => {
            let mut notifications = client.observe_hw_notifications();
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => {
                        info!("received Ctrl+C, stopping");
                        break;
                    }
                    packet = notifications.recv() => match packet {
                        Some(packet) => {
                            let notification = Notification::from_packet(&packet);
                            if kind.as_deref().map_or(true, |k| k == notification.kind) {
                                println!(
                                    "{}",
                                    json!({ "kind": notification.kind, "payload": notification.payload })
                                );
                            }
                        }
                        None => {
                            warn!("connection closed by server");
                            break;
                        }
                    },
                }
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hcp_core::{Address, Header};

    #[test]
    fn test_cli_hw_subcommand_collects_args() {
        // Arrange / Act
        let cli = Cli::parse_from(["hcp-cli", "hw", "wiseXboard.digitalRead", "1"]);

        // Assert
        match cli.command {
            Command::Hw { command, args } => {
                assert_eq!(command, "wiseXboard.digitalRead");
                assert_eq!(args, vec!["1"]);
            }
            other => panic!("expected hw, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_watch_kind_option() {
        let cli = Cli::parse_from(["hcp-cli", "watch", "--kind", "firmata-value"]);
        assert!(matches!(
            cli.command,
            Command::Watch { kind: Some(ref k) } if k == "firmata-value"
        ));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["hcp-cli"]).is_err());
    }

    #[test]
    fn test_load_config_defaults_without_flags() {
        let cli = Cli::parse_from(["hcp-cli", "meta", "hwList"]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.request_timeout_ms, 7000);
    }

    #[test]
    fn test_load_config_flags_override_defaults() {
        let cli = Cli::parse_from([
            "hcp-cli",
            "--url",
            "ws://10.0.0.5:13997",
            "--timeout-ms",
            "1500",
            "meta",
            "hwList",
        ]);

        let config = cli.load_config().unwrap();

        assert_eq!(config.server_url, "ws://10.0.0.5:13997");
        assert_eq!(config.request_timeout_ms, 1500);
    }

    #[test]
    fn test_load_config_missing_file_returns_error() {
        let cli = Cli::parse_from([
            "hcp-cli",
            "--config",
            "/nonexistent/hcp-cli-test.toml",
            "meta",
            "hwList",
        ]);
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_parse_arg_prefers_json() {
        assert_eq!(parse_arg("5"), json!(5));
        assert_eq!(parse_arg("true"), json!(true));
        assert_eq!(parse_arg("[1,2]"), json!([1, 2]));
        assert_eq!(parse_arg("\"quoted\""), json!("quoted"));
    }

    #[test]
    fn test_parse_arg_falls_back_to_string() {
        assert_eq!(parse_arg("PWM"), json!("PWM"));
        assert_eq!(parse_arg("{broken"), json!("{broken"));
    }

    #[test]
    fn test_response_document_contains_header_and_body() {
        let mut header = Header::new();
        header.insert("requestId".into(), json!("r1"));
        let packet = Packet::new(Address::hw_control(), header, Some(json!(1)));

        let doc = response_document(&packet);

        assert_eq!(doc, json!({"header": {"requestId": "r1"}, "body": 1}));
    }
}
