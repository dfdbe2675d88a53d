use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dce_client::config::{ClientSettings, ResolvedConfig, SettingsEvent, load_settings};
use dce_client::{ClientBuilder, DceClient, DceError, DceResult};
use serde_json::{Value, json};

/// Command/event client for DCEngine WebSocket services
#[derive(Parser)]
#[command(name = "dce")]
#[command(version)]
#[command(about = "Command/event client for DCEngine WebSocket services")]
struct Cli {
    /// WebSocket endpoint (overrides DCE_SOCKET_URL and config files)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Extra TOML config file, applied over the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log connection lifecycle and the received manifest
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke an action and print its result as JSON
    Call {
        /// Dotted action name (e.g., billing.invoice.create)
        action: String,

        /// JSON payload (object or array); defaults to {}
        payload: Option<String>,
    },
    /// Print the actions advertised by the server
    Actions,
    /// Print push messages addressed to the given consumers until the connection closes
    Listen {
        /// Consumer name to register (repeatable)
        #[arg(long = "consumer", required = true)]
        consumers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let overrides = ClientSettings {
        socket_url: cli.url.clone(),
        debug: cli.debug.then_some(true),
        ..Default::default()
    };
    let outcome = load_settings(cli.config.as_deref(), overrides);
    init_logging(outcome.settings.debug.unwrap_or(false));
    outcome.events.iter().for_each(SettingsEvent::log);

    let result = match ResolvedConfig::from_settings(&outcome.settings) {
        Ok(config) => run(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise debug mode shows lifecycle logs and normal
/// mode only warnings.
fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

async fn run(command: Commands, config: &ResolvedConfig) -> DceResult<()> {
    match command {
        Commands::Call { action, payload } => {
            let args = match payload {
                Some(raw) => vec![parse_payload(&raw)?],
                None => Vec::new(),
            };
            let client = ClientBuilder::new().connect(config);
            let result = until_closed(&client, client.call(&action, &args)).await?;
            println!("{}", to_pretty(&result)?);
            Ok(())
        }
        Commands::Actions => {
            let client = ClientBuilder::new().connect(config);
            until_closed(&client, async {
                client.ready().await;
                Ok(())
            })
            .await?;
            for descriptor in client.actions() {
                println!("{}", descriptor.summary());
            }
            if let Some(version) = client.manifest_version() {
                println!("version: {}", version);
            }
            Ok(())
        }
        Commands::Listen { consumers } => {
            let mut builder = ClientBuilder::new();
            for name in consumers {
                let label = name.clone();
                builder = builder.consumer(name, move |data, error, error_data| {
                    let line = json!({
                        "consumer": label,
                        "data": data,
                        "error": error,
                        "error_data": error_data,
                    });
                    println!("{}", line);
                })?;
            }
            let client = builder.connect(config);
            client.closed().await
        }
    }
}

/// Drive `work` unless the connection closes first.
async fn until_closed<T>(
    client: &DceClient,
    work: impl Future<Output = DceResult<T>>,
) -> DceResult<T> {
    tokio::select! {
        biased;
        output = work => output,
        closed = client.closed() => {
            closed?;
            Err(DceError::transport("connection closed"))
        }
    }
}

fn parse_payload(raw: &str) -> DceResult<Value> {
    serde_json::from_str(raw).map_err(|e| DceError::client(format!("invalid payload json: {}", e)))
}

fn to_pretty(value: &Value) -> DceResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| DceError::client(format!("result json encode error: {}", e)))
}
