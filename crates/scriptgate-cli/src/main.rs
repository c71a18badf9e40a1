//! # scriptgate CLI Entry Point
//!
//! Runs the agent, or makes a single `Execute` call against one.
//!
//! ## Usage
//!
//! ```bash
//! # Start the agent (Ctrl-C to stop)
//! scriptgate serve -c /etc/scriptgate/config.yaml
//!
//! # Run deploy.ps1 on an agent and print its output
//! scriptgate call 10.0.0.5:7443 deploy.ps1 -p Target=prod -p Force=1 \
//!   --ca ca.pem --cert client.pem --key client.key
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;

use scriptgate_common::protocol::ExecuteRequest;
use scriptgate_common::transport::{ClientIdentity, ScriptgateClient};
use scriptgate_server::{Config, Manager};

#[derive(FromArgs)]
/// scriptgate - remote script execution over mutual TLS
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for running the agent.
///
/// Everything else (bind address, certificate, interpreter, script root,
/// admission limit) comes from the configuration document.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run the agent until interrupted
struct ServeArgs {
    /// path to the YAML configuration document
    #[argh(option, short = 'c', default = "\"config.yaml\".into()")]
    config: PathBuf,
}

/// Arguments for a single `Execute` call.
///
/// The script's standard output is written to stdout exactly as received.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// run a script on an agent and print its output
struct CallArgs {
    /// agent address as <host>:<port>
    #[argh(positional)]
    addr: String,

    /// script path relative to the agent's script root
    #[argh(positional)]
    file: String,

    /// script parameter as key=value, repeatable, passed in the given order
    #[argh(option, short = 'p', long = "param")]
    params: Vec<String>,

    /// PEM file with the CA that issued the agent's certificate
    #[argh(option)]
    ca: PathBuf,

    /// PEM file with the client certificate
    #[argh(option)]
    cert: PathBuf,

    /// PEM file with the client private key
    #[argh(option)]
    key: PathBuf,

    /// name the agent's certificate was issued for
    #[argh(option, long = "server-name", default = "\"localhost\".into()")]
    server_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // `call` keeps stdout clean for the script's output
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    tracing::info!("Loading configuration from {}", args.config.display());
    let config = Config::load(&args.config)?;

    let manager = Arc::new(Manager::new(&config)?);
    let listener = manager.listen().await?;

    let mut serving = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.serve(listener).await })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupt received");
            manager.close();
            serving.await??;
        }
        finished = &mut serving => {
            finished??;
        }
    }

    tracing::info!("Agent stopped");
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let request = build_request(&args)?;

    let identity = ClientIdentity::from_files(&args.ca, &args.cert, &args.key)?;
    let mut client = ScriptgateClient::connect(&args.addr, &args.server_name, &identity).await?;
    let response = client.execute(request).await?;

    print!("{}", response.data);
    Ok(())
}

fn build_request(args: &CallArgs) -> Result<ExecuteRequest> {
    args.params
        .iter()
        .try_fold(ExecuteRequest::new(&args.file), |request, param| {
            let (key, value) = parse_param(param)?;
            Ok(request.param(key, value))
        })
}

/// Splits `key=value` at the first `=`.
fn parse_param(param: &str) -> Result<(&str, &str)> {
    match param.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(anyhow::anyhow!(
            "Invalid parameter '{}': expected key=value",
            param
        )),
    }
}
