use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use leadercast::{Config, LogWriter, Runtime, StdinFeed};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leadercast")]
#[command(about = "Broadcast this process's leadership status to stream subscribers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read leadership values from stdin and serve them on the stream endpoint
    Run(RunArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Config file path; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the stream listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the slow-client timeout (e.g. 500ms, 5s)
    #[arg(long, value_parser = humantime::parse_duration)]
    slow_client_timeout: Option<std::time::Duration>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let res = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    res.map_err(|e| anyhow::anyhow!("cannot install tracing subscriber: {e}"))
}

fn load_config(args: &RunArgs) -> anyhow::Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => {
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => {
            tracing::info!("no config file given, using defaults");
            Config::default()
        }
    };

    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    if let Some(timeout) = args.slow_client_timeout {
        cfg.slow_client_timeout = timeout;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;
    tracing::info!(listen = %cfg.listen, slow_client_timeout = ?cfg.slow_client_timeout, fanout = ?cfg.fanout, "starting stream server");

    let rt = Runtime::builder(cfg)
        .with_observer(Arc::new(LogWriter::new()))
        .build();
    rt.run(StdinFeed::new()).await?;

    tracing::info!("stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            init_logging(args.log_format)?;
            run(args).await
        }
    }
}
