use clap::{Parser, Subcommand, ValueEnum};
use logtree::app;
use logtree_core::config::{Config, OutputFormat};
use logtree_core::LogLevel;
use logtree_receivers::ReceiverFactory;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logtree", about = "Collect CSV logs from files, sockets and search backends into a logger tree")]
struct Cli {
    /// Config file (default: ~/.config/logtree/config.toml, created on first run).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write debug logs to /tmp/logtree-debug.log (tail -f to inspect).
    #[arg(long)]
    debug: bool,

    /// Hide events below this level.
    #[arg(long)]
    min_level: Option<LogLevel>,

    /// Output format for visible events.
    #[arg(long, value_enum)]
    format: Option<Format>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List receiver types with a sample client configuration for each.
    Receivers,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Jsonl => OutputFormat::Jsonl,
        }
    }
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    if debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/logtree-debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
        tracing::info!("logtree debug log started; tail -f /tmp/logtree-debug.log");
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
    Ok(())
}

fn list_receivers() {
    for info in ReceiverFactory::new().iter() {
        println!("{}  ({})", info.kind, info.name);
        println!("    {}", info.description);
        if !info.sample_config.is_empty() {
            println!();
            for line in info.sample_config.lines() {
                println!("    {line}");
            }
        }
        println!();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    if let Some(Command::Receivers) = cli.command {
        list_receivers();
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.min_level {
        config.ingest.min_level = level;
    }
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }

    app::run_until_ctrl_c(&config).await
}
