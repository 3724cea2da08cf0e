//! opsdiagd - supportability daemon and operator shell.
//!
//! `serve` (the default) starts every subsystem and reads operator
//! commands from stdin, one per line. `core-handler` is installed as the
//! kernel core pattern pipe and hands a crashing daemon's core to the
//! running daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use opsdiag::CORE_REPORT_METHOD;
use opsdiag::Supportd;
use opsdiag::core::{ControlClient, SupportConfig};
use opsdiag::forward::{ForwardLayer, Forwarder};

const DEFAULT_CONFIG: &str = "/etc/opsdiag/opsdiag.toml";

#[derive(Parser)]
#[command(name = "opsdiagd")]
#[command(version, about = "Diagnostic capture and log routing daemon")]
struct Cli {
    /// Configuration file; built-in defaults apply when it does not exist
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log filter, overriding RUST_LOG (e.g. "debug", "opsdiag_crash=trace")
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the subsystem and read operator commands from stdin
    Serve,

    /// Receive a core on stdin from the kernel core pattern pipe
    CoreHandler {
        /// Crashing daemon name (%e)
        daemon: String,
        /// Crashing process id (%p)
        pid: u32,
        /// Terminating signal number (%s)
        signal: i32,
    },
}

fn load_config(path: &Path) -> Result<SupportConfig> {
    if path.exists() {
        SupportConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(SupportConfig::default())
    }
}

fn init_tracing(log_level: Option<&str>, forwarder: Option<ForwardLayer>) {
    let filter = log_level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(forwarder)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let forwarder = Arc::new(Forwarder::new(&config.forwarder));
            let layer = ForwardLayer::new(Arc::clone(&forwarder), config.forwarder.tracing_threshold);
            init_tracing(cli.log_level.as_deref(), Some(layer));
            serve(config, forwarder).await
        }
        Commands::CoreHandler {
            daemon,
            pid,
            signal,
        } => {
            init_tracing(cli.log_level.as_deref(), None);
            core_handler(&config, &daemon, pid, signal).await
        }
    }
}

async fn serve(config: SupportConfig, forwarder: Arc<Forwarder>) -> Result<()> {
    let mut support = Supportd::start_with(config, forwarder).context("starting opsdiagd")?;
    let shell = Arc::clone(support.shell());

    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let output = shell.execute(&line).await;
                stdout.write_all(output.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
        }
    }

    support.shutdown();
    Ok(())
}

async fn core_handler(config: &SupportConfig, daemon: &str, pid: u32, signal: i32) -> Result<()> {
    let spool = &config.paths.core_spool_dir;
    tokio::fs::create_dir_all(spool)
        .await
        .with_context(|| format!("creating {}", spool.display()))?;

    let path = spool.join(format!("core.{pid}"));
    let mut file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;
    let bytes = tokio::io::copy(&mut tokio::io::stdin(), &mut file)
        .await
        .context("spooling core")?;
    file.flush().await?;
    tracing::info!(daemon = %daemon, pid, signal, bytes, "core spooled");

    let socket = &config.paths.control_socket;
    let run_dir = socket.parent().unwrap_or_else(|| Path::new("."));
    let name = socket
        .file_stem()
        .and_then(|s| s.to_str())
        .context("control socket has no file name")?;

    ControlClient::new(run_dir)
        .call_ok(
            name,
            CORE_REPORT_METHOD,
            vec![
                daemon.to_string(),
                pid.to_string(),
                signal.to_string(),
                path.display().to_string(),
            ],
            config.timeouts.control,
        )
        .await
        .context("reporting crash to opsdiagd")?;
    Ok(())
}
