use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fabric_core::state::State;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod connection;

/// Distributed task-execution fabric: the Controller node.
#[derive(Parser, Debug)]
#[command(name = "fabric-controller", about = "Coordinates worker nodes over a framed TCP protocol")]
struct Args {
    /// Host address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Maximum number of pending (queued) connections the listener backlog
    /// will hold before the OS starts rejecting new ones.
    #[arg(long = "max-connections", default_value_t = 100)]
    max_connections: u32,

    /// Worker heartbeat timeout in seconds, strictly greater than the
    /// recommended 30s worker heartbeat interval.
    #[arg(long = "heartbeat-timeout-secs", default_value_t = 60)]
    heartbeat_timeout_secs: u64,

    /// Reaper Loop tick period in seconds.
    #[arg(long = "reaper-interval-secs", default_value_t = 30)]
    reaper_interval_secs: u64,

    /// Scheduler Loop tick period in seconds.
    #[arg(long = "scheduler-interval-secs", default_value_t = 1)]
    scheduler_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "controller exited with error");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, max_connections = args.max_connections, "controller listening");

    let state = Arc::new(State::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = tokio::spawn(fabric_core::loops::scheduler_loop(
        state.clone(),
        Duration::from_secs(args.scheduler_interval_secs),
        shutdown_rx.clone(),
    ));
    let reaper_handle = tokio::spawn(fabric_core::loops::reaper_loop(
        state.clone(),
        Duration::from_secs(args.reaper_interval_secs),
        Duration::from_secs(args.heartbeat_timeout_secs),
        shutdown_rx.clone(),
    ));

    let accept_result = accept_loop(listener, state.clone(), shutdown_rx.clone()).await;

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    let _ = reaper_handle.await;

    accept_result
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<State>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                tracing::debug!(%peer, "new connection");
                let state = state.clone();
                tokio::spawn(async move {
                    connection::handle_connection(socket, peer, state).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt signal, shutting down");
                return Ok(());
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}
