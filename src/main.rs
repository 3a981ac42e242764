use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use conductor::api::{run_api, ApiState};
use conductor::config::ConductorConfig;
use conductor::database::JobDatabase;
use conductor::executor::JobExecutor;
use conductor::queue::heartbeat::HeartbeatSender;
use conductor::queue::{JobQueueService, QueueContext};
use conductor::shutdown;

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "A single-process job orchestrator with dependency-aware scheduling")]
struct Args {
    /// Port to serve requests on
    #[arg(long, short = 'p', default_value = "4444")]
    port: u16,

    /// Number of concurrent threads to leverage
    #[arg(long, short = 'n', default_value = "4")]
    num_allowed_threads: usize,

    /// Path of the queue checkpoint file
    #[arg(long, default_value = "conductor-queue.json")]
    checkpoint_path: PathBuf,

    /// Milliseconds between queue heartbeats
    #[arg(long, default_value = "1000")]
    heartbeat_interval_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = ConductorConfig {
        listen_addr,
        num_allowed_threads: args.num_allowed_threads,
        checkpoint_path: args.checkpoint_path,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        ..Default::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.num_allowed_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(config));
    Ok(())
}

async fn run(config: ConductorConfig) {
    tracing::info!(
        listen_addr = %config.listen_addr,
        threads = config.num_allowed_threads,
        checkpoint = %config.checkpoint_path.display(),
        "Starting conductor"
    );

    let database = JobDatabase::spawn(&config.checkpoint_path);
    let executor = JobExecutor::spawn(config.executor.clone());
    let ctx = QueueContext {
        executor,
        database,
        budgets: config.budgets.clone(),
    };

    let (service, input_rx) = JobQueueService::new(ctx, config.mailbox_capacity);
    let client = service.client();
    let heartbeat_tx = service.input_sender();

    let shutdown = shutdown::shutdown_token();

    let service_handle = tokio::spawn(service.run(input_rx, shutdown.clone()));

    let heartbeat = HeartbeatSender::new(config.heartbeat_interval_ms);
    tokio::spawn(async move {
        heartbeat.run(heartbeat_tx).await;
    });

    run_api(
        config.listen_addr,
        ApiState { queue: client },
        shutdown.clone(),
    )
    .await;

    // The API only returns once shutdown is under way; wait for the queue
    // to finish its final checkpoint.
    if let Err(e) = service_handle.await {
        tracing::error!(error = %e, "Queue service task failed");
    }
}
