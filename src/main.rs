use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cluster_inventory::cli::{run_command, Cli, Commands, ServeArgs};
use cluster_inventory::config::{connect_control_plane, ControlPlaneSource, InventoryConfig};
use cluster_inventory::discovery::{DiscoveryOutcome, InClusterEnvironment};
use cluster_inventory::inventory::ClusterInventory;
use cluster_inventory::kube::HttpConnector;
use cluster_inventory::monitor::spawn_monitor;
use cluster_inventory::server::{create_router, AppState};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }
    // parse again so env fallbacks see the loaded file
    let cli = if cli.env_file.is_some() { Cli::parse() } else { cli };

    let mut config = cli.settings.to_config();

    // validate never needs a control plane
    if let Commands::Validate(ref args) = cli.command {
        match cluster_inventory::cli::validate_file(&args.file) {
            Ok(output) => print!("{}", output.text),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    let environment = InClusterEnvironment::from_env();
    if let Commands::Serve(ref args) = cli.command {
        config.check_interval = args.check_interval();
    }

    let (api, source) = connect_control_plane(&environment, &config).await;
    let inventory =
        ClusterInventory::from_config(api, Arc::new(HttpConnector), environment, &config);

    match cli.command {
        Commands::Serve(ref args) => serve(args, &config, inventory, source).await,
        ref command => match run_command(&inventory, command).await {
            Ok(output) => {
                print!("{}", output.text);
                if !output.success {
                    process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
    }
}

async fn serve(
    args: &ServeArgs,
    config: &InventoryConfig,
    inventory: ClusterInventory,
    source: ControlPlaneSource,
) {
    if args.no_discovery {
        info!("Startup discovery disabled");
    } else {
        match inventory.discover(false).await {
            DiscoveryOutcome::Failed(reason) => warn!("Startup discovery failed: {}", reason),
            outcome => info!("{}", outcome.message()),
        }
    }

    let monitor = config
        .check_interval
        .map(|interval| spawn_monitor(inventory.clone(), interval));

    let state = AppState::new(inventory, source);
    if !state.is_ready() {
        warn!("No Kubernetes client configured; inventory requests will return 503");
    }
    let app = create_router(state);

    let addr = args.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        }
    };

    info!("Cluster inventory listening on {}", addr);
    info!("Endpoints:");
    info!("  GET    /health                      - Health check");
    info!("  GET    /clusters                    - List clusters");
    info!("  POST   /clusters                    - Register a cluster");
    info!("  POST   /clusters/{{id}}/test          - Test connectivity");
    info!("  POST   /clusters/discover           - Register the hosting cluster");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(monitor) = monitor {
        let _ = monitor.send(true);
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
