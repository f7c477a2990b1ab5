//! Main application entry point for the master server.
//!
//! Loads configuration, initializes logging, binds both protocol
//! listeners, and runs until a termination signal arrives.

use tracing::{error, info};

use master_server::cli::CliArgs;
use master_server::config::AppConfig;
use master_server::net::{self, Service};
use master_server::state::SharedState;
use master_server::{logging, shutdown};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;

    // CLI overrides take precedence over the file.
    if let Some(bind) = args.plasma_bind {
        config.server.plasma_bind = bind;
    }
    if let Some(bind) = args.theater_bind {
        config.server.theater_bind = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    logging::setup(&config.logging)?;

    let server_config = config.to_server_config()?;
    info!("starting master server");
    info!("session service (plasma) on {}", server_config.plasma_bind);
    info!("game hosting (theater) on {}", server_config.theater_bind);

    let plasma_listeners =
        net::build_listeners(server_config.plasma_bind, server_config.use_reuse_port)?;
    let theater_listeners =
        net::build_listeners(server_config.theater_bind, server_config.use_reuse_port)?;

    let shared = SharedState::new(server_config);
    let mut acceptors = net::spawn_acceptors(shared.clone(), plasma_listeners, Service::Plasma);
    acceptors.extend(net::spawn_acceptors(
        shared.clone(),
        theater_listeners,
        Service::Theater,
    ));
    info!("ready ({} acceptor task(s))", acceptors.len());

    let shutdown_rx = shutdown::setup_shutdown_handler().await;
    if shutdown_rx.await.is_err() {
        error!("shutdown handler dropped unexpectedly");
    }

    info!("stopping acceptors");
    for acceptor in acceptors {
        acceptor.abort();
    }
    info!("goodbye");
    Ok(())
}
