use std::sync::Arc;

use apiary_config::ConfigFile;
use clap::Parser;
use eyre::{bail, Result as EyreResult};
use tokio::select;
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::cli::RootArgs;

/// Run a node
#[derive(Debug, Parser)]
pub struct RunCommand;

impl RunCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let path = root_args.home;

        if !ConfigFile::exists(&path) {
            bail!("Node is not initialized in {path:?}");
        }

        let (network_config, server_config) = ConfigFile::load(&path)?.into_network_config();

        let network = apiary_network::run(&network_config).await?;

        info!(
            overlay = %network.overlay(),
            peer_id = %network.peer_id(),
            network_id = network.network_id(),
            "Node started",
        );

        let shutdown = network.shutdown_token();
        let tracker = TaskTracker::new();

        drop(tracker.spawn({
            let network = network.clone();
            let shutdown = shutdown.clone();

            async move {
                let source = Arc::new(network);

                let result = apiary_server::start(server_config, source, shutdown.clone()).await;

                if let Err(err) = result {
                    error!(%err, "debug API stopped");
                    shutdown.cancel();
                }
            }
        }));

        tracker.close();

        let result = wait_for_shutdown(&shutdown).await;

        network.shutdown();
        tracker.wait().await;

        result
    }
}

async fn wait_for_shutdown(shutdown: &CancellationToken) -> EyreResult<()> {
    select! {
        result = ctrl_c() => {
            result?;
            info!("Received interrupt, shutting down");
        }
        () = shutdown.cancelled() => {}
    }

    Ok(())
}
