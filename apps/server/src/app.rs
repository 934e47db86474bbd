//! Wires the storage engine into the WebSocket server and runs it until
//! shutdown.

use std::sync::Arc;

use slicevault_server::{FileServer, TransferService};
use slicevault_transfer::TransferCoordinator;

use crate::config::Config;

/// Runs the server until Ctrl-C or a fatal server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let coordinator = TransferCoordinator::new(config.transfer_settings());
    coordinator.prepare().await?;

    let server = FileServer::new(config.server_config(), TransferService::new(coordinator));
    let server_run = Arc::clone(&server);
    let mut task = tokio::spawn(async move { server_run.run().await });

    tokio::select! {
        result = &mut task => {
            // The server only returns on its own if binding failed.
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    server.shutdown();
    task.await??;
    Ok(())
}
