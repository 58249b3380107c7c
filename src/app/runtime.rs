use super::orchestrator::SharedShutdownSender;
use super::{RovercamOrchestrator, ShutdownReason};
use crate::error::{Result, RovercamError};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

impl RovercamOrchestrator {
    /// Run until a shutdown signal arrives, then shut down and return the exit code
    pub async fn run(&mut self) -> Result<i32> {
        info!("Rovercam system is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| RovercamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(Arc::clone(&self.shutdown_sender));

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| RovercamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Rovercam system shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: SharedShutdownSender) {
        // SIGTERM - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // SIGINT (Ctrl+C)
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
