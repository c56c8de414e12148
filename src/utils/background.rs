use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Trait defining scheduling and running of background tasks for storage/cache
#[async_trait]
pub trait BackgroundService {
    /// Defines period of running background task
    fn background_period(&self) -> Duration;

    /// Background task for storage
    async fn background(&self);

    /// Called once on shutdown
    async fn stop(&self) {}
}

/// Runs every service on its own period until `shutdown` is cancelled, then stops it
pub fn serve_background(
    services: Vec<Arc<dyn BackgroundService + Send + Sync>>,
    shutdown: CancellationToken,
) -> JoinSet<()> {
    let mut futures = JoinSet::new();

    for service in services {
        let shutdown = shutdown.clone();
        futures.spawn(async move {
            let interval = service.background_period();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        service.background().await;
                    }
                    _ = shutdown.cancelled() => {
                        service.stop().await;
                        break;
                    }
                }
            }
        });
    }

    futures
}
