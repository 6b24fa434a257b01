//! Polling update coordinator.
//!
//! Drives `Account::refresh` on a fixed interval and fans out a
//! "data updated" notification through a `watch` version counter.
//! Entity adapters subscribe and re-read their device handles when the
//! version bumps.

use std::sync::Arc;
use std::time::Duration;

use sentra_api::Account;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Periodic refresh driver for one account.
pub struct UpdateCoordinator {
    account: Arc<Account>,
    version: watch::Sender<u64>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UpdateCoordinator {
    /// Start the refresh loop. The first refresh happens one full
    /// interval after start; the initial device load is the caller's job.
    pub fn start(account: Arc<Account>, interval: Duration) -> Self {
        let (version, _) = watch::channel(0);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(refresh_task(
            Arc::clone(&account),
            version.clone(),
            interval,
            cancel.clone(),
        ));

        Self {
            account,
            version,
            cancel,
            task: Some(task),
        }
    }

    /// Subscribe to refresh notifications. The `watch` value is a
    /// monotonically increasing refresh counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Run a refresh immediately, outside the schedule.
    pub async fn refresh_now(&self) -> crate::error::Result<()> {
        self.account.refresh().await?;
        self.version.send_modify(|v| *v += 1);
        Ok(())
    }

    /// Stop the background loop. Subscribers keep their last version.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for UpdateCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh_task(
    account: Arc<Account>,
    version: watch::Sender<u64>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                match account.refresh().await {
                    Ok(()) => {
                        version.send_modify(|v| *v += 1);
                        debug!("periodic refresh complete");
                    }
                    Err(e) => warn!(error = %e, "periodic refresh failed"),
                }
            }
        }
    }

    debug!("refresh task exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sentra_api::TransportConfig;
    use url::Url;

    fn test_account() -> Arc<Account> {
        let url = Url::parse("https://api.sentra.example").unwrap();
        Arc::new(Account::new(url, &TransportConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn subscribers_start_at_version_zero() {
        let mut coordinator = UpdateCoordinator::start(test_account(), Duration::from_secs(300));

        let rx = coordinator.subscribe();
        assert_eq!(*rx.borrow(), 0);

        coordinator.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_loop() {
        let mut coordinator = UpdateCoordinator::start(test_account(), Duration::from_secs(300));
        let rx = coordinator.subscribe();

        coordinator.stop();

        // A full interval after stop, no refresh has been attempted:
        // the version is untouched.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(*rx.borrow(), 0);
    }
}
