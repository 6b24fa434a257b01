//! Session manager.
//!
//! The `Hub` owns the account session end to end: cookie cache restore
//! on login, MFA follow-up, periodic refresh via the coordinator, the
//! hub-scoped event bus, and idempotent teardown.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sentra_api::model::DeviceKey;
use sentra_api::{Account, AccountEvent, TransportConfig, session};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::coordinator::UpdateCoordinator;
use crate::error::{CoreError, Result};

const HUB_EVENT_CAPACITY: usize = 256;

/// Events on the hub's outbound bus. Consumed by the entity adapters
/// and by anything else the host wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubEvent {
    /// A camera reported motion.
    Motion(DeviceKey),
    /// A doorbell camera was pressed.
    DoorbellDing(DeviceKey),
    /// A device appeared that setup has not seen.
    DeviceAdded(DeviceKey),
}

/// Callback invoked once when the hub is torn down.
pub type TeardownFn = Box<dyn FnOnce() + Send>;

/// Connection flags captured at login, reused after MFA verification.
#[derive(Debug, Clone, Copy)]
struct ConnectFlags {
    load_devices: bool,
    subscribe_realtime: bool,
}

/// One logged-in Sentra Cloud hub.
pub struct Hub {
    config: HubConfig,
    account: Arc<Account>,
    cache_path: PathBuf,
    logged_in: AtomicBool,
    event_tx: broadcast::Sender<HubEvent>,
    coordinator: Mutex<Option<UpdateCoordinator>>,
    teardown: Mutex<Option<TeardownFn>>,
    pending_connect: Mutex<Option<ConnectFlags>>,
}

impl Hub {
    /// Build a hub from configuration. No network traffic yet.
    pub fn new(config: HubConfig) -> Result<Self> {
        let transport = TransportConfig::default();
        let account = Arc::new(Account::new(config.api_url.clone(), &transport)?);
        let cache_path = session::cache_path(&config.cache_dir);
        let (event_tx, _) = broadcast::channel(HUB_EVENT_CAPACITY);

        Ok(Self {
            config,
            account,
            cache_path,
            logged_in: AtomicBool::new(false),
            event_tx,
            coordinator: Mutex::new(None),
            teardown: Mutex::new(None),
            pending_connect: Mutex::new(None),
        })
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    /// Subscribe to the hub event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback fired exactly once on teardown. A second
    /// registration replaces an unfired first one.
    pub async fn on_teardown(&self, callback: TeardownFn) {
        *self.teardown.lock().await = Some(callback);
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Log in and establish the session.
    ///
    /// A previously cached session cookie is restored best-effort before
    /// authenticating; a valid cookie lets the server skip the second
    /// factor. Returns whether the cache was restored. An
    /// [`Error::MfaRequired`](sentra_api::Error::MfaRequired) result
    /// means a code was sent; follow up with
    /// [`verify_mfa`](Self::verify_mfa).
    pub async fn login(
        self: &Arc<Self>,
        load_devices: bool,
        subscribe_realtime: bool,
    ) -> Result<bool> {
        let restored = self.restore_session();

        *self.pending_connect.lock().await = Some(ConnectFlags {
            load_devices,
            subscribe_realtime,
        });

        let result = self
            .account
            .client()
            .login(&self.config.username, &self.config.password)
            .await;

        if let Err(e) = result {
            if matches!(e, sentra_api::Error::MfaRequired) {
                info!("multi-factor verification required to finish login");
            }
            return Err(e.into());
        }

        self.finish_login().await?;
        Ok(restored)
    }

    /// Submit the second-factor code for a login that returned
    /// `MfaRequired`, then finish establishing the session.
    pub async fn verify_mfa(self: &Arc<Self>, code: &str) -> Result<()> {
        if self.pending_connect.lock().await.is_none() {
            return Err(CoreError::NotLoggedIn);
        }

        self.account.client().verify_mfa(code).await?;
        self.finish_login().await
    }

    /// Post-authentication steps shared by `login` and `verify_mfa`:
    /// connect the account, persist the session, start the coordinator
    /// and the event bridge.
    async fn finish_login(self: &Arc<Self>) -> Result<()> {
        let flags = self
            .pending_connect
            .lock()
            .await
            .take()
            .ok_or(CoreError::NotLoggedIn)?;

        self.account
            .connect(flags.load_devices, flags.subscribe_realtime)
            .await?;

        self.save_session();
        self.logged_in.store(true, Ordering::Release);

        let interval = Duration::from_secs(self.config.refresh_interval_secs);
        *self.coordinator.lock().await =
            Some(UpdateCoordinator::start(Arc::clone(&self.account), interval));

        self.spawn_event_bridge();

        info!(
            devices = self.account.registry().len(),
            "hub session established"
        );
        Ok(())
    }

    // ── Session cache ────────────────────────────────────────────────

    /// Best-effort cookie restore. Failure means a fresh login, never an
    /// error.
    fn restore_session(&self) -> bool {
        match session::load(
            &self.cache_path,
            self.account.client().cookie_jar(),
            self.account.client().base_url(),
        ) {
            Ok(restored) => {
                if restored {
                    debug!("restored previous session from cache");
                }
                restored
            }
            Err(e) if e.is_not_found() => {
                debug!("no previous session found");
                false
            }
            Err(e) => {
                debug!(error = %e, "session cache restore failed, logging in fresh");
                false
            }
        }
    }

    /// Persist the session cookie jar. Persist failures are logged, not
    /// propagated; the session itself is fine.
    fn save_session(&self) {
        let result = session::save(
            &self.cache_path,
            self.account.client().cookie_jar(),
            self.account.client().base_url(),
        );
        if let Err(e) = result {
            warn!(error = %e, "failed to persist session cache");
        }
    }

    /// Delete the session cache file. `NotFound` propagates; callers
    /// that do not care check [`Error::is_not_found`](sentra_api::Error::is_not_found).
    pub fn remove_cache_file(&self) -> Result<()> {
        session::remove(&self.cache_path)?;
        Ok(())
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Tear the session down. Idempotent: the second and later calls
    /// return immediately. The registered teardown callback fires at
    /// most once, on the call that actually tears down.
    pub async fn disconnect(&self, remove_cache: bool) {
        if !self.logged_in.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(mut coordinator) = self.coordinator.lock().await.take() {
            coordinator.stop();
        }

        self.account.disconnect().await;

        if remove_cache {
            if let Err(e) = self.remove_cache_file() {
                if !matches!(&e, CoreError::Api(inner) if inner.is_not_found()) {
                    warn!(error = %e, "failed to remove session cache");
                }
            }
        }

        if let Some(callback) = self.teardown.lock().await.take() {
            callback();
        }

        info!("hub disconnected");
    }

    // ── Event bridge ─────────────────────────────────────────────────

    /// Forward account events onto the hub bus.
    fn spawn_event_bridge(self: &Arc<Self>) {
        let mut events = self.account.subscribe();
        let hub = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AccountEvent::MotionDetected(key)) => {
                        let _ = hub.event_tx.send(HubEvent::Motion(key));
                    }
                    Ok(AccountEvent::DoorbellDing(key)) => {
                        let _ = hub.event_tx.send(HubEvent::DoorbellDing(key));
                    }
                    Ok(AccountEvent::DeviceAdded(key)) => {
                        let _ = hub.event_tx.send(HubEvent::DeviceAdded(key));
                    }
                    // State diffs flow through the registry watch channels.
                    Ok(AccountEvent::DeviceUpdated(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "hub event bridge lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("hub event bridge exiting");
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::sync::atomic::AtomicU32;
    use url::Url;

    fn test_hub(cache_dir: &std::path::Path) -> Arc<Hub> {
        let config = HubConfig {
            username: "alice@example.com".to_owned(),
            password: SecretString::from("hunter2"),
            cache_dir: cache_dir.to_path_buf(),
            api_url: Url::parse("https://api.sentra.example").unwrap(),
            refresh_interval_secs: 300,
            camera: crate::config::CameraOptions::default(),
        };
        Arc::new(Hub::new(config).unwrap())
    }

    #[tokio::test]
    async fn disconnect_before_login_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let hub = test_hub(dir.path());

        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        hub.on_teardown(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        hub.disconnect(false).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn teardown_fires_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let hub = test_hub(dir.path());

        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        hub.on_teardown(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        // Simulate an established session.
        hub.logged_in.store(true, Ordering::Release);

        hub.disconnect(false).await;
        hub.disconnect(false).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remove_cache_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let hub = test_hub(dir.path());

        let err = hub.remove_cache_file().unwrap_err();
        assert!(matches!(&err, CoreError::Api(e) if e.is_not_found()), "got {err:?}");
    }

    #[tokio::test]
    async fn verify_mfa_without_pending_login_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let hub = test_hub(dir.path());

        let err = hub.verify_mfa("424242").await.unwrap_err();
        assert!(matches!(err, CoreError::NotLoggedIn));
    }
}
