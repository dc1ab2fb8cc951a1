//! Registration handshake with the platform advertising manager.
//!
//! [`Advertiser::run`] drives one advertisement through its whole life:
//!
//! 1. find the first adapter exposing `org.bluez.LEAdvertisingManager1`
//! 2. power it on
//! 3. export the advertisement object and call `RegisterAdvertisement`
//! 4. wait for shutdown while registered
//! 5. unregister and detach
//!
//! The registration reply is awaited as a single future racing the shutdown
//! future. A rejected registration ends the run immediately; nothing is retried.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::advertisement::Advertisement;
use crate::error::{AdvertError, Result};

/// Backend that talks to the platform advertising manager.
///
/// [`BluezManager`](crate::bluez::BluezManager) implements this over D-Bus.
#[async_trait]
pub trait AdvertisingManager: Send + Sync {
    /// Object path of the first adapter exposing the LE advertising manager,
    /// or `None` if there is none.
    async fn find_adapter(&self) -> Result<Option<String>>;

    /// Sets the adapter's `Powered` property to `true`.
    async fn power_on(&self, adapter: &str) -> Result<()>;

    /// Reads the adapter's supported roles.
    async fn adapter_roles(&self, adapter: &str) -> Result<Vec<String>>;

    /// Starts serving `advertisement` at its object path.
    fn export(&self, advertisement: Arc<Advertisement>) -> Result<()>;

    /// Calls `RegisterAdvertisement(path, {})`, resolving once the manager replies.
    async fn register(&self, adapter: &str, path: &str) -> Result<()>;

    /// Calls `UnregisterAdvertisement(path)`.
    async fn unregister(&self, adapter: &str, path: &str) -> Result<()>;

    /// Stops serving the object at `path`.
    fn detach(&self, path: &str);
}

/// Observable lifecycle of an [`Advertiser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    /// Not started.
    Idle,
    /// Enumerating managed objects.
    DiscoveringAdapter,
    /// Powering the adapter on.
    PoweringOn,
    /// `RegisterAdvertisement` is in flight.
    Registering,
    /// Registered and advertising.
    Running,
    /// Tearing down after shutdown.
    Stopping,
    /// Torn down cleanly.
    Stopped,
    /// Ended by an error.
    Failed,
}

impl fmt::Display for AdvertiserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::DiscoveringAdapter => "discovering-adapter",
            Self::PoweringOn => "powering-on",
            Self::Registering => "registering",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Drives an advertisement through registration and teardown.
pub struct Advertiser<M> {
    manager: M,
    state: watch::Sender<AdvertiserState>,
}

impl<M: AdvertisingManager> Advertiser<M> {
    /// Create an advertiser on top of `manager`.
    pub fn new(manager: M) -> Self {
        let (state, _) = watch::channel(AdvertiserState::Idle);
        Self { manager, state }
    }

    /// The backend this advertiser drives.
    pub const fn manager(&self) -> &M {
        &self.manager
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AdvertiserState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<AdvertiserState> {
        self.state.subscribe()
    }

    /// Register `advertisement` and keep it registered until `shutdown` resolves.
    ///
    /// Takes ownership of the advertisement: it cannot be modified once handed
    /// to the manager.
    ///
    /// # Errors
    ///
    /// - [`AdvertError::AdapterNotFound`] if no adapter exposes the advertising
    ///   manager. Nothing is powered on or registered.
    /// - [`AdvertError::RegistrationFailed`] if the manager rejects the
    ///   advertisement. The run ends without reaching [`AdvertiserState::Running`].
    /// - [`AdvertError::Bus`] if a bus call fails along the way.
    #[instrument(skip_all, fields(path = %advertisement.path()))]
    pub async fn run<F>(&self, advertisement: Advertisement, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let result = self.run_inner(advertisement, shutdown).await;
        if result.is_err() {
            self.set_state(AdvertiserState::Failed);
        }
        result
    }

    async fn run_inner<F>(&self, advertisement: Advertisement, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        self.set_state(AdvertiserState::DiscoveringAdapter);
        let Some(adapter) = self.manager.find_adapter().await? else {
            error!("LEAdvertisingManager1 interface not found");
            return Err(AdvertError::AdapterNotFound);
        };
        info!(%adapter, "Found LE advertising manager");

        self.set_state(AdvertiserState::PoweringOn);
        self.manager.power_on(&adapter).await?;
        match self.manager.adapter_roles(&adapter).await {
            Ok(roles) => info!(%adapter, ?roles, "Adapter powered on"),
            Err(e) => warn!(%adapter, error = %e, "Adapter powered on, roles unavailable"),
        }

        let advertisement = Arc::new(advertisement);
        let path = advertisement.path().to_owned();
        self.manager.export(Arc::clone(&advertisement))?;

        self.set_state(AdvertiserState::Registering);
        info!("Advertising");

        let registration = tokio::select! {
            result = self.manager.register(&adapter, &path) => Some(result),
            () = &mut shutdown => None,
        };

        match registration {
            Some(Ok(())) => {
                info!("Advertisement registered");
                self.set_state(AdvertiserState::Running);
                shutdown.await;
                info!("Shutdown requested");
                self.teardown(&adapter, &path).await;
                Ok(())
            }
            Some(Err(e)) => {
                error!(error = %e, "Failed to register advertisement");
                self.manager.detach(&path);
                Err(e)
            }
            None => {
                info!("Shutdown requested while registration was pending");
                self.teardown(&adapter, &path).await;
                Ok(())
            }
        }
    }

    async fn teardown(&self, adapter: &str, path: &str) {
        self.set_state(AdvertiserState::Stopping);
        match self.manager.unregister(adapter, path).await {
            Ok(()) => info!("Advertisement unregistered"),
            Err(e) => warn!(error = %e, "Failed to unregister advertisement"),
        }
        self.manager.detach(path);
        self.set_state(AdvertiserState::Stopped);
    }

    fn set_state(&self, state: AdvertiserState) {
        debug!(%state, "Advertiser state changed");
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(AdvertiserState::DiscoveringAdapter.to_string(), "discovering-adapter");
        assert_eq!(AdvertiserState::Running.to_string(), "running");
    }
}
