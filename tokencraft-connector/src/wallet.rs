//! # Wallet Connection Lifecycle
//!
//! The [`WalletConnectionManager`] owns the single attached [`WalletAdapter`] and the
//! `Disconnected -> Connecting -> Connected -> Disconnected` state machine around it. Every
//! transition bumps a monotonic generation counter and is published through a `watch`
//! channel, so downstream components can use the generation as the identity of their inputs
//! and compare it synchronously before writing derived state.

use crate::error::{AdapterError, ConnectorError};
use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, warn};

/// The operations a wallet adapter offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletCapabilities {
    pub connect: bool,
    pub disconnect: bool,
    pub sign_transaction: bool,
    pub sign_all_transactions: bool,
}

impl WalletCapabilities {
    pub const fn full() -> Self {
        Self {
            connect: true,
            disconnect: true,
            sign_transaction: true,
            sign_all_transactions: true,
        }
    }
}

impl Default for WalletCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// An external component holding the user's key pair.
///
/// `connect` and the signing methods may suspend for as long as the user takes to approve
/// the request out of band.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// A human-readable adapter name, e.g. `"Phantom"` or `"keypair"`.
    fn name(&self) -> &str;

    fn capabilities(&self) -> WalletCapabilities {
        WalletCapabilities::full()
    }

    /// Requests authorization and returns the wallet's public key.
    async fn connect(&self) -> Result<Pubkey, AdapterError>;

    async fn disconnect(&self) -> Result<(), AdapterError>;

    /// Signs a transaction whose message is already complete.
    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, AdapterError>;

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, AdapterError>;
}

/// The identity of a connected wallet. Exists only while connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletIdentity {
    pub pubkey: Pubkey,
    pub adapter_name: String,
    pub capabilities: WalletCapabilities,
    /// The generation at which this identity was attached.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The value published on every wallet transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletState {
    pub status: ConnectionStatus,
    pub identity: Option<WalletIdentity>,
    pub generation: u64,
}

impl WalletState {
    fn transition(&mut self, status: ConnectionStatus, identity: Option<WalletIdentity>) {
        self.status = status;
        self.identity = identity;
        self.generation += 1;
    }
}

/// Owns the attached wallet adapter and its connection state machine.
pub struct WalletConnectionManager {
    adapter: watch::Sender<Arc<dyn WalletAdapter>>,
    state: watch::Sender<WalletState>,
    connect_timeout: Duration,
}

impl WalletConnectionManager {
    pub fn new(adapter: Arc<dyn WalletAdapter>, connect_timeout: Duration) -> Self {
        let (state, _) = watch::channel(WalletState::default());
        let (adapter, _) = watch::channel(adapter);
        Self {
            adapter,
            state,
            connect_timeout,
        }
    }

    /// Returns a receiver that observes every wallet transition.
    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WalletState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn identity(&self) -> Option<WalletIdentity> {
        self.state.borrow().identity.clone()
    }

    pub fn adapter(&self) -> Arc<dyn WalletAdapter> {
        self.adapter.borrow().clone()
    }

    /// Returns the connected identity together with the adapter that signs for it.
    pub fn connected(&self) -> Result<(WalletIdentity, Arc<dyn WalletAdapter>), ConnectorError> {
        let identity = self.identity().ok_or(ConnectorError::NotConnected)?;
        Ok((identity, self.adapter()))
    }

    fn is_attached(&self, adapter: &Arc<dyn WalletAdapter>) -> bool {
        Arc::ptr_eq(&*self.adapter.borrow(), adapter)
    }

    /// Asks the attached adapter for authorization.
    ///
    /// Returns the current identity if a wallet is already connected. A second call while an
    /// authorization is pending is rejected. Rejection and timeout both leave the manager
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<WalletIdentity, ConnectorError> {
        let adapter = self.adapter();

        let mut existing = None;
        let mut in_progress = false;
        let mut attempt_generation = 0;
        self.state.send_if_modified(|state| match state.status {
            ConnectionStatus::Connected => {
                existing = state.identity.clone();
                false
            }
            ConnectionStatus::Connecting => {
                in_progress = true;
                false
            }
            ConnectionStatus::Disconnected => {
                state.transition(ConnectionStatus::Connecting, None);
                attempt_generation = state.generation;
                true
            }
        });

        if let Some(identity) = existing {
            return Ok(identity);
        }
        if in_progress {
            return Err(ConnectorError::WalletRejected(
                "connection already in progress".to_string(),
            ));
        }

        info!(adapter = adapter.name(), "Connecting wallet");
        let outcome = match tokio::time::timeout(self.connect_timeout, adapter.connect()).await {
            Ok(Ok(pubkey)) => Ok(pubkey),
            Ok(Err(e)) => Err(ConnectorError::WalletRejected(e.to_string())),
            Err(_) => Err(ConnectorError::WalletRejected(format!(
                "authorization timed out after {} ms",
                self.connect_timeout.as_millis()
            ))),
        };

        let capabilities = adapter.capabilities();
        let adapter_name = adapter.name().to_string();
        let mut result = Err(ConnectorError::WalletRejected(
            "connection attempt was superseded".to_string(),
        ));
        let mut release = false;
        self.state.send_if_modified(|state| {
            // A disconnect or swap during authorization owns the state now.
            let attached = self.is_attached(&adapter);
            if state.generation != attempt_generation || !attached {
                // Authorized but discarded: release it unless a newer attempt holds it.
                release = outcome.is_ok()
                    && !(attached && state.status != ConnectionStatus::Disconnected);
                return false;
            }
            match &outcome {
                Ok(pubkey) => {
                    let identity = WalletIdentity {
                        pubkey: *pubkey,
                        adapter_name,
                        capabilities,
                        generation: state.generation + 1,
                    };
                    state.transition(ConnectionStatus::Connected, Some(identity.clone()));
                    result = Ok(identity);
                }
                Err(e) => {
                    state.transition(ConnectionStatus::Disconnected, None);
                    result = Err(e.clone());
                }
            }
            true
        });

        if release {
            release_adapter(adapter.as_ref()).await;
        }
        match &result {
            Ok(identity) => info!(
                pubkey = %identity.pubkey,
                generation = identity.generation,
                "Wallet connected"
            ),
            Err(e) => warn!(error = %e, "Wallet connection failed"),
        }
        result
    }

    /// Releases the wallet. The manager ends up `Disconnected` even if the adapter fails.
    pub async fn disconnect(&self) {
        let adapter = self.adapter();
        if !self.release_state() {
            return;
        }
        release_adapter(adapter.as_ref()).await;
        info!(generation = self.state.borrow().generation, "Wallet disconnected");
    }

    /// Replaces the attached adapter.
    ///
    /// The adapter is replaced and a connected (or connecting) wallet is moved to
    /// `Disconnected` in one step, before the old adapter is released. The new adapter is
    /// then connected if the old one was active, so dependents always observe an
    /// intermediate `Disconnected` state and never an identity from the old adapter.
    pub async fn swap(
        &self,
        adapter: Arc<dyn WalletAdapter>,
    ) -> Result<Option<WalletIdentity>, ConnectorError> {
        info!(adapter = adapter.name(), "Swapping wallet adapter");
        let previous = self.adapter.send_replace(adapter);
        let was_active = self.release_state();

        if was_active {
            release_adapter(previous.as_ref()).await;
            info!(generation = self.state.borrow().generation, "Wallet disconnected");
            self.connect().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Moves the state to `Disconnected`. Returns `false` if it already was.
    fn release_state(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.status == ConnectionStatus::Disconnected {
                return false;
            }
            state.transition(ConnectionStatus::Disconnected, None);
            true
        })
    }
}

async fn release_adapter(adapter: &dyn WalletAdapter) {
    if let Err(e) = adapter.disconnect().await {
        warn!(adapter = adapter.name(), error = %e, "Wallet adapter failed to disconnect");
    }
}
