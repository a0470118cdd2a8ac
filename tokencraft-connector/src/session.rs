//! # Session Runner & Read Surface
//!
//! The [`Session`] owns the reactive part of the pipeline: it watches the wallet, feeds the
//! [`ProgramBindingResolver`] and triggers the [`TokenDataAggregator`] whenever a new binding
//! is published. It is consumed by [`Session::run`], leaving the clonable [`SessionHandle`]
//! as the only way to read state and issue commands.
//!
//! Aggregation is only ever triggered from an observed binding, so for any wallet the binding
//! is published before its token accounts are fetched.

use crate::{
    aggregator::{AggregateSnapshot, SnapshotState, TokenDataAggregator},
    binding::{BindingKey, BindingState, ProgramBindingResolver},
    config::ConnectorConfig,
    connection::ConnectionHandle,
    error::ConnectorError,
    submitter::{TransactionReceipt, TransactionSubmitter},
    wallet::{ConnectionStatus, WalletAdapter, WalletConnectionManager, WalletIdentity, WalletState},
};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 16;

#[derive(Debug)]
enum SessionCommand {
    /// Answers whether a cycle was started, once it is marked in progress.
    Refresh(oneshot::Sender<bool>),
    Stop,
}

/// A clonable handle to a running [`Session`].
///
/// Reads are synchronous and always return the latest published value. Wallet and
/// transaction operations are forwarded to the shared wallet manager and submitter.
#[derive(Clone)]
pub struct SessionHandle {
    config: Arc<ConnectorConfig>,
    connection: ConnectionHandle,
    wallet: Arc<WalletConnectionManager>,
    submitter: Arc<TransactionSubmitter>,
    commands: mpsc::Sender<SessionCommand>,
    wallet_rx: watch::Receiver<WalletState>,
    binding_rx: watch::Receiver<BindingState>,
    snapshot_rx: watch::Receiver<SnapshotState>,
}

impl SessionHandle {
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn status(&self) -> ConnectionStatus {
        self.wallet_rx.borrow().status
    }

    pub fn identity(&self) -> Option<WalletIdentity> {
        self.wallet_rx.borrow().identity.clone()
    }

    pub fn binding_state(&self) -> BindingState {
        self.binding_rx.borrow().clone()
    }

    /// The most recently published snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<AggregateSnapshot>> {
        self.snapshot_rx.borrow().snapshot.clone()
    }

    pub fn snapshot_state(&self) -> SnapshotState {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe_wallet(&self) -> watch::Receiver<WalletState> {
        self.wallet_rx.clone()
    }

    pub fn subscribe_binding(&self) -> watch::Receiver<BindingState> {
        self.binding_rx.clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SnapshotState> {
        self.snapshot_rx.clone()
    }

    pub async fn connect(&self) -> Result<WalletIdentity, ConnectorError> {
        self.wallet.connect().await
    }

    pub async fn disconnect(&self) {
        self.wallet.disconnect().await
    }

    /// Attaches a different wallet adapter. See [`WalletConnectionManager::swap`].
    pub async fn swap_wallet(
        &self,
        adapter: Arc<dyn WalletAdapter>,
    ) -> Result<Option<WalletIdentity>, ConnectorError> {
        self.wallet.swap(adapter).await
    }

    pub async fn submit(&self, transaction: Transaction) -> Result<TransactionReceipt, ConnectorError> {
        self.submitter.submit(transaction).await
    }

    pub async fn submit_all(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<TransactionReceipt>, ConnectorError> {
        self.submitter.submit_all(transactions).await
    }

    /// Re-runs aggregation for the current binding. Ignored while no binding is live.
    ///
    /// Returns once the new cycle is marked in progress, so a following
    /// [`SessionHandle::wait_for_snapshot`] never reports the error of an earlier cycle.
    /// Returns `false` if no cycle was started.
    pub async fn refresh(&self) -> bool {
        let (ack, started) = oneshot::channel();
        if self.commands.send(SessionCommand::Refresh(ack)).await.is_err() {
            debug!("Session already stopped, refresh ignored");
            return false;
        }
        started.await.unwrap_or(false)
    }

    /// Sends a shutdown signal to the session loop.
    pub async fn stop(&self) {
        let _ = self.commands.send(SessionCommand::Stop).await;
    }

    /// Waits for a snapshot with a revision greater than `after`.
    ///
    /// Returns the error instead if the binding or the aggregation cycle fails first. Pass
    /// the revision observed before connecting or refreshing, e.g.
    /// `handle.snapshot_state().revision`. An error is only current once the cycle that
    /// should answer has started; await [`SessionHandle::refresh`] before waiting.
    pub async fn wait_for_snapshot(&self, after: u64) -> Result<Arc<AggregateSnapshot>, ConnectorError> {
        let mut snapshots = self.snapshot_rx.clone();
        let mut bindings = self.binding_rx.clone();
        let stopped = || ConnectorError::AggregationFailed("session stopped".to_string());

        loop {
            {
                let state = snapshots.borrow_and_update();
                if state.revision > after {
                    if let Some(snapshot) = &state.snapshot {
                        return Ok(snapshot.clone());
                    }
                }
                if !state.in_progress {
                    if let Some(e) = &state.last_error {
                        return Err(e.clone());
                    }
                }
            }
            if let Some(e) = &bindings.borrow_and_update().last_error {
                return Err(e.clone());
            }

            tokio::select! {
                changed = snapshots.changed() => changed.map_err(|_| stopped())?,
                changed = bindings.changed() => changed.map_err(|_| stopped())?,
            }
        }
    }
}

/// Drives the wallet -> binding -> snapshot pipeline.
pub struct Session {
    wallet_rx: watch::Receiver<WalletState>,
    binding_rx: watch::Receiver<BindingState>,
    resolver: ProgramBindingResolver,
    aggregator: TokenDataAggregator,
    commands: mpsc::Receiver<SessionCommand>,
}

impl Session {
    /// Creates a session and its handle. The session does nothing until [`Session::run`].
    ///
    /// # Arguments
    ///
    /// * `config` - The shared connector configuration.
    /// * `connection` - The process-wide connection handle.
    /// * `adapter` - The initially attached wallet adapter. It is not connected yet.
    pub fn new(
        config: Arc<ConnectorConfig>,
        connection: ConnectionHandle,
        adapter: Arc<dyn WalletAdapter>,
    ) -> Result<(Self, SessionHandle), ConnectorError> {
        let program_id = config.program.parse_program_id()?;

        let wallet = Arc::new(WalletConnectionManager::new(
            adapter,
            config.wallet.connect_timeout(),
        ));
        let resolver = ProgramBindingResolver::new(
            connection.clone(),
            program_id,
            wallet.subscribe(),
            config.program.cache_idl,
        );
        let aggregator = TokenDataAggregator::new(
            config.aggregator.clone(),
            wallet.subscribe(),
            resolver.subscribe(),
        );
        let submitter = Arc::new(TransactionSubmitter::new(
            connection.clone(),
            wallet.clone(),
            config.submitter.clone(),
        ));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let handle = SessionHandle {
            config,
            connection,
            submitter,
            commands: command_tx,
            wallet_rx: wallet.subscribe(),
            binding_rx: resolver.subscribe(),
            snapshot_rx: aggregator.subscribe(),
            wallet: wallet.clone(),
        };

        let session = Self {
            wallet_rx: wallet.subscribe(),
            binding_rx: resolver.subscribe(),
            resolver,
            aggregator,
            commands: command_rx,
        };

        Ok((session, handle))
    }

    /// Runs the session until [`SessionHandle::stop`] is called or every handle is dropped.
    pub async fn run(mut self) {
        info!("Session is running");
        self.on_wallet_changed();

        loop {
            tokio::select! {
                changed = self.wallet_rx.changed() => {
                    if changed.is_err() { break; }
                    self.on_wallet_changed();
                }
                changed = self.binding_rx.changed() => {
                    if changed.is_err() { break; }
                    self.on_binding_changed();
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Refresh(ack)) => {
                        let started = self.aggregator.refresh();
                        if !started {
                            debug!("No binding to refresh");
                        }
                        let _ = ack.send(started);
                    }
                    Some(SessionCommand::Stop) | None => break,
                },
            }
        }

        self.resolver.cancel();
        self.aggregator.cancel();
        info!("Session has shut down");
    }

    fn on_wallet_changed(&mut self) {
        let identity = self.wallet_rx.borrow_and_update().identity.clone();
        let key = identity.as_ref().map(BindingKey::from);
        if self.aggregator.key().is_some() && self.aggregator.key() != key {
            self.aggregator.invalidate();
        }
        self.resolver.update(identity.as_ref());
    }

    fn on_binding_changed(&mut self) {
        let binding = self.binding_rx.borrow_and_update().binding.clone();
        match binding {
            Some(binding) if self.aggregator.key() != Some(binding.key) => {
                self.aggregator.trigger(binding);
            }
            Some(_) => {}
            None => self.aggregator.invalidate(),
        }
    }
}
