//! # Program Binding
//!
//! A [`ProgramBinding`] pairs a provider (connection + wallet key + commitment options) with
//! the decoded interface of the configured program. The [`ProgramBindingResolver`] keeps at
//! most one binding live: every wallet transition aborts the in-flight derivation, clears the
//! published binding and, if a wallet is connected, starts a new derivation.

use crate::{
    connection::ConnectionHandle,
    error::ConnectorError,
    idl::{self, ProgramInterface},
    wallet::{WalletIdentity, WalletState},
};
use solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// The input identity a binding was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingKey {
    pub wallet: Pubkey,
    pub generation: u64,
}

impl From<&WalletIdentity> for BindingKey {
    fn from(identity: &WalletIdentity) -> Self {
        Self {
            wallet: identity.pubkey,
            generation: identity.generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    pub commitment: CommitmentLevel,
    pub preflight_commitment: CommitmentLevel,
}

/// The connection and wallet a program is invoked through.
#[derive(Debug, Clone)]
pub struct Provider {
    pub connection: ConnectionHandle,
    pub wallet: Pubkey,
    pub options: ProviderOptions,
}

#[derive(Debug, Clone)]
pub struct ProgramBinding {
    pub key: BindingKey,
    pub provider: Provider,
    pub program: ProgramInterface,
    pub program_id: Pubkey,
}

/// The value published by the resolver.
///
/// `binding` is `None` while a derivation is pending, after a failure, and while no wallet
/// is connected.
#[derive(Debug, Clone, Default)]
pub struct BindingState {
    pub key: Option<BindingKey>,
    pub binding: Option<Arc<ProgramBinding>>,
    pub last_error: Option<ConnectorError>,
}

impl BindingState {
    pub fn is_pending(&self) -> bool {
        self.key.is_some() && self.binding.is_none() && self.last_error.is_none()
    }
}

type InterfaceCache = Arc<Mutex<HashMap<Pubkey, ProgramInterface>>>;

/// Builds a binding for `identity` by fetching the program's IDL over `connection`.
pub async fn derive_binding(
    identity: &WalletIdentity,
    connection: &ConnectionHandle,
    program_id: &Pubkey,
) -> Result<ProgramBinding, ConnectorError> {
    let program = idl::fetch_program_interface(
        connection.rpc().as_ref(),
        program_id,
        connection.commitment(),
    )
    .await
    .map_err(|e| ConnectorError::BindingUnavailable(e.to_string()))?;

    Ok(bind(identity, connection, program_id, program))
}

fn bind(
    identity: &WalletIdentity,
    connection: &ConnectionHandle,
    program_id: &Pubkey,
    program: ProgramInterface,
) -> ProgramBinding {
    ProgramBinding {
        key: BindingKey::from(identity),
        provider: Provider {
            connection: connection.clone(),
            wallet: identity.pubkey,
            options: ProviderOptions {
                commitment: connection.commitment(),
                preflight_commitment: connection.commitment(),
            },
        },
        program,
        program_id: *program_id,
    }
}

/// Keeps the published binding in step with the wallet.
pub struct ProgramBindingResolver {
    connection: ConnectionHandle,
    program_id: Pubkey,
    wallet: watch::Receiver<WalletState>,
    state: Arc<watch::Sender<BindingState>>,
    cache: Option<InterfaceCache>,
    in_flight: Option<JoinHandle<()>>,
}

impl ProgramBindingResolver {
    pub fn new(
        connection: ConnectionHandle,
        program_id: Pubkey,
        wallet: watch::Receiver<WalletState>,
        cache_idl: bool,
    ) -> Self {
        let (state, _) = watch::channel(BindingState::default());
        Self {
            connection,
            program_id,
            wallet,
            state: Arc::new(state),
            cache: cache_idl.then(InterfaceCache::default),
            in_flight: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BindingState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BindingState {
        self.state.borrow().clone()
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Reacts to a new wallet input.
    ///
    /// Observing the identity the current binding was derived from is a no-op.
    pub fn update(&mut self, identity: Option<&WalletIdentity>) {
        let key = identity.map(BindingKey::from);
        if key.is_some() && self.state.borrow().key == key {
            return;
        }

        self.cancel();
        self.state.send_if_modified(|state| {
            let changed = state.key != key || state.binding.is_some() || state.last_error.is_some();
            *state = BindingState {
                key,
                ..BindingState::default()
            };
            changed
        });

        let (Some(identity), Some(key)) = (identity.cloned(), key) else {
            debug!("No wallet connected, binding cleared");
            return;
        };

        let connection = self.connection.clone();
        let program_id = self.program_id;
        let wallet = self.wallet.clone();
        let state = self.state.clone();
        let cache = self.cache.clone();

        self.in_flight = Some(tokio::spawn(async move {
            let result = resolve(&identity, &connection, &program_id, cache.as_ref()).await;

            let published = state.send_if_modified(|current| {
                if current.key != Some(key) || wallet.borrow().generation != key.generation {
                    return false;
                }
                match &result {
                    Ok(binding) => current.binding = Some(Arc::new(binding.clone())),
                    Err(e) => current.last_error = Some(e.clone()),
                }
                true
            });

            match (&result, published) {
                (_, false) => debug!(generation = key.generation, "Discarded stale binding"),
                (Ok(binding), true) => info!(
                    program = %binding.program_id,
                    interface = %binding.program.name,
                    wallet = %key.wallet,
                    "Program binding published"
                ),
                (Err(e), true) => warn!(error = %e, "Program binding unavailable"),
            }
        }));
    }

    /// Aborts the in-flight derivation, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl Drop for ProgramBindingResolver {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn resolve(
    identity: &WalletIdentity,
    connection: &ConnectionHandle,
    program_id: &Pubkey,
    cache: Option<&InterfaceCache>,
) -> Result<ProgramBinding, ConnectorError> {
    if let Some(cache) = cache {
        if let Some(program) = cache.lock().await.get(program_id).cloned() {
            debug!(program = %program_id, "Using cached program interface");
            return Ok(bind(identity, connection, program_id, program));
        }
    }

    let binding = derive_binding(identity, connection, program_id).await?;
    if let Some(cache) = cache {
        cache
            .lock()
            .await
            .insert(*program_id, binding.program.clone());
    }
    Ok(binding)
}
