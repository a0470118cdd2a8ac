//! # Token Data Aggregation
//!
//! One aggregation cycle fetches every token account owned by the bound wallet, fans out one
//! task per distinct mint to collect the mint's facts, waits for all of them and expands the
//! per-mint results back to per-account positions. The resulting [`AggregateSnapshot`] is
//! published as a whole or not at all.

use crate::{
    binding::{BindingKey, BindingState, ProgramBinding},
    config::AggregatorConfig,
    error::ConnectorError,
    rpc::LedgerRpc,
    token::{MetadataRecord, MintInfo, SupplyInfo, TokenAccountRecord, TOKEN_2022_PROGRAM_ID},
    wallet::WalletState,
};
use futures::future::try_join_all;
use solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::{
    sync::{watch, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

/// A consistent view of the wallet's token holdings.
///
/// The four sequences are index-aligned: element `i` of `mints`, `supplies` and `metadatas`
/// describes the mint of `accounts[i]`. A fact that could not be fetched is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSnapshot {
    pub owner: Pubkey,
    pub accounts: Vec<TokenAccountRecord>,
    pub mints: Vec<Option<MintInfo>>,
    pub supplies: Vec<Option<SupplyInfo>>,
    pub metadatas: Vec<Option<MetadataRecord>>,
}

impl AggregateSnapshot {
    pub fn empty(owner: Pubkey) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Returns `true` if all four sequences have the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.accounts.len();
        self.mints.len() == n && self.supplies.len() == n && self.metadatas.len() == n
    }
}

/// The facts gathered for one mint.
#[derive(Debug, Clone, Default)]
struct MintFacts {
    mint: Option<MintInfo>,
    supply: Option<SupplyInfo>,
    metadata: Option<MetadataRecord>,
}

/// Returns the distinct mints of `accounts` in first-seen order.
pub fn distinct_mints(accounts: &[TokenAccountRecord]) -> Vec<Pubkey> {
    let mut seen = HashSet::new();
    accounts
        .iter()
        .map(|account| account.mint)
        .filter(|mint| seen.insert(*mint))
        .collect()
}

/// Runs one aggregation cycle for `owner`.
///
/// Only the account listing can fail the cycle; per-mint failures are absorbed as `None`.
pub async fn aggregate(
    rpc: Arc<dyn LedgerRpc>,
    owner: Pubkey,
    commitment: CommitmentLevel,
    config: &AggregatorConfig,
) -> Result<AggregateSnapshot, ConnectorError> {
    let mut programs = vec![spl_token::id()];
    if config.include_token_2022 {
        programs.push(TOKEN_2022_PROGRAM_ID);
    }

    let accounts: Vec<TokenAccountRecord> = try_join_all(
        programs
            .iter()
            .map(|program| rpc.get_token_accounts_by_owner(&owner, program, commitment)),
    )
    .await
    .map_err(|e| ConnectorError::AggregationFailed(e.to_string()))?
    .into_iter()
    .flatten()
    .collect();

    if accounts.is_empty() {
        return Ok(AggregateSnapshot::empty(owner));
    }

    let mints = distinct_mints(&accounts);
    debug!(accounts = accounts.len(), mints = mints.len(), "Fetching mint facts");

    let permits = Arc::new(Semaphore::new(config.max_concurrent_mints.max(1)));
    let mut tasks = JoinSet::new();
    for (index, mint) in mints.iter().copied().enumerate() {
        let rpc = rpc.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (index, fetch_mint_facts(rpc.as_ref(), mint, commitment).await)
        });
    }

    let mut facts = vec![MintFacts::default(); mints.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, mint_facts)) => facts[index] = mint_facts,
            Err(e) => debug!(error = %e, "Mint task did not complete"),
        }
    }

    let positions: HashMap<Pubkey, usize> =
        mints.iter().enumerate().map(|(i, mint)| (*mint, i)).collect();

    let mut snapshot = AggregateSnapshot {
        owner,
        ..AggregateSnapshot::default()
    };
    for account in accounts {
        let mint_facts = positions
            .get(&account.mint)
            .map(|i| facts[*i].clone())
            .unwrap_or_default();
        snapshot.accounts.push(account);
        snapshot.mints.push(mint_facts.mint);
        snapshot.supplies.push(mint_facts.supply);
        snapshot.metadatas.push(mint_facts.metadata);
    }

    Ok(snapshot)
}

/// Fetches mint info and, if that succeeds, supply and metadata concurrently.
async fn fetch_mint_facts(rpc: &dyn LedgerRpc, mint: Pubkey, commitment: CommitmentLevel) -> MintFacts {
    let info = match rpc.get_mint_info(&mint, commitment).await {
        Ok(info) => info,
        Err(e) => {
            debug!(%mint, error = %e, "Mint info unavailable");
            return MintFacts::default();
        }
    };

    let (supply, metadata) = tokio::join!(
        rpc.get_token_supply(&mint, commitment),
        rpc.get_token_metadata(&mint, commitment)
    );

    MintFacts {
        mint: Some(info),
        supply: supply
            .map_err(|e| debug!(%mint, error = %e, "Supply unavailable"))
            .ok(),
        metadata: metadata
            .map_err(|e| debug!(%mint, error = %e, "Metadata unavailable"))
            .ok()
            .flatten(),
    }
}

/// The value published by the aggregator.
#[derive(Debug, Clone, Default)]
pub struct SnapshotState {
    /// The input the current or most recent cycle was triggered by.
    pub key: Option<BindingKey>,
    /// The last published snapshot. Kept when a later cycle fails.
    pub snapshot: Option<Arc<AggregateSnapshot>>,
    pub last_error: Option<ConnectorError>,
    pub in_progress: bool,
    /// Incremented on every published snapshot.
    pub revision: u64,
}

/// Owns the aggregation cycle and the published [`SnapshotState`].
pub struct TokenDataAggregator {
    config: AggregatorConfig,
    wallet: watch::Receiver<WalletState>,
    binding: watch::Receiver<BindingState>,
    state: Arc<watch::Sender<SnapshotState>>,
    last_binding: Option<Arc<ProgramBinding>>,
    in_flight: Option<JoinHandle<()>>,
}

impl TokenDataAggregator {
    pub fn new(
        config: AggregatorConfig,
        wallet: watch::Receiver<WalletState>,
        binding: watch::Receiver<BindingState>,
    ) -> Self {
        let (state, _) = watch::channel(SnapshotState::default());
        Self {
            config,
            wallet,
            binding,
            state: Arc::new(state),
            last_binding: None,
            in_flight: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SnapshotState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SnapshotState {
        self.state.borrow().clone()
    }

    /// The input of the running or most recent cycle.
    pub fn key(&self) -> Option<BindingKey> {
        self.state.borrow().key
    }

    /// Starts a cycle for a freshly published binding, aborting any older cycle.
    pub fn trigger(&mut self, binding: Arc<ProgramBinding>) {
        self.cancel();

        let key = binding.key;
        self.state.send_modify(|state| {
            state.key = Some(key);
            state.in_progress = true;
            state.last_error = None;
        });
        self.last_binding = Some(binding.clone());

        let config = self.config.clone();
        let wallet = self.wallet.clone();
        let bindings = self.binding.clone();
        let state = self.state.clone();

        self.in_flight = Some(tokio::spawn(async move {
            let provider = &binding.provider;
            let result = aggregate(
                provider.connection.rpc().clone(),
                provider.wallet,
                provider.options.commitment,
                &config,
            )
            .await;

            let published = state.send_if_modified(|current| {
                let current_binding = bindings.borrow().binding.as_ref().map(|b| b.key);
                if current.key != Some(key)
                    || wallet.borrow().generation != key.generation
                    || current_binding != Some(key)
                {
                    return false;
                }
                current.in_progress = false;
                match &result {
                    Ok(snapshot) => {
                        current.snapshot = Some(Arc::new(snapshot.clone()));
                        current.last_error = None;
                        current.revision += 1;
                    }
                    Err(e) => current.last_error = Some(e.clone()),
                }
                true
            });

            match (&result, published) {
                (_, false) => debug!(wallet = %key.wallet, "Discarded stale snapshot"),
                (Ok(snapshot), true) => info!(
                    wallet = %key.wallet,
                    accounts = snapshot.len(),
                    "Token snapshot published"
                ),
                (Err(e), true) => warn!(error = %e, "Token data aggregation failed"),
            }
        }));
    }

    /// Re-runs the cycle for the last binding. Returns `false` if there is none.
    pub fn refresh(&mut self) -> bool {
        match self.last_binding.clone() {
            Some(binding) => {
                self.trigger(binding);
                true
            }
            None => false,
        }
    }

    /// Aborts the running cycle and forgets its input and error. The last snapshot is kept.
    pub fn invalidate(&mut self) {
        self.cancel();
        self.last_binding = None;
        self.state.send_if_modified(|state| {
            let changed = state.key.is_some() || state.in_progress || state.last_error.is_some();
            state.key = None;
            state.in_progress = false;
            state.last_error = None;
            changed
        });
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl Drop for TokenDataAggregator {
    fn drop(&mut self) {
        self.cancel();
    }
}
