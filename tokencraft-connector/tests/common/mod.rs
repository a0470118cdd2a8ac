#![allow(dead_code)]

use anchor_lang::Discriminator;
use anchor_lang::idl::IdlAccount;
use async_trait::async_trait;
use flate2::{write::ZlibEncoder, Compression};
use serde_json::json;
use solana_sdk::{
    commitment_config::CommitmentLevel,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{Transaction, TransactionError},
};
use std::{
    collections::{HashMap, HashSet},
    io::Write,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokencraft_connector::{
    binding::BindingState,
    config::ConnectorConfig,
    connection::ConnectionHandle,
    error::{AdapterError, RpcError},
    idl::idl_address,
    rpc::{LedgerRpc, SignatureStatus},
    token::{MetadataRecord, MintInfo, SupplyInfo, TokenAccountRecord},
    wallet::{WalletAdapter, WalletCapabilities},
    Session, SessionHandle,
};
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};

/// A record of every call made against the mock ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AccountData(Pubkey),
    TokenAccounts {
        owner: Pubkey,
        program: Pubkey,
        binding_published: bool,
    },
    MintInfo(Pubkey),
    Supply(Pubkey),
    Metadata(Pubkey),
    LatestBlockhash,
    Send,
    SignatureStatus,
}

#[derive(Default)]
pub struct LedgerState {
    pub raw_accounts: HashMap<Pubkey, Vec<u8>>,
    pub token_accounts: Vec<TokenAccountRecord>,
    pub mints: HashMap<Pubkey, MintInfo>,
    pub supplies: HashMap<Pubkey, SupplyInfo>,
    pub metadata: HashMap<Pubkey, MetadataRecord>,
    pub failing_metadata: HashSet<Pubkey>,
    /// Mint info fetches for these mints wait on the ledger's gate.
    pub held_mints: HashSet<Pubkey>,
    /// The next this many account data reads wait on the ledger's gate.
    pub held_account_reads: usize,
    pub fail_token_accounts: bool,
    pub send_error: Option<String>,
    pub never_confirm: bool,
    pub execution_error: Option<TransactionError>,
    pub blockhash: Hash,
    pub calls: Vec<Call>,
}

/// An in-memory ledger implementing `LedgerRpc`.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    gate: Notify,
    binding_observer: Mutex<Option<watch::Receiver<BindingState>>>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        let ledger = Self::default();
        ledger.update(|s| s.blockhash = Hash::new_unique());
        Arc::new(ledger)
    }

    pub fn update(&self, f: impl FnOnce(&mut LedgerState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| f(c)).count()
    }

    /// Lets the ledger observe the binding channel at the moment token accounts are fetched.
    pub fn observe_bindings(&self, rx: watch::Receiver<BindingState>) {
        *self.binding_observer.lock().unwrap() = Some(rx);
    }

    /// Wakes every fetch currently waiting on the gate.
    pub fn release_held(&self) {
        self.update(|s| {
            s.held_mints.clear();
            s.held_account_reads = 0;
        });
        self.gate.notify_waiters();
    }

    pub fn install_idl(&self, program_id: &Pubkey) {
        self.install_idl_document(program_id, &sample_idl(program_id));
    }

    pub fn install_idl_document(&self, program_id: &Pubkey, idl: &serde_json::Value) {
        let data = idl_account_data(idl);
        self.update(|s| {
            s.raw_accounts.insert(idl_address(program_id), data);
        });
    }

    /// Creates a mint with supply and, optionally, metadata.
    pub fn add_mint(&self, decimals: u8, supply: u64, with_metadata: bool) -> Pubkey {
        let mint = Pubkey::new_unique();
        self.update(|s| {
            s.mints.insert(
                mint,
                MintInfo {
                    mint,
                    decimals,
                    supply,
                    mint_authority: Some(Pubkey::new_unique()),
                    freeze_authority: None,
                    is_initialized: true,
                },
            );
            s.supplies.insert(
                mint,
                SupplyInfo {
                    mint,
                    amount: supply,
                    decimals,
                    ui_amount_string: tokencraft_connector::token::format_amount(supply, decimals),
                },
            );
            if with_metadata {
                s.metadata.insert(
                    mint,
                    MetadataRecord {
                        mint,
                        update_authority: Pubkey::new_unique(),
                        name: format!("Token {}", &mint.to_string()[..4]),
                        symbol: "TKN".to_string(),
                        uri: "https://example.invalid/token.json".to_string(),
                        seller_fee_basis_points: 0,
                    },
                );
            }
        });
        mint
    }

    pub fn add_token_account(&self, owner: Pubkey, mint: Pubkey, amount: u64, program: Pubkey) -> Pubkey {
        let address = Pubkey::new_unique();
        self.update(|s| {
            s.token_accounts.push(TokenAccountRecord {
                address,
                mint,
                owner,
                amount,
                token_program: program,
                delegate: None,
                is_frozen: false,
            })
        });
        address
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn get_account_data(
        &self,
        address: &Pubkey,
        _commitment: CommitmentLevel,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        let released = self.gate.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        let (held, data) = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::AccountData(*address));
            let held = s.held_account_reads > 0;
            if held {
                s.held_account_reads -= 1;
            }
            (held, s.raw_accounts.get(address).cloned())
        };
        if held {
            released.await;
        }
        Ok(data)
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
        _commitment: CommitmentLevel,
    ) -> Result<Vec<TokenAccountRecord>, RpcError> {
        let binding_published = self
            .binding_observer
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| rx.borrow().binding.as_ref().map(|b| b.key.wallet) == Some(*owner))
            .unwrap_or(false);

        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::TokenAccounts {
            owner: *owner,
            program: *token_program,
            binding_published,
        });
        if s.fail_token_accounts {
            return Err(RpcError::Unavailable("connection refused".to_string()));
        }
        Ok(s.token_accounts
            .iter()
            .filter(|a| a.owner == *owner && a.token_program == *token_program)
            .cloned()
            .collect())
    }

    async fn get_mint_info(
        &self,
        mint: &Pubkey,
        _commitment: CommitmentLevel,
    ) -> Result<MintInfo, RpcError> {
        let released = self.gate.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        let held = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::MintInfo(*mint));
            s.held_mints.contains(mint)
        };
        if held {
            released.await;
        }
        let s = self.state.lock().unwrap();
        s.mints.get(mint).cloned().ok_or(RpcError::AccountNotFound(*mint))
    }

    async fn get_token_supply(
        &self,
        mint: &Pubkey,
        _commitment: CommitmentLevel,
    ) -> Result<SupplyInfo, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Supply(*mint));
        s.supplies.get(mint).cloned().ok_or(RpcError::AccountNotFound(*mint))
    }

    async fn get_token_metadata(
        &self,
        mint: &Pubkey,
        _commitment: CommitmentLevel,
    ) -> Result<Option<MetadataRecord>, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Metadata(*mint));
        if s.failing_metadata.contains(mint) {
            return Err(RpcError::Unavailable("metadata read failed".to_string()));
        }
        Ok(s.metadata.get(mint).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::LatestBlockhash);
        Ok(s.blockhash)
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        _skip_preflight: bool,
        _preflight_commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Send);
        if let Some(reason) = &s.send_error {
            return Err(RpcError::Unavailable(reason.clone()));
        }
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn get_signature_status(
        &self,
        _signature: &Signature,
        _commitment: CommitmentLevel,
    ) -> Result<SignatureStatus, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::SignatureStatus);
        Ok(match (&s.execution_error, s.never_confirm) {
            (Some(e), _) => SignatureStatus::Failed(e.clone()),
            (None, true) => SignatureStatus::Pending,
            (None, false) => SignatureStatus::Confirmed,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalletBehaviour {
    pub reject_connect: bool,
    pub connect_delay: Option<Duration>,
    pub disconnect_delay: Option<Duration>,
    pub reject_sign: bool,
    pub fail_disconnect: bool,
    pub single_signing_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCall {
    Connect,
    Disconnect,
    Sign,
    SignAll(usize),
}

/// A wallet adapter backed by an in-memory keypair.
pub struct MockWallet {
    name: String,
    keypair: Keypair,
    behaviour: Mutex<WalletBehaviour>,
    log: Mutex<Vec<WalletCall>>,
}

impl MockWallet {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_behaviour(name, WalletBehaviour::default())
    }

    pub fn with_behaviour(name: &str, behaviour: WalletBehaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            keypair: Keypair::new(),
            behaviour: Mutex::new(behaviour),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn set_behaviour(&self, f: impl FnOnce(&mut WalletBehaviour)) {
        f(&mut self.behaviour.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.log.lock().unwrap().clone()
    }

    fn behaviour(&self) -> WalletBehaviour {
        self.behaviour.lock().unwrap().clone()
    }

    fn sign(&self, mut transaction: Transaction) -> Result<Transaction, AdapterError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| AdapterError::Other(e.to_string()))?;
        Ok(transaction)
    }
}

#[async_trait]
impl WalletAdapter for MockWallet {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> WalletCapabilities {
        WalletCapabilities {
            sign_all_transactions: !self.behaviour().single_signing_only,
            ..WalletCapabilities::full()
        }
    }

    async fn connect(&self) -> Result<Pubkey, AdapterError> {
        self.log.lock().unwrap().push(WalletCall::Connect);
        let behaviour = self.behaviour();
        if let Some(delay) = behaviour.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if behaviour.reject_connect {
            return Err(AdapterError::UserRejected);
        }
        Ok(self.keypair.pubkey())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.log.lock().unwrap().push(WalletCall::Disconnect);
        let behaviour = self.behaviour();
        if let Some(delay) = behaviour.disconnect_delay {
            tokio::time::sleep(delay).await;
        }
        if behaviour.fail_disconnect {
            return Err(AdapterError::Other("extension crashed".to_string()));
        }
        Ok(())
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, AdapterError> {
        self.log.lock().unwrap().push(WalletCall::Sign);
        if self.behaviour().reject_sign {
            return Err(AdapterError::UserRejected);
        }
        self.sign(transaction)
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, AdapterError> {
        self.log
            .lock()
            .unwrap()
            .push(WalletCall::SignAll(transactions.len()));
        if self.behaviour().reject_sign {
            return Err(AdapterError::UserRejected);
        }
        transactions.into_iter().map(|tx| self.sign(tx)).collect()
    }
}

/// A configuration with timeouts short enough for tests.
pub fn test_config() -> ConnectorConfig {
    let mut config = ConnectorConfig::default();
    config.wallet.connect_timeout_ms = 200;
    config.submitter.confirmation_timeout_ms = 150;
    config.submitter.poll_interval_ms = 10;
    config
}

pub fn program_id(config: &ConnectorConfig) -> Pubkey {
    config.program.parse_program_id().unwrap()
}

pub fn connection(ledger: &Arc<MockLedger>) -> ConnectionHandle {
    ConnectionHandle::new(ledger.clone(), "mock://ledger", CommitmentLevel::Confirmed)
}

pub fn sample_idl(program_id: &Pubkey) -> serde_json::Value {
    json!({
        "address": program_id.to_string(),
        "metadata": { "name": "tokencraft", "version": "0.1.0", "spec": "0.1.0" },
        "instructions": [
            { "name": "create_token", "accounts": [], "args": [] },
            { "name": "mint_tokens", "accounts": [], "args": [] }
        ],
        "accounts": [{ "name": "TokenConfig" }],
        "errors": [{ "code": 6000, "name": "Unauthorized" }]
    })
}

/// A legacy-layout IDL declaring the TokenCraft instructions in camelCase.
pub fn token_craft_idl() -> serde_json::Value {
    let instructions: Vec<_> = [
        "initialize",
        "transfer",
        "burn",
        "freeze",
        "thaw",
        "approve",
        "revoke",
        "closeAccount",
        "setAuthority",
    ]
    .iter()
    .map(|name| json!({ "name": name, "accounts": [], "args": [] }))
    .collect();
    json!({
        "version": "0.1.0",
        "name": "token_craft",
        "instructions": instructions,
        "errors": [{ "code": 6000, "name": "InsufficientFunds", "msg": "Insufficient funds" }]
    })
}

/// Builds the raw data of an Anchor IDL account holding `idl`.
pub fn idl_account_data(idl: &serde_json::Value) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(idl.to_string().as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut data = IdlAccount::DISCRIMINATOR.to_vec();
    data.extend_from_slice(Pubkey::new_unique().as_ref());
    data.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    data.extend_from_slice(&compressed);
    data
}

/// A one-instruction transaction paid by `payer`, without a blockhash.
pub fn unsigned_transaction(payer: &Pubkey) -> Transaction {
    let instruction = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        b"craft",
        vec![AccountMeta::new(*payer, true)],
    );
    Transaction::new_with_payer(&[instruction], Some(payer))
}

pub struct Harness {
    pub ledger: Arc<MockLedger>,
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(ledger: Arc<MockLedger>, config: ConnectorConfig, wallet: Arc<MockWallet>) -> Self {
        let (session, handle) =
            Session::new(Arc::new(config), connection(&ledger), wallet).unwrap();
        ledger.observe_bindings(handle.subscribe_binding());
        let task = tokio::spawn(session.run());
        Self {
            ledger,
            handle,
            task,
        }
    }

    pub async fn stop(self) {
        self.handle.stop().await;
        self.task.await.unwrap();
    }
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
