use crate::error::CliError;
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
    signer::Signer,
    transaction::Transaction,
};
use std::path::Path;
use tokencraft_connector::{error::AdapterError, wallet::WalletAdapter};

/// A wallet adapter backed by a keypair held in process memory.
///
/// It authorizes every request immediately: connecting only reveals the public key, and
/// signing adds the keypair's signature to whatever signatures the transaction already has.
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Reads a Solana CLI keypair file (a JSON array of 64 bytes).
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let keypair = read_keypair_file(path).map_err(|e| CliError::Keypair {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(keypair))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
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
impl WalletAdapter for KeypairWallet {
    fn name(&self) -> &str {
        "keypair"
    }

    async fn connect(&self) -> Result<Pubkey, AdapterError> {
        Ok(self.keypair.pubkey())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, AdapterError> {
        self.sign(transaction)
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, AdapterError> {
        transactions.into_iter().map(|tx| self.sign(tx)).collect()
    }
}
