//! # Transaction Submission
//!
//! Signs caller-supplied transactions through the connected wallet, sends them and waits a
//! bounded time for confirmation at the connection's commitment level. Nothing is retried;
//! the caller decides whether a failed submission is worth another attempt.

use crate::{
    config::SubmitterConfig,
    connection::ConnectionHandle,
    error::{AdapterError, ConnectorError},
    rpc::SignatureStatus,
    wallet::{WalletAdapter, WalletConnectionManager},
};
use solana_sdk::{
    commitment_config::CommitmentLevel, hash::Hash, signature::Signature,
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The outcome of a confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub signature: Signature,
    /// The commitment level the transaction was confirmed at.
    pub confirmation: CommitmentLevel,
}

pub struct TransactionSubmitter {
    connection: ConnectionHandle,
    wallet: Arc<WalletConnectionManager>,
    config: SubmitterConfig,
}

impl TransactionSubmitter {
    pub fn new(
        connection: ConnectionHandle,
        wallet: Arc<WalletConnectionManager>,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            connection,
            wallet,
            config,
        }
    }

    /// Signs, sends and confirms one transaction.
    ///
    /// Fails with `NotConnected` before touching the network if no wallet is connected. A
    /// transaction without a recent blockhash gets the latest one filled in before signing.
    pub async fn submit(&self, transaction: Transaction) -> Result<TransactionReceipt, ConnectorError> {
        let (_, adapter) = self.wallet.connected()?;

        let mut blockhash = None;
        let transaction = self.prepare(transaction, &mut blockhash).await?;

        let signed = adapter
            .sign_transaction(transaction)
            .await
            .map_err(|e| ConnectorError::SigningRejected(e.to_string()))?;

        self.send_and_confirm(&signed).await
    }

    /// Signs a batch in one wallet approval, then sends and confirms each transaction in
    /// order. Stops at the first failure.
    pub async fn submit_all(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<TransactionReceipt>, ConnectorError> {
        let (identity, adapter) = self.wallet.connected()?;
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let mut blockhash = None;
        let mut prepared = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            prepared.push(self.prepare(transaction, &mut blockhash).await?);
        }

        let expected = prepared.len();
        let signed = if identity.capabilities.sign_all_transactions {
            adapter.sign_all_transactions(prepared).await
        } else {
            sign_each(adapter.as_ref(), prepared).await
        };
        let signed = signed.map_err(|e| ConnectorError::SigningRejected(e.to_string()))?;

        if signed.len() != expected {
            return Err(ConnectorError::SigningRejected(format!(
                "wallet returned {} of {} signed transactions",
                signed.len(),
                expected
            )));
        }

        let mut receipts = Vec::with_capacity(signed.len());
        for transaction in &signed {
            receipts.push(self.send_and_confirm(transaction).await?);
        }
        Ok(receipts)
    }

    async fn prepare(
        &self,
        mut transaction: Transaction,
        blockhash: &mut Option<Hash>,
    ) -> Result<Transaction, ConnectorError> {
        if transaction.message.account_keys.is_empty() {
            return Err(ConnectorError::SubmissionFailed(
                "transaction has no fee payer".to_string(),
            ));
        }
        if transaction.message.recent_blockhash != Hash::default() {
            return Ok(transaction);
        }

        let hash = match blockhash {
            Some(hash) => *hash,
            None => {
                let hash = self
                    .connection
                    .rpc()
                    .get_latest_blockhash()
                    .await
                    .map_err(|e| ConnectorError::SubmissionFailed(e.to_string()))?;
                *blockhash = Some(hash);
                hash
            }
        };
        transaction.message.recent_blockhash = hash;
        Ok(transaction)
    }

    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
    ) -> Result<TransactionReceipt, ConnectorError> {
        let commitment = self.connection.commitment();
        let signature = self
            .connection
            .rpc()
            .send_transaction(transaction, self.config.skip_preflight, commitment)
            .await
            .map_err(|e| ConnectorError::SubmissionFailed(e.to_string()))?;
        info!(%signature, "Transaction sent");

        self.await_confirmation(&signature, commitment).await?;
        info!(%signature, "Transaction confirmed");

        Ok(TransactionReceipt {
            signature,
            confirmation: commitment,
        })
    }

    /// Polls the signature status until it reaches `commitment` or the bounded wait elapses.
    async fn await_confirmation(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
    ) -> Result<(), ConnectorError> {
        let rpc = self.connection.rpc();
        let poll_interval = self.config.poll_interval();

        let poll = async {
            loop {
                match rpc.get_signature_status(signature, commitment).await {
                    Ok(SignatureStatus::Confirmed) => return Ok(()),
                    Ok(SignatureStatus::Failed(e)) => {
                        return Err(ConnectorError::SubmissionFailed(format!(
                            "transaction {} failed: {}",
                            signature, e
                        )))
                    }
                    Ok(SignatureStatus::Pending) => {}
                    Err(e) => debug!(%signature, error = %e, "Signature status lookup failed"),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        let timeout = self.config.confirmation_timeout();
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%signature, "Confirmation timed out");
                Err(ConnectorError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

async fn sign_each(
    adapter: &dyn WalletAdapter,
    transactions: Vec<Transaction>,
) -> Result<Vec<Transaction>, AdapterError> {
    let mut signed = Vec::with_capacity(transactions.len());
    for transaction in transactions {
        signed.push(adapter.sign_transaction(transaction).await?);
    }
    Ok(signed)
}
