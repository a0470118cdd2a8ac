//! Serializable views of connector state printed by the CLI, and the decoding of
//! transactions passed on the command line.

use crate::error::CliError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use solana_sdk::{commitment_config::CommitmentLevel, transaction::Transaction};
use tokencraft_connector::{
    aggregator::AggregateSnapshot,
    binding::ProgramBinding,
    submitter::TransactionReceipt,
    token::format_amount,
};

/// One row of a snapshot: a token account together with the facts of its mint.
#[derive(Debug, Serialize, PartialEq)]
pub struct TokenRow {
    pub account: String,
    pub mint: String,
    pub token_program: String,
    pub amount: u64,
    /// `amount` scaled by the mint's decimals. Absent when the mint could not be read.
    pub ui_amount: Option<String>,
    pub decimals: Option<u8>,
    pub supply: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub uri: Option<String>,
    pub frozen: bool,
}

#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub owner: String,
    pub observed_at: String,
    pub tokens: Vec<TokenRow>,
}

impl From<&AggregateSnapshot> for SnapshotView {
    fn from(snapshot: &AggregateSnapshot) -> Self {
        let tokens = snapshot
            .accounts
            .iter()
            .enumerate()
            .map(|(i, account)| {
                let mint = snapshot.mints.get(i).and_then(Option::as_ref);
                let supply = snapshot.supplies.get(i).and_then(Option::as_ref);
                let metadata = snapshot.metadatas.get(i).and_then(Option::as_ref);
                TokenRow {
                    account: account.address.to_string(),
                    mint: account.mint.to_string(),
                    token_program: account.token_program.to_string(),
                    amount: account.amount,
                    ui_amount: mint.map(|m| format_amount(account.amount, m.decimals)),
                    decimals: mint.map(|m| m.decimals),
                    supply: supply.map(|s| s.ui_amount_string.clone()),
                    name: metadata.map(|m| m.name.clone()),
                    symbol: metadata.map(|m| m.symbol.clone()),
                    uri: metadata.map(|m| m.uri.clone()),
                    frozen: account.is_frozen,
                }
            })
            .collect();

        Self {
            owner: snapshot.owner.to_string(),
            observed_at: chrono::Utc::now().to_rfc3339(),
            tokens,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ReceiptView {
    pub signature: String,
    pub confirmation: String,
}

impl From<&TransactionReceipt> for ReceiptView {
    fn from(receipt: &TransactionReceipt) -> Self {
        let confirmation = match receipt.confirmation {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        };
        Self {
            signature: receipt.signature.to_string(),
            confirmation: confirmation.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InterfaceView {
    pub program_id: String,
    pub wallet: String,
    pub name: String,
    pub version: String,
    pub instructions: Vec<String>,
    pub accounts: Vec<String>,
    pub events: Vec<String>,
    pub errors: Vec<String>,
}

impl From<&ProgramBinding> for InterfaceView {
    fn from(binding: &ProgramBinding) -> Self {
        let program = &binding.program;
        Self {
            program_id: binding.program_id.to_string(),
            wallet: binding.provider.wallet.to_string(),
            name: program.name.clone(),
            version: program.version.clone(),
            instructions: program.instructions.clone(),
            accounts: program.accounts.clone(),
            events: program.events.clone(),
            errors: program.errors.clone(),
        }
    }
}

/// Decodes a base64 string holding a transaction in the standard wire encoding.
pub fn decode_transaction(encoded: &str) -> Result<Transaction, CliError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    let (transaction, read): (Transaction, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
    if read != bytes.len() {
        return Err(CliError::InvalidArgument(format!(
            "{} trailing bytes after the transaction",
            bytes.len() - read
        )));
    }
    Ok(transaction)
}

/// Pretty-prints `value` as JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}
