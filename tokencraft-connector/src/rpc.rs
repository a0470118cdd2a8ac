//! Defines the network seam every component reads the ledger through.
//!
//! Components never talk to `RpcClient` directly; they hold an `Arc<dyn LedgerRpc>` inside
//! the [`ConnectionHandle`](crate::connection::ConnectionHandle), so tests can substitute an
//! in-memory ledger.

use crate::{
    error::RpcError,
    token::{self, MintInfo, SupplyInfo, MetadataRecord, TokenAccountRecord, TOKEN_ACCOUNT_LEN},
};
use async_trait::async_trait;
use solana_account_decoder_client_types::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};

/// The outcome of a signature status lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The network does not yet report the signature at the requested commitment.
    Pending,
    /// The transaction reached the requested commitment and executed successfully.
    Confirmed,
    /// The transaction reached the requested commitment but failed during execution.
    Failed(TransactionError),
}

/// A trait abstracting over the asynchronous RPC functionality the connector needs.
///
/// This allows every component to be generic over the RPC client, making it easy to use with
/// both the live `RpcClient` and an in-memory ledger in tests.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Returns the raw data of an account, or `None` if it does not exist.
    async fn get_account_data(
        &self,
        address: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Option<Vec<u8>>, RpcError>;

    /// Returns every token account owned by `owner` under `token_program`.
    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Vec<TokenAccountRecord>, RpcError>;

    /// Reads and decodes a mint account.
    async fn get_mint_info(
        &self,
        mint: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<MintInfo, RpcError>;

    /// Returns the current supply of a mint.
    async fn get_token_supply(
        &self,
        mint: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<SupplyInfo, RpcError>;

    /// Reads the Metaplex metadata of a mint, or `None` if the mint has none.
    async fn get_token_metadata(
        &self,
        mint: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Option<MetadataRecord>, RpcError>;

    /// Fetches the latest blockhash from the RPC endpoint.
    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError>;

    /// Sends a signed transaction without waiting for confirmation.
    async fn send_transaction(
        &self,
        transaction: &Transaction,
        skip_preflight: bool,
        preflight_commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError>;

    /// Looks up the status of a signature at the given commitment.
    async fn get_signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
    ) -> Result<SignatureStatus, RpcError>;
}

#[async_trait]
impl LedgerRpc for RpcClient {
    async fn get_account_data(
        &self,
        address: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        let response = self
            .get_account_with_commitment(address, CommitmentConfig { commitment })
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Vec<TokenAccountRecord>, RpcError> {
        // Owner sits at offset 32 in both token programs' account layout.
        let mut filters = vec![RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            32,
            owner.as_ref(),
        ))];
        if *token_program == spl_token::id() {
            filters.push(RpcFilterType::DataSize(TOKEN_ACCOUNT_LEN as u64));
        }

        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig { commitment }),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };

        let accounts = self
            .get_program_accounts_with_config(token_program, config)
            .await?;

        accounts
            .into_iter()
            .filter(|(_, account)| token::is_account_layout(&account.data))
            .map(|(address, account)| {
                token::decode_token_account(address, *token_program, &account.data)
            })
            .collect()
    }

    async fn get_mint_info(
        &self,
        mint: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<MintInfo, RpcError> {
        let data = LedgerRpc::get_account_data(self, mint, commitment)
            .await?
            .ok_or(RpcError::AccountNotFound(*mint))?;
        token::decode_mint(*mint, &data)
    }

    async fn get_token_supply(
        &self,
        mint: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<SupplyInfo, RpcError> {
        let supply = self
            .get_token_supply_with_commitment(mint, CommitmentConfig { commitment })
            .await?
            .value;
        let amount = supply.amount.parse::<u64>().map_err(|e| RpcError::Decode {
            address: *mint,
            reason: format!("invalid supply amount '{}': {}", supply.amount, e),
        })?;

        Ok(SupplyInfo {
            mint: *mint,
            amount,
            decimals: supply.decimals,
            ui_amount_string: supply.ui_amount_string,
        })
    }

    async fn get_token_metadata(
        &self,
        mint: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Option<MetadataRecord>, RpcError> {
        let address = token::metadata_address(mint);
        match LedgerRpc::get_account_data(self, &address, commitment).await? {
            Some(data) => token::decode_metadata(address, &data).map(Some),
            None => Ok(None),
        }
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        Ok(RpcClient::get_latest_blockhash(self).await?)
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        skip_preflight: bool,
        preflight_commitment: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig {
            skip_preflight,
            preflight_commitment: Some(preflight_commitment),
            ..RpcSendTransactionConfig::default()
        };
        Ok(self.send_transaction_with_config(transaction, config).await?)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
    ) -> Result<SignatureStatus, RpcError> {
        let status = self
            .get_signature_status_with_commitment(signature, CommitmentConfig { commitment })
            .await?;
        Ok(match status {
            None => SignatureStatus::Pending,
            Some(Ok(())) => SignatureStatus::Confirmed,
            Some(Err(e)) => SignatureStatus::Failed(e),
        })
    }
}
