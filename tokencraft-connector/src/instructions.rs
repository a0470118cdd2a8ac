//! # TokenCraft Transaction Builder
//!
//! This module provides the [`TransactionBuilder`], which turns a live
//! [`ProgramBinding`] into unsigned transactions for the TokenCraft program.
//!
//! ## Use Case
//!
//! Applications hold a binding once the wallet is connected and the program interface is
//! fetched. The builder produces transactions paid by the bound wallet, with no recent
//! blockhash, in the shape [`TransactionSubmitter::submit`] expects: the submitter fills
//! in the blockhash and asks the wallet to sign.
//!
//! ## Features
//!
//! - **Interface checked**: An instruction the bound IDL does not declare is refused
//!   before anything is encoded.
//! - **Anchor encoding**: Instruction data is the 8-byte selector followed by the
//!   borsh-encoded arguments. The selector is the one the IDL declares, or
//!   `sha256("global:<name>")[..8]` for IDLs that predate declared selectors.
//! - **Comprehensive Coverage**: Provides a `prepare_` method for every instruction.
//!
//! [`TransactionSubmitter::submit`]: crate::submitter::TransactionSubmitter::submit

use crate::{binding::ProgramBinding, error::ConnectorError, token::METADATA_PROGRAM_ID};
use anchor_lang::ToAccountMetas;
use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey,
    pubkey::Pubkey,
    sysvar,
    transaction::Transaction,
};

pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// The authority `set_authority` replaces. Encoded as the SPL Token variant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub enum AuthorityType {
    MintTokens,
    FreezeAccount,
    AccountOwner,
    CloseAccount,
}

/// Anchor's selector for a global instruction without a declared discriminator.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut selector = [0u8; 8];
    selector.copy_from_slice(&digest[..8]);
    selector
}

/// The account lists of the TokenCraft instructions, in the program's order.
pub mod accounts {
    use super::*;

    fn signer(key: Pubkey, writable: bool, is_signer: Option<bool>) -> AccountMeta {
        let signs = is_signer.unwrap_or(true);
        if writable {
            AccountMeta::new(key, signs)
        } else {
            AccountMeta::new_readonly(key, signs)
        }
    }

    /// The freshly created accounts of `initialize`. Each one co-signs the transaction.
    #[derive(Debug, Clone, Copy)]
    pub struct NewToken {
        pub token_account: Pubkey,
        pub mint: Pubkey,
        pub metadata_account: Pubkey,
        pub master_edition_account: Pubkey,
    }

    pub struct Initialize {
        pub new: NewToken,
        pub owner: Pubkey,
    }

    impl ToAccountMetas for Initialize {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                signer(self.new.token_account, true, is_signer),
                signer(self.new.mint, true, is_signer),
                signer(self.new.metadata_account, true, is_signer),
                signer(self.new.master_edition_account, true, is_signer),
                signer(self.owner, true, is_signer),
                AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
                AccountMeta::new_readonly(sysvar::rent::id(), false),
                AccountMeta::new_readonly(METADATA_PROGRAM_ID, false),
            ]
        }
    }

    pub struct Transfer {
        pub from: Pubkey,
        pub to: Pubkey,
        pub owner: Pubkey,
    }

    impl ToAccountMetas for Transfer {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                AccountMeta::new(self.from, false),
                AccountMeta::new(self.to, false),
                signer(self.owner, false, is_signer),
                AccountMeta::new_readonly(spl_token::id(), false),
            ]
        }
    }

    /// Shared by `burn`, `freeze` and `thaw`: token account and mint, then the authority.
    pub struct MintAction {
        pub token_account: Pubkey,
        pub mint: Pubkey,
        pub authority: Pubkey,
    }

    impl ToAccountMetas for MintAction {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                AccountMeta::new(self.token_account, false),
                AccountMeta::new(self.mint, false),
                signer(self.authority, false, is_signer),
                AccountMeta::new_readonly(spl_token::id(), false),
            ]
        }
    }

    pub struct Approve {
        pub token_account: Pubkey,
        pub delegate: Pubkey,
        pub owner: Pubkey,
    }

    impl ToAccountMetas for Approve {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                AccountMeta::new(self.token_account, false),
                AccountMeta::new_readonly(self.delegate, false),
                signer(self.owner, false, is_signer),
                AccountMeta::new_readonly(spl_token::id(), false),
            ]
        }
    }

    pub struct Revoke {
        pub token_account: Pubkey,
        pub owner: Pubkey,
    }

    impl ToAccountMetas for Revoke {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                AccountMeta::new(self.token_account, false),
                signer(self.owner, false, is_signer),
                AccountMeta::new_readonly(spl_token::id(), false),
            ]
        }
    }

    /// The owner receives the reclaimed rent, so it is writable.
    pub struct CloseAccount {
        pub token_account: Pubkey,
        pub owner: Pubkey,
    }

    impl ToAccountMetas for CloseAccount {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                AccountMeta::new(self.token_account, false),
                signer(self.owner, true, is_signer),
                AccountMeta::new_readonly(spl_token::id(), false),
            ]
        }
    }

    pub struct SetAuthority {
        pub mint: Pubkey,
        pub owner: Pubkey,
    }

    impl ToAccountMetas for SetAuthority {
        fn to_account_metas(&self, is_signer: Option<bool>) -> Vec<AccountMeta> {
            vec![
                AccountMeta::new(self.mint, false),
                signer(self.owner, false, is_signer),
                AccountMeta::new_readonly(spl_token::id(), false),
            ]
        }
    }
}

/// Borsh argument layouts, field order as declared by the program.
mod args {
    use borsh::BorshSerialize;

    #[derive(BorshSerialize)]
    pub struct Initialize {
        pub name: String,
        pub symbol: String,
        pub uri: String,
    }

    #[derive(BorshSerialize)]
    pub struct Amount {
        pub amount: u64,
    }

    #[derive(BorshSerialize)]
    pub struct SetAuthority {
        pub new_authority: [u8; 32],
        pub authority_type: super::AuthorityType,
    }
}

/// Builds unsigned TokenCraft transactions for one program binding.
///
/// The bound wallet is the fee payer and the `owner` of every instruction that has one.
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder<'a> {
    binding: &'a ProgramBinding,
}

impl ProgramBinding {
    pub fn transaction_builder(&self) -> TransactionBuilder<'_> {
        TransactionBuilder { binding: self }
    }
}

impl<'a> TransactionBuilder<'a> {
    /// The fee payer and default signer: the wallet the binding was derived for.
    pub fn payer(&self) -> Pubkey {
        self.binding.provider.wallet
    }

    /// Prepares `initialize`, creating a mint with its token, metadata and master edition
    /// accounts.
    ///
    /// The new accounts must co-sign. Set a recent blockhash and partially sign with their
    /// keypairs before handing the transaction to the submitter.
    ///
    /// # Arguments
    ///
    /// * `new` - The addresses of the accounts `initialize` creates.
    /// * `name`, `symbol`, `uri` - The token metadata.
    pub fn prepare_initialize(
        &self,
        new: accounts::NewToken,
        name: &str,
        symbol: &str,
        uri: &str,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::Initialize {
            new,
            owner: self.payer(),
        };
        let args = args::Initialize {
            name: name.to_string(),
            symbol: symbol.to_string(),
            uri: uri.to_string(),
        };
        self.transaction("initialize", &accounts, Some(&args))
    }

    /// Prepares `transfer` of `amount` base units between two token accounts owned by the
    /// bound wallet.
    pub fn prepare_transfer(
        &self,
        from: Pubkey,
        to: Pubkey,
        amount: u64,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::Transfer {
            from,
            to,
            owner: self.payer(),
        };
        self.transaction("transfer", &accounts, Some(&args::Amount { amount }))
    }

    pub fn prepare_burn(
        &self,
        token_account: Pubkey,
        mint: Pubkey,
        amount: u64,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::MintAction {
            token_account,
            mint,
            authority: self.payer(),
        };
        self.transaction("burn", &accounts, Some(&args::Amount { amount }))
    }

    /// Prepares `freeze`.
    ///
    /// # Arguments
    ///
    /// * `freeze_authority` - The mint's freeze authority. If it is not the bound wallet it
    ///   must co-sign before submission.
    pub fn prepare_freeze(
        &self,
        token_account: Pubkey,
        mint: Pubkey,
        freeze_authority: Pubkey,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::MintAction {
            token_account,
            mint,
            authority: freeze_authority,
        };
        self.transaction::<args::Amount>("freeze", &accounts, None)
    }

    /// Prepares `thaw`. See [`TransactionBuilder::prepare_freeze`] for `freeze_authority`.
    pub fn prepare_thaw(
        &self,
        token_account: Pubkey,
        mint: Pubkey,
        freeze_authority: Pubkey,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::MintAction {
            token_account,
            mint,
            authority: freeze_authority,
        };
        self.transaction::<args::Amount>("thaw", &accounts, None)
    }

    pub fn prepare_approve(
        &self,
        token_account: Pubkey,
        delegate: Pubkey,
        amount: u64,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::Approve {
            token_account,
            delegate,
            owner: self.payer(),
        };
        self.transaction("approve", &accounts, Some(&args::Amount { amount }))
    }

    pub fn prepare_revoke(&self, token_account: Pubkey) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::Revoke {
            token_account,
            owner: self.payer(),
        };
        self.transaction::<args::Amount>("revoke", &accounts, None)
    }

    /// Prepares `close_account`. The reclaimed rent goes to the bound wallet.
    pub fn prepare_close_account(
        &self,
        token_account: Pubkey,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::CloseAccount {
            token_account,
            owner: self.payer(),
        };
        self.transaction::<args::Amount>("close_account", &accounts, None)
    }

    /// Prepares `set_authority` on `mint`.
    ///
    /// # Arguments
    ///
    /// * `new_authority` - The account that takes over the authority.
    /// * `authority_type` - Which of the mint's authorities is replaced.
    pub fn prepare_set_authority(
        &self,
        mint: Pubkey,
        new_authority: Pubkey,
        authority_type: AuthorityType,
    ) -> Result<Transaction, ConnectorError> {
        let accounts = accounts::SetAuthority {
            mint,
            owner: self.payer(),
        };
        let args = args::SetAuthority {
            new_authority: new_authority.to_bytes(),
            authority_type,
        };
        self.transaction("set_authority", &accounts, Some(&args))
    }

    fn selector(&self, name: &str) -> Result<[u8; 8], ConnectorError> {
        let program = &self.binding.program;
        if !program.has_instruction(name) {
            return Err(ConnectorError::InvalidInstruction(format!(
                "program '{}' does not declare '{}'",
                program.name, name
            )));
        }
        Ok(program
            .instruction_discriminator(name)
            .unwrap_or_else(|| instruction_discriminator(name)))
    }

    fn transaction<A: BorshSerialize>(
        &self,
        name: &str,
        accounts: &impl ToAccountMetas,
        args: Option<&A>,
    ) -> Result<Transaction, ConnectorError> {
        let mut data = self.selector(name)?.to_vec();
        if let Some(args) = args {
            args.serialize(&mut data)
                .map_err(|e| ConnectorError::InvalidInstruction(format!("{}: {}", name, e)))?;
        }

        let ix = Instruction {
            program_id: self.binding.program_id,
            accounts: accounts.to_account_metas(None),
            data,
        };
        let payer = self.payer();
        Ok(Transaction::new_unsigned(Message::new(&[ix], Some(&payer))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_selector_matches_anchor() {
        // sha256("global:initialize")[..8]
        assert_eq!(
            instruction_discriminator("initialize"),
            [175, 175, 109, 31, 13, 152, 155, 237]
        );
        assert_ne!(
            instruction_discriminator("freeze"),
            instruction_discriminator("thaw")
        );
    }

    #[test]
    fn authority_type_encodes_as_variant_index() {
        let encoded = [
            AuthorityType::MintTokens,
            AuthorityType::FreezeAccount,
            AuthorityType::AccountOwner,
            AuthorityType::CloseAccount,
        ]
        .iter()
        .map(|t| t.try_to_vec().unwrap()[0])
        .collect::<Vec<_>>();
        assert_eq!(encoded, vec![0, 1, 2, 3]);
    }

    #[test]
    fn signer_override_applies_to_signers_only() {
        let owner = Pubkey::new_unique();
        let metas = accounts::Revoke {
            token_account: Pubkey::new_unique(),
            owner,
        }
        .to_account_metas(Some(false));
        assert!(metas.iter().all(|m| !m.is_signer));
        assert!(metas[0].is_writable);
        assert_eq!(metas[1].pubkey, owner);
    }
}
