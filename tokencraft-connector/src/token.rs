//! # Token Data Model
//!
//! Plain records describing token accounts and the facts derived from their mints, together
//! with the decoders that turn raw account data into them. SPL Token and Token-2022 share the
//! same base layout, so both are decoded from the leading `Account::LEN` / `Mint::LEN` bytes and
//! any trailing extension data is ignored.

use crate::error::RpcError;
use borsh::BorshDeserialize;
use solana_sdk::{program_pack::Pack, pubkey, pubkey::Pubkey};
use spl_token::state::{Account, AccountState, Mint};

/// The Token-2022 program id.
pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// The Metaplex token metadata program id.
pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Size of an SPL token account without extensions.
pub const TOKEN_ACCOUNT_LEN: usize = Account::LEN;

/// One on-chain token account owned by the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountRecord {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    /// Raw balance in base units.
    pub amount: u64,
    /// The token program that owns this account.
    pub token_program: Pubkey,
    pub delegate: Option<Pubkey>,
    pub is_frozen: bool,
}

/// Decoded mint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintInfo {
    pub mint: Pubkey,
    pub decimals: u8,
    /// Supply as stored in the mint account at read time.
    pub supply: u64,
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub is_initialized: bool,
}

/// Token supply as reported by the `getTokenSupply` RPC method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyInfo {
    pub mint: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount_string: String,
}

/// Metaplex metadata attached to a mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub mint: Pubkey,
    pub update_authority: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
}

/// The leading fields of a Metaplex `Metadata` account, in on-chain order.
#[derive(BorshDeserialize)]
struct RawMetadata {
    _key: u8,
    update_authority: [u8; 32],
    mint: [u8; 32],
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
}

/// Derives the Metaplex metadata PDA of a mint.
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

/// Returns `true` if `program` is one of the token programs the aggregator understands.
pub fn is_token_program(program: &Pubkey) -> bool {
    *program == spl_token::id() || *program == TOKEN_2022_PROGRAM_ID
}

/// Token-2022 tags extended accounts with their type right after the base layout.
const ACCOUNT_TYPE_ACCOUNT: u8 = 2;

/// Returns `true` if `data` has the shape of a token account rather than a mint or multisig.
pub fn is_account_layout(data: &[u8]) -> bool {
    match data.len() {
        len if len == Account::LEN => true,
        len if len > Account::LEN => data[Account::LEN] == ACCOUNT_TYPE_ACCOUNT,
        _ => false,
    }
}

pub fn decode_token_account(
    address: Pubkey,
    token_program: Pubkey,
    data: &[u8],
) -> Result<TokenAccountRecord, RpcError> {
    let base = base_slice(address, data, Account::LEN)?;
    let account = Account::unpack(base).map_err(|e| RpcError::Decode {
        address,
        reason: e.to_string(),
    })?;

    Ok(TokenAccountRecord {
        address,
        mint: account.mint,
        owner: account.owner,
        amount: account.amount,
        token_program,
        delegate: account.delegate.into(),
        is_frozen: account.state == AccountState::Frozen,
    })
}

pub fn decode_mint(mint: Pubkey, data: &[u8]) -> Result<MintInfo, RpcError> {
    let base = base_slice(mint, data, Mint::LEN)?;
    let state = Mint::unpack(base).map_err(|e| RpcError::Decode {
        address: mint,
        reason: e.to_string(),
    })?;

    Ok(MintInfo {
        mint,
        decimals: state.decimals,
        supply: state.supply,
        mint_authority: state.mint_authority.into(),
        freeze_authority: state.freeze_authority.into(),
        is_initialized: state.is_initialized,
    })
}

/// Decodes a Metaplex metadata account.
///
/// Names, symbols and URIs are stored NUL-padded to a fixed width; the padding is trimmed.
pub fn decode_metadata(address: Pubkey, data: &[u8]) -> Result<MetadataRecord, RpcError> {
    let raw = RawMetadata::deserialize(&mut &data[..]).map_err(|e| RpcError::Decode {
        address,
        reason: e.to_string(),
    })?;

    Ok(MetadataRecord {
        mint: Pubkey::new_from_array(raw.mint),
        update_authority: Pubkey::new_from_array(raw.update_authority),
        name: trim_padding(raw.name),
        symbol: trim_padding(raw.symbol),
        uri: trim_padding(raw.uri),
        seller_fee_basis_points: raw.seller_fee_basis_points,
    })
}

fn base_slice(address: Pubkey, data: &[u8], len: usize) -> Result<&[u8], RpcError> {
    data.get(..len).ok_or_else(|| RpcError::Decode {
        address,
        reason: format!("expected at least {} bytes, got {}", len, data.len()),
    })
}

fn trim_padding(s: String) -> String {
    s.trim_end_matches('\0').to_string()
}

/// Formats a raw amount with the given number of decimals, e.g. `1500` with 3 decimals as `"1.5"`.
pub fn format_amount(amount: u64, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    // Mint decimals range over all of u8, past any integer power of ten.
    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}
