//! # On-chain Program Interface
//!
//! Anchor programs publish their interface description in an account derived from the
//! program id. The account holds an 8-byte discriminator, the upgrade authority, a
//! little-endian length and then `data_len` bytes of zlib-compressed JSON.
//!
//! Both the current IDL layout (`address` + `metadata { name, version, spec }`) and the
//! legacy layout (top-level `name` and `version`) are accepted.

use crate::{error::IdlError, rpc::LedgerRpc};
use anchor_lang::{idl::IdlAccount, AccountDeserialize};
use flate2::read::ZlibDecoder;
use serde_json::Value;
use solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey};
use std::{io::Read, str::FromStr};

/// Offset of the compressed payload: discriminator, authority and length prefix.
const IDL_HEADER_LEN: usize = 8 + 32 + 4;

/// The decoded interface of an on-chain program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInterface {
    pub name: String,
    pub version: String,
    /// The program address embedded in the IDL, if the IDL carries one.
    pub address: Option<Pubkey>,
    pub authority: Pubkey,
    pub instructions: Vec<String>,
    pub accounts: Vec<String>,
    pub events: Vec<String>,
    pub errors: Vec<String>,
    /// The full JSON document.
    pub raw: Value,
}

impl ProgramInterface {
    /// Legacy IDLs name instructions in camelCase, current ones in snake_case; both match.
    pub fn has_instruction(&self, name: &str) -> bool {
        self.instructions.iter().any(|i| same_name(i, name))
    }

    /// The 8-byte selector the IDL declares for `name`, if it declares one.
    pub fn instruction_discriminator(&self, name: &str) -> Option<[u8; 8]> {
        let entry = self
            .raw
            .get("instructions")?
            .as_array()?
            .iter()
            .find(|item| {
                item.get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|n| same_name(n, name))
            })?;

        let bytes = entry
            .get("discriminator")?
            .as_array()?
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()?;
        bytes.try_into().ok()
    }
}

fn same_name(a: &str, b: &str) -> bool {
    let fold = |s: &str| {
        s.chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    fold(a) == fold(b)
}

/// Returns the address of the IDL account for `program_id`.
pub fn idl_address(program_id: &Pubkey) -> Pubkey {
    IdlAccount::address(program_id)
}

/// Fetches and decodes the IDL of `program_id`.
pub async fn fetch_program_interface(
    rpc: &dyn LedgerRpc,
    program_id: &Pubkey,
    commitment: CommitmentLevel,
) -> Result<ProgramInterface, IdlError> {
    let address = idl_address(program_id);
    let data = rpc
        .get_account_data(&address, commitment)
        .await
        .map_err(|e| IdlError::InvalidAccount(format!("failed to fetch {}: {}", address, e)))?
        .ok_or(IdlError::NotFound(*program_id))?;
    decode_idl_account(&data)
}

/// Decodes the raw data of an IDL account.
pub fn decode_idl_account(data: &[u8]) -> Result<ProgramInterface, IdlError> {
    let header = IdlAccount::try_deserialize(&mut &data[..])
        .map_err(|e| IdlError::InvalidAccount(e.to_string()))?;

    let end = IDL_HEADER_LEN + header.data_len as usize;
    let compressed = data.get(IDL_HEADER_LEN..end).ok_or_else(|| {
        IdlError::InvalidAccount(format!(
            "declared {} payload bytes but account holds {}",
            header.data_len,
            data.len().saturating_sub(IDL_HEADER_LEN)
        ))
    })?;

    let mut json = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut json)
        .map_err(|e| IdlError::Decompress(e.to_string()))?;

    let raw: Value =
        serde_json::from_slice(&json).map_err(|e| IdlError::ParseError(e.to_string()))?;
    parse_interface(raw, header.authority)
}

fn parse_interface(raw: Value, authority: Pubkey) -> Result<ProgramInterface, IdlError> {
    let metadata = raw.get("metadata");
    let field = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .or_else(|| raw.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let name = field("name").ok_or_else(|| IdlError::InvalidFormat("missing 'name'".to_string()))?;
    let version = field("version").unwrap_or_default();

    let address = match raw.get("address").and_then(Value::as_str) {
        Some(s) => Some(
            Pubkey::from_str(s)
                .map_err(|e| IdlError::InvalidFormat(format!("invalid address '{}': {}", s, e)))?,
        ),
        None => None,
    };

    let instructions = match raw.get("instructions") {
        Some(Value::Array(items)) => names(items),
        _ => {
            return Err(IdlError::InvalidFormat(
                "'instructions' must be an array".to_string(),
            ))
        }
    };

    Ok(ProgramInterface {
        name,
        version,
        address,
        authority,
        instructions,
        accounts: optional_names(&raw, "accounts"),
        events: optional_names(&raw, "events"),
        errors: optional_names(&raw, "errors"),
        raw,
    })
}

fn names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn optional_names(raw: &Value, key: &str) -> Vec<String> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|items| names(items))
        .unwrap_or_default()
}
