#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;
use solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey};
use std::{str::FromStr, time::Duration};

/// Placeholder program id used when no `program-id` is configured.
pub const DEFAULT_PROGRAM_ID: &str = "TokenCraft111111111111111111111111111111111";

/// The top-level configuration for the `tokencraft-connector` library.
///
/// This struct aggregates all necessary settings, including the Solana network endpoint,
/// the program to bind to and the behaviour of the aggregation and submission paths. It is
/// typically deserialized from a configuration file and passed to the `Session` upon
/// initialization.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ConnectorConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub solana: Solana,
    #[cfg_attr(feature = "serde", serde(default))]
    pub program: ProgramConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub wallet: WalletConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub aggregator: AggregatorConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub submitter: SubmitterConfig,
}

/// Defines the connection settings for the Solana cluster.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Solana {
    pub rpc_url: String,
    #[cfg_attr(feature = "serde", serde(with = "serde_commitment"))]
    pub commitment: CommitmentLevel,
}

/// Identifies the on-chain program whose interface description is bound to the wallet.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ProgramConfig {
    /// Base58 program id. Treated as configuration, never derived.
    pub program_id: String,
    /// Reuse a fetched IDL across wallet changes instead of re-fetching it every time.
    #[cfg_attr(feature = "serde", serde(default))]
    pub cache_idl: bool,
}

/// Wallet adapter behaviour.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct WalletConfig {
    /// How long an adapter may take to authorize before `connect` reports a rejection.
    pub connect_timeout_ms: u64,
}

/// Defines behaviour of the token data aggregation cycle.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct AggregatorConfig {
    /// The maximum number of mints whose facts are fetched at the same time.
    pub max_concurrent_mints: usize,
    /// Whether accounts owned by the Token-2022 program are aggregated alongside SPL Token ones.
    pub include_token_2022: bool,
}

/// Defines behaviour of the transaction submission path.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct SubmitterConfig {
    /// Upper bound on the time spent awaiting confirmation of a sent transaction.
    pub confirmation_timeout_ms: u64,
    /// The interval between two signature status polls.
    pub poll_interval_ms: u64,
    /// Skip the preflight simulation when sending.
    pub skip_preflight: bool,
}

impl Default for Solana {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: CommitmentLevel::Confirmed,
        }
    }
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            cache_idl: false,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 60_000,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_mints: 16,
            include_token_2022: true,
        }
    }
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: 60_000,
            poll_interval_ms: 500,
            skip_preflight: false,
        }
    }
}

impl ProgramConfig {
    /// Parses the configured program id.
    pub fn parse_program_id(&self) -> Result<Pubkey, ConnectorError> {
        Pubkey::from_str(&self.program_id).map_err(|e| {
            ConnectorError::InvalidConfig(format!("program-id '{}': {}", self.program_id, e))
        })
    }
}

impl WalletConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl SubmitterConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Parses a commitment level name, case-insensitively.
///
/// Unknown names fall back to `Confirmed`.
pub fn parse_commitment(s: &str) -> CommitmentLevel {
    match s.to_lowercase().as_str() {
        "processed" => CommitmentLevel::Processed,
        "confirmed" => CommitmentLevel::Confirmed,
        "finalized" => CommitmentLevel::Finalized,
        _ => CommitmentLevel::Confirmed,
    }
}

/// Returns the lowercase name of a commitment level.
pub fn commitment_name(c: &CommitmentLevel) -> &'static str {
    match c {
        CommitmentLevel::Processed => "processed",
        CommitmentLevel::Confirmed => "confirmed",
        CommitmentLevel::Finalized => "finalized",
    }
}

#[cfg(feature = "serde")]
mod serde_commitment {

    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(c: &CommitmentLevel, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(commitment_name(c))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<CommitmentLevel, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Ok(parse_commitment(&s))
    }
}
