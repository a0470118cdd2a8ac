use crate::{
    config::{commitment_name, Solana},
    rpc::LedgerRpc,
};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use std::{fmt, sync::Arc};

/// The process-wide network connection: an RPC endpoint plus the commitment level used for
/// reads and confirmations.
///
/// The handle is constructed once by the hosting environment and injected into every
/// component. Cloning it is cheap and shares the underlying client.
#[derive(Clone)]
pub struct ConnectionHandle {
    rpc: Arc<dyn LedgerRpc>,
    endpoint: String,
    commitment: CommitmentLevel,
}

impl ConnectionHandle {
    /// Wraps an existing `LedgerRpc` implementation.
    pub fn new(rpc: Arc<dyn LedgerRpc>, endpoint: impl Into<String>, commitment: CommitmentLevel) -> Self {
        Self {
            rpc,
            endpoint: endpoint.into(),
            commitment,
        }
    }

    /// Builds a handle backed by a live `RpcClient` for the configured cluster.
    pub fn from_config(solana: &Solana) -> Self {
        let client = RpcClient::new_with_commitment(
            solana.rpc_url.clone(),
            CommitmentConfig {
                commitment: solana.commitment,
            },
        );
        Self::new(Arc::new(client), solana.rpc_url.clone(), solana.commitment)
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn commitment(&self) -> CommitmentLevel {
        self.commitment
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint)
            .field("commitment", &commitment_name(&self.commitment))
            .finish()
    }
}
