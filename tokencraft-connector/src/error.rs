use solana_client::client_error::ClientError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// The conditions the connector reports to its callers.
///
/// Every variant is recoverable: none of them leaves a component half-updated, and none of
/// them is retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The user or the wallet adapter declined to connect, or authorization timed out.
    #[error("Wallet rejected the connection: {0}")]
    WalletRejected(String),

    /// The program interface could not be fetched or decoded.
    #[error("Program binding unavailable: {0}")]
    BindingUnavailable(String),

    /// The owned token accounts could not be fetched; the previous snapshot is kept.
    #[error("Token data aggregation failed: {0}")]
    AggregationFailed(String),

    /// An operation that needs a connected wallet was attempted without one.
    #[error("Wallet not connected")]
    NotConnected,

    /// The wallet refused to sign the transaction.
    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    /// The network refused the transaction, or it failed on-chain.
    #[error("Transaction submission failed: {0}")]
    SubmissionFailed(String),

    /// The transaction was sent but not confirmed within the bounded wait.
    #[error("Transaction {signature} was not confirmed within {waited_ms} ms")]
    ConfirmationTimeout { signature: String, waited_ms: u64 },

    /// A program instruction could not be built from the bound interface.
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by a `LedgerRpc` implementation.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("RPC client error: {0}")]
    Client(#[from] Box<ClientError>),

    #[error("Account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("Failed to decode account {address}: {reason}")]
    Decode { address: Pubkey, reason: String },

    #[error("RPC unavailable: {0}")]
    Unavailable(String),
}

impl From<ClientError> for RpcError {
    fn from(err: ClientError) -> Self {
        RpcError::Client(Box::new(err))
    }
}

/// Errors raised by a `WalletAdapter` implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Wallet adapter error: {0}")]
    Other(String),
}

/// Errors raised while decoding an on-chain program interface description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdlError {
    #[error("No IDL account exists for program {0}")]
    NotFound(Pubkey),

    #[error("Invalid IDL account: {0}")]
    InvalidAccount(String),

    #[error("Failed to decompress IDL: {0}")]
    Decompress(String),

    #[error("Failed to parse IDL JSON: {0}")]
    ParseError(String),

    #[error("Invalid IDL format: {0}")]
    InvalidFormat(String),
}
