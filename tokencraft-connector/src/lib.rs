//! A Rust library that binds a user's wallet to a Solana cluster and an Anchor program, and
//! keeps an aggregated view of the wallet's token holdings up to date.
//!
//! The pipeline is reactive: a wallet transition invalidates the program binding, a newly
//! published binding triggers a token data aggregation, and every published value is
//! guarded against inputs that changed while it was being computed.
//!
//! # Key Components
//!
//! *   [`wallet::WalletConnectionManager`]: The connect/disconnect state machine around a
//!     [`wallet::WalletAdapter`].
//! *   [`binding::ProgramBindingResolver`]: Derives the provider + program binding from the
//!     connected wallet and the on-chain IDL.
//! *   [`aggregator::TokenDataAggregator`]: Fetches owned token accounts and the facts of
//!     their mints into one index-aligned [`aggregator::AggregateSnapshot`].
//! *   [`instructions::TransactionBuilder`]: Builds unsigned TokenCraft program transactions
//!     from a live [`binding::ProgramBinding`].
//! *   [`submitter::TransactionSubmitter`]: Signs, sends and confirms transactions.
//! *   [`session::Session`]: Runs the pipeline; its [`session::SessionHandle`] is the read
//!     surface for applications.
pub mod aggregator;
pub mod binding;
/// Defines configuration structures for the connector.
pub mod config;
/// The process-wide RPC connection handle.
pub mod connection;
pub mod error;
/// Decoding of Anchor IDL accounts.
pub mod idl;
pub mod instructions;
/// The async RPC seam and its `RpcClient` implementation.
pub mod rpc;
pub mod session;
pub mod submitter;
/// Token account, mint and metadata records and their decoders.
pub mod token;
pub mod wallet;

pub use error::ConnectorError;
pub use session::{Session, SessionHandle};
