use clap::{Args, Parser, Subcommand};

/// The main CLI structure for TokenCraft.
#[derive(Parser, Debug)]
#[command(name = "tokencraft", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Defines the available subcommands for the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect the keypair wallet and log every published token snapshot until Ctrl+C.
    Run(SessionArgs),
    /// Print the first token snapshot of the wallet as JSON and exit.
    Snapshot(SessionArgs),
    /// Sign, send and confirm a serialized transaction.
    Submit(SubmitCmd),
    /// Print the interface of the configured program as bound to the wallet.
    Idl(SessionArgs),
}

/// Arguments shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Path to the configuration TOML file.
    /// If not provided, default values will be used.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Path to a Solana keypair file. Overrides `cli.keypair-path`.
    #[arg(short, long)]
    pub keypair: Option<String>,
}

/// Arguments for the `submit` subcommand.
#[derive(Args, Debug)]
pub struct SubmitCmd {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Base64 of a bincode-serialized transaction. Use `-` to read it from stdin.
    pub transaction: String,
}
