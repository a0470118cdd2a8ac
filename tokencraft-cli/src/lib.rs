pub mod cli;
pub mod config;
pub mod conversions;
pub mod error;
pub mod keypair;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, SessionArgs, SubmitCmd};
use config::{load_config, CliConfig};
use conversions::{decode_transaction, to_json, InterfaceView, ReceiptView, SnapshotView};
use keypair::KeypairWallet;
use solana_sdk::transaction::Transaction;
use std::{io::Read, sync::Arc, time::Duration};
use tokencraft_connector::{connection::ConnectionHandle, Session, SessionHandle};
use tokio::{signal, task::JoinHandle};

/// The main entry point for running the CLI application logic.
/// This function handles CLI parsing, configuration, and command dispatch.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let (config, running) = start(&args).await?;
            let outcome = watch_snapshots(&running.handle, config.cli.refresh_interval_secs).await;
            running.shutdown().await;
            outcome
        }
        Commands::Snapshot(args) => {
            let (_, running) = start(&args).await?;
            let outcome = print_snapshot(&running.handle).await;
            running.shutdown().await;
            outcome
        }
        Commands::Submit(cmd) => {
            // Read the input before anything connects, so a bad argument fails fast.
            let transaction = read_transaction(&cmd)?;
            let (_, running) = start(&cmd.session).await?;
            let outcome = submit_transaction(&running.handle, transaction).await;
            running.shutdown().await;
            outcome
        }
        Commands::Idl(args) => {
            let (_, running) = start(&args).await?;
            let outcome = print_interface(&running.handle).await;
            running.shutdown().await;
            outcome
        }
    }
}

/// Loads the configuration based on the provided CLI arguments.
fn load_config_from_cli(args: &SessionArgs) -> Result<CliConfig> {
    let mut config = if let Some(config_path) = &args.config {
        println!("Loading configuration from '{}'", config_path);
        load_config(config_path)?
    } else {
        println!("No config file provided, using default settings.");
        CliConfig::default()
    };
    if let Some(keypair) = &args.keypair {
        config.cli.keypair_path = keypair.clone();
    }
    Ok(config)
}

/// A session running on its own task.
struct RunningSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl RunningSession {
    async fn shutdown(self) {
        self.handle.disconnect().await;
        self.handle.stop().await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Session task failed");
        }
        tracing::info!("Shutdown complete.");
    }
}

/// Loads configuration, installs logging and starts a session around the keypair wallet.
async fn start(args: &SessionArgs) -> Result<(CliConfig, RunningSession)> {
    let config = load_config_from_cli(args)?;
    tokencraft_logger::init(&config.cli.log)?;
    tracing::debug!("Configuration loaded: {:#?}", &config);

    let keypair_path = config.cli.keypair_path();
    let wallet = KeypairWallet::from_file(&keypair_path)?;
    tracing::info!(wallet = %wallet.pubkey(), path = %keypair_path.display(), "Keypair loaded");

    let connection = ConnectionHandle::from_config(&config.connector.solana);
    tracing::info!(
        endpoint = connection.endpoint(),
        program_id = %config.connector.program.program_id,
        "Starting session"
    );
    let (session, handle) = Session::new(
        Arc::new(config.connector.clone()),
        connection,
        Arc::new(wallet),
    )
    .context("Failed to create session")?;
    let task = tokio::spawn(session.run());

    Ok((config, RunningSession { handle, task }))
}

/// Connects and logs every published snapshot until Ctrl+C.
async fn watch_snapshots(handle: &SessionHandle, refresh_interval_secs: u64) -> Result<()> {
    let mut snapshots = handle.subscribe_snapshot();
    let mut bindings = handle.subscribe_binding();
    let identity = handle.connect().await.context("Failed to connect the wallet")?;
    tracing::info!(wallet = %identity.pubkey, "Wallet connected, watching token accounts");

    let mut ticker = tokio::time::interval(Duration::from_secs(refresh_interval_secs.max(1)));
    ticker.tick().await;

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                match result {
                    Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
                    Err(err) => tracing::error!(error = %err, "Failed to listen for shutdown signal."),
                }
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = snapshots.borrow_and_update().clone();
                if state.in_progress {
                    continue;
                }
                match (&state.last_error, &state.snapshot) {
                    (Some(e), _) => tracing::warn!(error = %e, "Token snapshot not refreshed"),
                    (None, Some(snapshot)) => {
                        let view = SnapshotView::from(snapshot.as_ref());
                        tracing::info!(
                            revision = state.revision,
                            accounts = view.tokens.len(),
                            "Token snapshot published"
                        );
                        for row in &view.tokens {
                            tracing::info!(
                                mint = %row.mint,
                                amount = row.ui_amount.as_deref().unwrap_or("?"),
                                symbol = row.symbol.as_deref().unwrap_or(""),
                                "Token balance"
                            );
                        }
                    }
                    (None, None) => {}
                }
            }
            changed = bindings.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(e) = &bindings.borrow_and_update().last_error {
                    tracing::warn!(error = %e, "Program binding unavailable");
                }
            }
            _ = ticker.tick(), if refresh_interval_secs > 0 => {
                handle.refresh().await;
            }
        }
    }
    Ok(())
}

async fn print_snapshot(handle: &SessionHandle) -> Result<()> {
    let baseline = handle.snapshot_state().revision;
    handle.connect().await.context("Failed to connect the wallet")?;
    let snapshot = handle.wait_for_snapshot(baseline).await?;
    println!("{}", to_json(&SnapshotView::from(snapshot.as_ref()))?);
    Ok(())
}

async fn print_interface(handle: &SessionHandle) -> Result<()> {
    let mut bindings = handle.subscribe_binding();
    handle.connect().await.context("Failed to connect the wallet")?;
    let state = bindings
        .wait_for(|b| b.binding.is_some() || b.last_error.is_some())
        .await
        .context("Session stopped before a binding was resolved")?
        .clone();
    match (state.binding, state.last_error) {
        (Some(binding), _) => {
            println!("{}", to_json(&InterfaceView::from(binding.as_ref()))?);
            Ok(())
        }
        (None, Some(e)) => Err(e.into()),
        (None, None) => Ok(()),
    }
}

async fn submit_transaction(handle: &SessionHandle, transaction: Transaction) -> Result<()> {
    handle.connect().await.context("Failed to connect the wallet")?;
    let receipt = handle.submit(transaction).await?;
    tracing::info!(signature = %receipt.signature, "Transaction confirmed");
    println!("{}", to_json(&ReceiptView::from(&receipt))?);
    Ok(())
}

fn read_transaction(cmd: &SubmitCmd) -> Result<Transaction> {
    let encoded = if cmd.transaction == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read the transaction from stdin")?;
        input
    } else {
        cmd.transaction.clone()
    };
    Ok(decode_transaction(&encoded)?)
}
