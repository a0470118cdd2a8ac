mod common;

use common::{
    connection, test_config, unsigned_transaction, Call, MockLedger, MockWallet, WalletBehaviour,
    WalletCall,
};
use solana_sdk::{
    commitment_config::CommitmentLevel, hash::Hash, instruction::InstructionError,
    transaction::{Transaction, TransactionError},
};
use std::sync::Arc;
use tokencraft_connector::{
    submitter::TransactionSubmitter, wallet::WalletConnectionManager, ConnectorError,
};

struct Setup {
    ledger: Arc<MockLedger>,
    wallet: Arc<MockWallet>,
    manager: Arc<WalletConnectionManager>,
    submitter: TransactionSubmitter,
}

fn setup(behaviour: WalletBehaviour) -> Setup {
    let config = test_config();
    let ledger = MockLedger::new();
    let wallet = MockWallet::with_behaviour("phantom", behaviour);
    let manager = Arc::new(WalletConnectionManager::new(
        wallet.clone(),
        config.wallet.connect_timeout(),
    ));
    let submitter = TransactionSubmitter::new(connection(&ledger), manager.clone(), config.submitter);
    Setup {
        ledger,
        wallet,
        manager,
        submitter,
    }
}

#[tokio::test]
async fn test_submit_while_disconnected_makes_no_network_call() {
    let s = setup(WalletBehaviour::default());
    let tx = unsigned_transaction(&s.wallet.pubkey());

    let err = s.submitter.submit(tx).await.unwrap_err();

    assert_eq!(err, ConnectorError::NotConnected);
    assert!(s.ledger.calls().is_empty());
    assert!(s.wallet.calls().is_empty());
}

#[tokio::test]
async fn test_submit_signs_sends_and_confirms() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;
    let tx = unsigned_transaction(&s.wallet.pubkey());

    let receipt = s.submitter.submit(tx).await?;

    assert_eq!(receipt.confirmation, CommitmentLevel::Confirmed);
    assert_ne!(receipt.signature, Default::default());
    assert_eq!(
        s.ledger.calls(),
        vec![Call::LatestBlockhash, Call::Send, Call::SignatureStatus]
    );
    assert_eq!(s.wallet.calls(), vec![WalletCall::Connect, WalletCall::Sign]);
    Ok(())
}

#[tokio::test]
async fn test_existing_blockhash_is_kept() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;
    let mut tx = unsigned_transaction(&s.wallet.pubkey());
    tx.message.recent_blockhash = Hash::new_unique();

    s.submitter.submit(tx).await?;

    assert_eq!(s.ledger.count(|c| *c == Call::LatestBlockhash), 0);
    Ok(())
}

#[tokio::test]
async fn test_signing_rejection_is_reported_and_nothing_is_sent() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour {
        reject_sign: true,
        ..Default::default()
    });
    s.manager.connect().await?;

    let err = s
        .submitter
        .submit(unsigned_transaction(&s.wallet.pubkey()))
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::SigningRejected(_)));
    assert_eq!(s.ledger.count(|c| *c == Call::Send), 0);
    Ok(())
}

#[tokio::test]
async fn test_network_refusal_is_a_submission_failure() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;
    s.ledger
        .update(|l| l.send_error = Some("blockhash not found".to_string()));

    let err = s
        .submitter
        .submit(unsigned_transaction(&s.wallet.pubkey()))
        .await
        .unwrap_err();

    match err {
        ConnectorError::SubmissionFailed(reason) => assert!(reason.contains("blockhash not found")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(s.ledger.count(|c| *c == Call::SignatureStatus), 0);
    Ok(())
}

#[tokio::test]
async fn test_unconfirmed_transaction_times_out() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;
    s.ledger.update(|l| l.never_confirm = true);

    let err = s
        .submitter
        .submit(unsigned_transaction(&s.wallet.pubkey()))
        .await
        .unwrap_err();

    match err {
        ConnectorError::ConfirmationTimeout { waited_ms, .. } => {
            assert_eq!(waited_ms, test_config().submitter.confirmation_timeout_ms)
        }
        other => panic!("expected a confirmation timeout, got {other:?}"),
    }
    assert!(s.ledger.count(|c| *c == Call::SignatureStatus) > 1);
    Ok(())
}

#[tokio::test]
async fn test_on_chain_failure_is_a_submission_failure() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;
    s.ledger.update(|l| {
        l.execution_error = Some(TransactionError::InstructionError(
            0,
            InstructionError::Custom(6000),
        ))
    });

    let err = s
        .submitter
        .submit(unsigned_transaction(&s.wallet.pubkey()))
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::SubmissionFailed(_)));
    Ok(())
}

#[tokio::test]
async fn test_transaction_without_accounts_is_refused() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;

    let err = s.submitter.submit(Transaction::default()).await.unwrap_err();

    assert!(matches!(err, ConnectorError::SubmissionFailed(_)));
    assert!(s.ledger.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_submit_all_signs_batch_once() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour::default());
    s.manager.connect().await?;
    let payer = s.wallet.pubkey();
    let batch = vec![unsigned_transaction(&payer), unsigned_transaction(&payer)];

    let receipts = s.submitter.submit_all(batch).await?;

    assert_eq!(receipts.len(), 2);
    assert_ne!(receipts[0].signature, receipts[1].signature);
    assert_eq!(s.ledger.count(|c| *c == Call::LatestBlockhash), 1);
    assert_eq!(s.ledger.count(|c| *c == Call::Send), 2);
    assert_eq!(s.wallet.calls(), vec![WalletCall::Connect, WalletCall::SignAll(2)]);
    Ok(())
}

#[tokio::test]
async fn test_submit_all_falls_back_to_single_signing() -> anyhow::Result<()> {
    let s = setup(WalletBehaviour {
        single_signing_only: true,
        ..Default::default()
    });
    s.manager.connect().await?;
    let payer = s.wallet.pubkey();

    let receipts = s
        .submitter
        .submit_all(vec![unsigned_transaction(&payer), unsigned_transaction(&payer)])
        .await?;

    assert_eq!(receipts.len(), 2);
    assert_eq!(
        s.wallet.calls(),
        vec![WalletCall::Connect, WalletCall::Sign, WalletCall::Sign]
    );
    Ok(())
}

#[tokio::test]
async fn test_submit_all_requires_connection() {
    let s = setup(WalletBehaviour::default());

    let err = s.submitter.submit_all(Vec::new()).await.unwrap_err();

    assert_eq!(err, ConnectorError::NotConnected);
}
