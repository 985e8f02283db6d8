mod common;

use std::sync::Arc;

use anyhow::Result;
use arca::application::{
    AppError, DeliveryStats, NotificationKind, OwnerAddressDirectory, spawn_notifier,
};
use arca::domain::AccountType;
use common::{FailingMailer, RecordingMailer, test_service};

#[tokio::test]
async fn test_committed_operations_notify_owners() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let mailer = Arc::new(RecordingMailer::default());
    let (outbox, notifier) = spawn_notifier(mailer.clone(), Arc::new(OwnerAddressDirectory));
    let service = service.with_outbox(outbox);

    let alice = service
        .open_account("alice@example.com".to_string(), AccountType::Savings)
        .await?;
    let bob = service
        .open_account("bob@example.com".to_string(), AccountType::Current)
        .await?;

    service.deposit(alice.id, 50_000).await?;
    service.withdraw(alice.id, 5_000).await?;
    let loan = service.request_loan(alice.id, 10_000).await?;
    service.approve_loan(loan.id).await?;
    service.pay_loan(loan.id).await?;
    service.transfer(alice.id, bob.id, 7_500).await?;

    drop(service);
    let stats = notifier.join().await;
    assert_eq!(
        stats,
        DeliveryStats {
            delivered: 7,
            failed: 0,
            skipped: 0
        }
    );

    assert_eq!(
        mailer.kinds_for("alice@example.com"),
        vec![
            NotificationKind::Deposit,
            NotificationKind::Withdrawal,
            NotificationKind::LoanRequested,
            NotificationKind::LoanApproved,
            NotificationKind::LoanPaid,
            NotificationKind::TransferSent,
        ]
    );
    assert_eq!(
        mailer.kinds_for("bob@example.com"),
        vec![NotificationKind::TransferReceived]
    );

    // The recipient's message names the sender's account
    let sent = mailer.sent.lock().unwrap();
    let (_, _, vars) = sent
        .iter()
        .find(|(to, _, _)| to == "bob@example.com")
        .unwrap();
    assert_eq!(vars["amount"], "75.00");
    assert_eq!(vars["account_no"], bob.account_no.to_string());
    assert_eq!(vars["counterparty"], alice.account_no.to_string());
    assert_eq!(vars["subject"], "Transfer Money");

    Ok(())
}

#[tokio::test]
async fn test_rejected_operations_do_not_notify() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let mailer = Arc::new(RecordingMailer::default());
    let (outbox, notifier) = spawn_notifier(mailer.clone(), Arc::new(OwnerAddressDirectory));
    let service = service.with_outbox(outbox);

    let alice = service
        .open_account("alice@example.com".to_string(), AccountType::Savings)
        .await?;
    let bob = service
        .open_account("bob@example.com".to_string(), AccountType::Savings)
        .await?;

    assert!(matches!(
        service.withdraw(alice.id, 100).await,
        Err(AppError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        service.transfer(alice.id, bob.id, 100).await,
        Err(AppError::InsufficientFunds { .. })
    ));

    drop(service);
    let stats = notifier.join().await;
    assert_eq!(stats, DeliveryStats::default());
    assert!(mailer.sent.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_delivery_failure_does_not_undo_operation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (outbox, notifier) = spawn_notifier(Arc::new(FailingMailer), Arc::new(OwnerAddressDirectory));
    let service = service.with_outbox(outbox);

    let account = service
        .open_account("alice@example.com".to_string(), AccountType::Savings)
        .await?;
    let record = service.deposit(account.id, 20_000).await?;
    assert_eq!(record.balance_after_cents, 20_000);
    assert_eq!(service.get_account(account.id).await?.balance_cents, 20_000);

    drop(service);
    let stats = notifier.join().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 0);

    Ok(())
}

#[tokio::test]
async fn test_owner_without_address_is_skipped() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let mailer = Arc::new(RecordingMailer::default());
    let (outbox, notifier) = spawn_notifier(mailer.clone(), Arc::new(OwnerAddressDirectory));
    let service = service.with_outbox(outbox);

    let account = service
        .open_account("branch-42".to_string(), AccountType::Current)
        .await?;
    service.deposit(account.id, 1_000).await?;

    drop(service);
    let stats = notifier.join().await;
    assert_eq!(stats.skipped, 1);
    assert!(mailer.sent.lock().unwrap().is_empty());

    Ok(())
}
