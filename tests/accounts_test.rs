mod common;

use anyhow::Result;
use arca::application::AppError;
use arca::domain::{AccountType, MAX_AMOUNT_CENTS, TransactionType};
use common::{open_funded, test_service};
use uuid::Uuid;

#[tokio::test]
async fn test_open_account_assigns_sequential_numbers() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let first = service
        .open_account("ada@example.com".to_string(), AccountType::Savings)
        .await?;
    let second = service
        .open_account("grace@example.com".to_string(), AccountType::Current)
        .await?;

    assert_eq!(first.account_no, 1000001);
    assert_eq!(second.account_no, 1000002);
    assert_eq!(first.balance_cents, 0);

    let found = service.get_account_by_number(1000002).await?;
    assert_eq!(found.id, second.id);
    assert_eq!(found.account_type, AccountType::Current);
    assert_eq!(found.owner, "grace@example.com");

    let all = service.list_accounts().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].account_no, 1000001);

    Ok(())
}

#[tokio::test]
async fn test_open_account_requires_owner() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service
        .open_account("   ".to_string(), AccountType::Savings)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(service.list_accounts().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_account() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.get_account(missing).await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.deposit(missing, 100).await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.withdraw(missing, 100).await,
        Err(AppError::AccountNotFound(_))
    ));
    assert!(matches!(
        service.get_account_by_number(999).await,
        Err(AppError::AccountNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_deposit_records_balance_after() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "ada@example.com", 50_000).await?;

    let record = service.deposit(account.id, 20_000).await?;
    assert_eq!(record.transaction_type, TransactionType::Deposit);
    assert_eq!(record.amount_cents, 20_000);
    assert_eq!(record.balance_after_cents, 70_000);
    assert_eq!(record.sequence, 2);
    assert!(!record.approved);

    assert_eq!(service.get_account(account.id).await?.balance_cents, 70_000);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_records_negative_amount() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "ada@example.com", 10_000).await?;

    let record = service.withdraw(account.id, 2_550).await?;
    assert_eq!(record.transaction_type, TransactionType::Withdrawal);
    assert_eq!(record.amount_cents, -2_550);
    assert_eq!(record.balance_after_cents, 7_450);

    // Draining to exactly zero is allowed
    let record = service.withdraw(account.id, 7_450).await?;
    assert_eq!(record.balance_after_cents, 0);

    Ok(())
}

#[tokio::test]
async fn test_overdraft_leaves_no_trace() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "ada@example.com", 70_000).await?;

    let result = service.withdraw(account.id, 80_000).await;
    match result {
        Err(AppError::InsufficientFunds {
            account_id,
            balance,
            required,
        }) => {
            assert_eq!(account_id, account.id);
            assert_eq!(balance, 70_000);
            assert_eq!(required, 80_000);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    assert_eq!(service.get_account(account.id).await?.balance_cents, 70_000);
    let report = service.list_transactions(account.id, None).await?;
    assert_eq!(report.records.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_amounts_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "ada@example.com", 1_000).await?;

    for amount in [0, -100, MAX_AMOUNT_CENTS + 1] {
        assert!(matches!(
            service.deposit(account.id, amount).await,
            Err(AppError::InvalidAmount(_))
        ));
        assert!(matches!(
            service.withdraw(account.id, amount).await,
            Err(AppError::InvalidAmount(_))
        ));
    }

    let report = service.list_transactions(account.id, None).await?;
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.total, 1_000);

    Ok(())
}

#[tokio::test]
async fn test_deposit_withdraw_sequence_sums_up() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let account = open_funded(&service, "ada@example.com", 0).await?;

    let deposits = [10_000, 2_500, 99, 40_001];
    let withdrawals = [5_000, 99, 1];
    for amount in deposits {
        service.deposit(account.id, amount).await?;
    }
    for amount in withdrawals {
        service.withdraw(account.id, amount).await?;
    }

    let expected: i64 = deposits.iter().sum::<i64>() - withdrawals.iter().sum::<i64>();
    let account = service.get_account(account.id).await?;
    assert_eq!(account.balance_cents, expected);

    // Each record carries the running balance and a gapless sequence
    let report = service.list_transactions(account.id, None).await?;
    let mut running = 0;
    for (i, record) in report.records.iter().enumerate() {
        running += record.amount_cents;
        assert_eq!(record.balance_after_cents, running);
        assert_eq!(record.sequence, i as i64 + 1);
    }
    assert_eq!(running, expected);

    Ok(())
}

#[tokio::test]
async fn test_balance_survives_reconnect() -> Result<()> {
    let (service, temp) = test_service().await?;
    let account = open_funded(&service, "ada@example.com", 12_345).await?;
    drop(service);

    let path = temp.path().join("test.db");
    let reopened = arca::application::LedgerService::connect(
        path.to_str().unwrap(),
        Default::default(),
    )
    .await?;
    let account = reopened.get_account(account.id).await?;
    assert_eq!(account.balance_cents, 12_345);

    Ok(())
}
