mod common;

use std::sync::Arc;

use anyhow::Result;
use arca::application::AppError;
use common::{open_funded, test_service};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposit_and_withdraw_converge() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let account = open_funded(&service, "ada@example.com", 1_000).await?;

    let depositor = {
        let service = service.clone();
        tokio::spawn(async move { service.deposit(account.id, 100).await })
    };
    let withdrawer = {
        let service = service.clone();
        tokio::spawn(async move { service.withdraw(account.id, 50).await })
    };
    depositor.await??;
    withdrawer.await??;

    assert_eq!(service.get_account(account.id).await?.balance_cents, 1_050);

    let report = service.list_transactions(account.id, None).await?;
    assert_eq!(report.records.len(), 3);
    let last = report.records.last().unwrap();
    assert_eq!(last.balance_after_cents, 1_050);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_deposits() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let account = open_funded(&service, "ada@example.com", 0).await?;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.deposit(account.id, 10).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.get_account(account.id).await?.balance_cents, 250);

    // Sequences are gapless and each snapshot is one step above the last
    let report = service.list_transactions(account.id, None).await?;
    for (i, record) in report.records.iter().enumerate() {
        assert_eq!(record.sequence, i as i64 + 1);
        assert_eq!(record.balance_after_cents, 10 * (i as i64 + 1));
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let account = open_funded(&service, "ada@example.com", 500).await?;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.withdraw(account.id, 100).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => rejected += 1,
            Err(other) => return Err(other.into()),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(rejected, 5);
    assert_eq!(service.get_account(account.id).await?.balance_cents, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_conserve_money() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let alice = open_funded(&service, "alice@example.com", 10_000).await?;
    let bob = open_funded(&service, "bob@example.com", 10_000).await?;

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        let (from, to) = if i % 2 == 0 {
            (alice.id, bob.id)
        } else {
            (bob.id, alice.id)
        };
        handles.push(tokio::spawn(async move {
            service.transfer(from, to, 100 + i).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let alice_after = service.get_account(alice.id).await?;
    let bob_after = service.get_account(bob.id).await?;
    assert_eq!(alice_after.balance_cents + bob_after.balance_cents, 20_000);

    let transfers = service.list_transfers(alice.id).await?;
    assert_eq!(transfers.len(), 20);
    let net: i64 = transfers.iter().map(|t| t.effect_on(alice.id)).sum();
    assert_eq!(alice_after.balance_cents, 10_000 + net);

    Ok(())
}
