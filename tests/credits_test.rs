mod common;

use common::create_test_db;
use decision_engine::services::CreditEngine;
use decision_engine::utils::CoreError;

#[tokio::test]
async fn grant_monthly_is_idempotent_per_source() {
    let pool = create_test_db().await;
    let credits = CreditEngine::new(pool.clone());

    let period_end = chrono::Utc::now() + chrono::Duration::days(30);
    credits.grant_monthly("user-1", 100, period_end, "2026-07").await.unwrap();
    credits.grant_monthly("user-1", 100, period_end, "2026-07").await.unwrap();

    let balance = credits.recalculate_effective_balance("user-1", chrono::Utc::now()).await.unwrap();
    assert_eq!(balance, 100);
}

#[tokio::test]
async fn spend_is_not_limited_to_one_per_source() {
    let pool = create_test_db().await;
    let credits = CreditEngine::new(pool.clone());

    let period_end = chrono::Utc::now() + chrono::Duration::days(30);
    credits.grant_monthly("user-1", 5, period_end, "2026-07").await.unwrap();

    credits.spend("user-1", 1, 1, "job").await.unwrap();
    credits.spend("user-1", 1, 2, "job").await.unwrap();
    credits.spend("user-1", 1, 3, "job").await.unwrap();

    let balance = credits.recalculate_effective_balance("user-1", chrono::Utc::now()).await.unwrap();
    assert_eq!(balance, 2);
}

#[tokio::test]
async fn spend_fails_closed_when_balance_insufficient() {
    let pool = create_test_db().await;
    let credits = CreditEngine::new(pool.clone());

    let period_end = chrono::Utc::now() + chrono::Duration::days(30);
    credits.grant_monthly("user-1", 1, period_end, "2026-07").await.unwrap();

    credits.spend("user-1", 1, 1, "job").await.unwrap();
    let result = credits.spend("user-1", 1, 2, "job").await;

    assert!(matches!(result, Err(CoreError::InsufficientCredits)));
    let balance = credits.recalculate_effective_balance("user-1", chrono::Utc::now()).await.unwrap();
    assert_eq!(balance, 0);
}

#[tokio::test]
async fn spend_prefers_earlier_expiring_lots_first() {
    let pool = create_test_db().await;
    let credits = CreditEngine::new(pool.clone());

    // Top-up lot expires in 1 day, monthly lot effectively "never" (30 days out).
    credits.grant_topup("user-1", 3, 1, "invoice-1").await.unwrap();
    let period_end = chrono::Utc::now() + chrono::Duration::days(30);
    credits.grant_monthly("user-1", 10, period_end, "2026-07").await.unwrap();

    credits.spend("user-1", 3, 1, "job").await.unwrap();

    let spends: Vec<(String,)> = sqlx::query_as(
        "SELECT lot_id FROM credit_ledger WHERE user_id = 'user-1' AND event_type = 'spend'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    let topup_lot: (String,) = sqlx::query_as(
        "SELECT lot_id FROM credit_ledger WHERE user_id = 'user-1' AND source = 'invoice-1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert!(spends.iter().all(|(lot,)| *lot == topup_lot.0));
}
