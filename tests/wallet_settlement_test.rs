//! Wallet-strategy atomicity against a real Postgres: the debit, the bill
//! and the promotion land together or not at all.

mod common;

use bigdecimal::BigDecimal;
use eventpass_core::db::queries;
use eventpass_core::error::AppError;
use eventpass_core::services::settlement::{
    PaymentMethodKind, PurchaseRequest, SettlementOutcome,
};

fn wallet_request(f: &common::Fixture, seat_ids: Vec<i64>) -> PurchaseRequest {
    PurchaseRequest {
        event_id: f.event_id,
        seat_ids,
        method: PaymentMethodKind::Wallet,
    }
}

#[tokio::test]
#[ignore = "requires a Postgres instance via DATABASE_URL"]
async fn mixed_category_purchase_debits_exact_total() {
    let pool = common::test_pool().await;
    let f = common::seed(&pool, 1_000_000).await;
    let s = common::default_services(&pool);

    let outcome = s
        .checkout
        .purchase(
            f.user_id,
            wallet_request(&f, vec![f.vip_seat_id, f.standard_seat_id]),
            "10.0.0.1".to_string(),
        )
        .await
        .unwrap();

    let receipt = match outcome {
        SettlementOutcome::Settled(receipt) => receipt,
        other => panic!("expected settled receipt, got {other:?}"),
    };

    // VIP 500000 + STANDARD 200000 out of 1000000.
    assert_eq!(receipt.new_wallet_balance, BigDecimal::from(300_000));
    assert_eq!(receipt.booked_ticket_ids.len(), 2);

    let bill = queries::get_bill(&pool, receipt.bill_id).await.unwrap().unwrap();
    assert_eq!(bill.total_amount, BigDecimal::from(700_000));
    assert_eq!(bill.payment_status, "PAID");
    assert_eq!(bill.payment_method, "WALLET");

    for id in &receipt.booked_ticket_ids {
        let ticket = queries::get_ticket(&pool, *id).await.unwrap().unwrap();
        assert_eq!(ticket.status, "BOOKED");
        assert_eq!(ticket.bill_id, Some(receipt.bill_id));
        assert!(ticket.qr_issued_at.is_some());
        assert!(ticket.hold_expires_at.is_none());
    }
}

#[tokio::test]
#[ignore = "requires a Postgres instance via DATABASE_URL"]
async fn insufficient_funds_leaves_zero_net_effect() {
    let pool = common::test_pool().await;
    let f = common::seed(&pool, 100_000).await;
    let s = common::default_services(&pool);

    let err = s
        .checkout
        .purchase(
            f.user_id,
            wallet_request(&f, vec![f.vip_seat_id]),
            "10.0.0.1".to_string(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds));

    // Balance untouched, no bill, no surviving rows for the attempt.
    let balance = queries::wallet_balance(&pool, f.user_id).await.unwrap().unwrap();
    assert_eq!(balance, BigDecimal::from(100_000));
    assert_eq!(common::ticket_count_for_event(&pool, f.event_id).await, 0);

    // The seat is immediately sellable again.
    let outcome = s
        .checkout
        .purchase(
            f.other_user_id,
            wallet_request(&f, vec![f.standard_seat_id]),
            "10.0.0.1".to_string(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SettlementOutcome::Settled(_)));
}

#[tokio::test]
#[ignore = "requires a Postgres instance via DATABASE_URL"]
async fn booked_seat_rejects_follow_up_purchase() {
    let pool = common::test_pool().await;
    let f = common::seed(&pool, 1_000_000).await;
    let s = common::default_services(&pool);

    s.checkout
        .purchase(
            f.user_id,
            wallet_request(&f, vec![f.vip_seat_id]),
            "10.0.0.1".to_string(),
        )
        .await
        .unwrap();

    let err = s
        .checkout
        .purchase(
            f.other_user_id,
            wallet_request(&f, vec![f.vip_seat_id]),
            "10.0.0.1".to_string(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::SeatConflict(_)));
}

#[tokio::test]
#[ignore = "requires a Postgres instance via DATABASE_URL"]
async fn checkin_advances_only_booked_tickets() {
    let pool = common::test_pool().await;
    let f = common::seed(&pool, 1_000_000).await;
    let s = common::default_services(&pool);

    let outcome = s
        .checkout
        .purchase(
            f.user_id,
            wallet_request(&f, vec![f.vip_seat_id]),
            "10.0.0.1".to_string(),
        )
        .await
        .unwrap();

    let ticket_id = match outcome {
        SettlementOutcome::Settled(receipt) => receipt.booked_ticket_ids[0],
        other => panic!("expected settled receipt, got {other:?}"),
    };

    let now = chrono::Utc::now();

    // Checkout before checkin is an out-of-order scan.
    assert_eq!(queries::checkout_ticket(&pool, ticket_id, now).await.unwrap(), 0);

    assert_eq!(queries::checkin_ticket(&pool, ticket_id, now).await.unwrap(), 1);
    // A second scan of the same ticket does nothing.
    assert_eq!(queries::checkin_ticket(&pool, ticket_id, now).await.unwrap(), 0);

    assert_eq!(queries::checkout_ticket(&pool, ticket_id, now).await.unwrap(), 1);
}
