//! Concurrent writers on one record resolve to exactly one winner.

use boxlane_core::{
    CodeError, CodePurpose, LifecycleError, OrderStatus, PaymentMethod, PaymentRuleError,
    PaymentStatus, ReceiptDecision,
};
use boxlane_integration_tests::{Harness, PASSWORD, png};
use boxlane_storefront::services::{AccountError, OrderError, PaymentError};
use tokio::task::JoinSet;

const CONTENDERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approvals_have_one_winner() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let other_admin = h.admin("ops2@boxlane.test").await;
    let customer = h.verified_customer("cal@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    let order_id = order.id;
    h.services
        .payments
        .upload_receipt(&customer.actor(), order_id, None, &png())
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..CONTENDERS {
        let payments = h.services.payments.clone();
        let actor = if i % 2 == 0 { admin } else { other_admin };
        let (decision, reason) = if i % 3 == 0 {
            (ReceiptDecision::Rejected, Some("blurry"))
        } else {
            (ReceiptDecision::Verified, None)
        };
        tasks.spawn(async move { payments.review(&actor, order_id, decision, reason).await });
    }

    let mut winners = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(receipt) => winners.push(receipt),
            Err(PaymentError::Rule(PaymentRuleError::NoPendingReceipt)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let winner = winners.remove(0);
    let stored = h
        .services
        .orders
        .get_order(&admin, order_id)
        .await
        .unwrap();
    let expected = match winner.decision {
        Some(ReceiptDecision::Verified) => PaymentStatus::Verified,
        Some(ReceiptDecision::Rejected) => PaymentStatus::Rejected,
        None => panic!("winning review left the receipt undecided"),
    };
    assert_eq!(stored.payment_status, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_uploads_attach_one_receipt() {
    let h = Harness::default();
    let customer = h.verified_customer("dee@boxlane.test").await;
    let product = h.product("tea-sampler", 1850).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    let order_id = order.id;
    let me = customer.actor();

    let mut tasks = JoinSet::new();
    for _ in 0..CONTENDERS {
        let payments = h.services.payments.clone();
        tasks.spawn(async move {
            payments
                .upload_receipt(&me, order_id, Some("image/png"), &png())
                .await
        });
    }

    let mut accepted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => accepted += 1,
            Err(PaymentError::Rule(PaymentRuleError::UploadInProgress)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, 1);

    let receipts = h.services.payments.receipts(&me, order_id).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(receipts.iter().all(|r| r.is_active()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_upload_never_joins_a_decided_review() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("eli@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    let order_id = order.id;
    let me = customer.actor();
    h.services
        .payments
        .upload_receipt(&me, order_id, None, &png())
        .await
        .unwrap();

    let payments = h.services.payments.clone();
    let review = tokio::spawn(async move {
        payments
            .review(&admin, order_id, ReceiptDecision::Verified, None)
            .await
    });
    let payments = h.services.payments.clone();
    let upload =
        tokio::spawn(async move { payments.upload_receipt(&me, order_id, None, &png()).await });

    review.await.unwrap().unwrap();
    match upload.await.unwrap() {
        Err(PaymentError::Rule(
            PaymentRuleError::UploadInProgress | PaymentRuleError::AlreadyVerified,
        )) => {}
        other => panic!("late upload should fail, got {other:?}"),
    }

    let receipts = h.services.payments.receipts(&me, order_id).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts.first().and_then(|r| r.decision), Some(ReceiptDecision::Verified));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_and_processing_race() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("fay@boxlane.test").await;
    let product = h.product("snack-box", 3000).await.unwrap();

    for _ in 0..CONTENDERS {
        let order = h
            .order(&customer, &product, PaymentMethod::CashOnDelivery)
            .await;
        let order_id = order.id;

        let orders = h.services.orders.clone();
        let process = tokio::spawn(async move {
            orders
                .transition(&admin, order_id, OrderStatus::Processing, None)
                .await
        });
        let orders = h.services.orders.clone();
        let owner = customer.actor();
        let cancel = tokio::spawn(async move { orders.cancel(&owner, order_id).await });

        let processed = process.await.unwrap();
        let cancelled = cancel.await.unwrap();
        let stored = h
            .services
            .orders
            .get_order(&admin, order_id)
            .await
            .unwrap();

        match (processed, cancelled) {
            (Ok(_), Err(OrderError::Lifecycle(LifecycleError::IllegalTransition { .. }))) => {
                assert_eq!(stored.status, OrderStatus::Processing);
            }
            (Err(OrderError::Lifecycle(LifecycleError::IllegalTransition { .. })), Ok(_)) => {
                assert_eq!(stored.status, OrderStatus::Cancelled);
            }
            other => panic!("expected exactly one winner, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_resends_issue_one_code() {
    let h = Harness::default();
    h.services
        .accounts
        .register("gil@boxlane.test", PASSWORD)
        .await
        .unwrap();
    h.clock.advance(60);

    let mut tasks = JoinSet::new();
    for _ in 0..CONTENDERS {
        let accounts = h.services.accounts.clone();
        tasks.spawn(async move { accounts.resend_verification("gil@boxlane.test").await });
    }

    let mut issued = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(()) => issued += 1,
            Err(AccountError::Code(CodeError::Cooldown { .. })) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(issued, 1);
    assert_eq!(h.outbox.len(), 2);

    let code = h
        .outbox
        .last_code("gil@boxlane.test", CodePurpose::Registration)
        .unwrap();
    h.services
        .accounts
        .verify("gil@boxlane.test", &code)
        .await
        .unwrap();
}
