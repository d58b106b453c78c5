//! Receipt upload and admin review, end to end.

use boxlane_core::{
    OrderStatus, PaymentMethod, PaymentRuleError, PaymentStatus, ReceiptDecision, UploadError,
};
use boxlane_integration_tests::{Harness, MAX_RECEIPT_BYTES, jpeg, png};
use boxlane_storefront::services::PaymentError;

fn rule_error<T: std::fmt::Debug>(result: Result<T, PaymentError>) -> PaymentRuleError {
    match result {
        Err(PaymentError::Rule(e)) => e,
        other => panic!("expected a payment rule error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reject_reupload_approve_then_process() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("rae@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let payments = &h.services.payments;
    let orders = &h.services.orders;
    let me = customer.actor();

    let first = payments
        .upload_receipt(&me, order.id, Some("image/png"), &png())
        .await
        .unwrap();
    assert!(first.is_active());
    let current = orders.get_order(&me, order.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::AwaitingVerification);

    h.clock.advance(60);
    let rejected = payments
        .review(&admin, order.id, ReceiptDecision::Rejected, Some(" illegible "))
        .await
        .unwrap();
    assert_eq!(rejected.id, first.id);
    assert_eq!(rejected.decision, Some(ReceiptDecision::Rejected));
    assert_eq!(rejected.rejection_reason.as_deref(), Some("illegible"));
    let current = orders.get_order(&me, order.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Rejected);

    h.clock.advance(60);
    let second = payments
        .upload_receipt(&me, order.id, Some("image/jpeg"), &jpeg())
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.decision, None);
    assert_eq!(second.reviewer_id, None);
    let current = orders.get_order(&me, order.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::AwaitingVerification);

    let approved = payments
        .review(&admin, order.id, ReceiptDecision::Verified, None)
        .await
        .unwrap();
    assert_eq!(approved.id, second.id);
    assert_eq!(approved.reviewer_id, admin.account_id());

    let processing = orders
        .transition(&admin, order.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(processing.status, OrderStatus::Processing);
    assert_eq!(processing.payment_status, PaymentStatus::Verified);

    let err = rule_error(
        payments
            .review(&admin, order.id, ReceiptDecision::Verified, None)
            .await,
    );
    assert_eq!(err, PaymentRuleError::NoPendingReceipt);

    // Both receipts are kept, oldest first, and only the approved one counts
    let history = payments.receipts(&me, order.id).await.unwrap();
    assert_eq!(
        history.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    assert!(history.iter().all(|r| !r.is_active()));
}

#[tokio::test]
async fn test_one_active_receipt_at_a_time() {
    let h = Harness::default();
    let customer = h.verified_customer("sam@boxlane.test").await;
    let product = h.product("tea-sampler", 1850).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    let me = customer.actor();

    h.services
        .payments
        .upload_receipt(&me, order.id, Some("image/png"), &png())
        .await
        .unwrap();
    let err = rule_error(
        h.services
            .payments
            .upload_receipt(&me, order.id, Some("image/png"), &png())
            .await,
    );
    assert_eq!(err, PaymentRuleError::UploadInProgress);

    let history = h.services.payments.receipts(&me, order.id).await.unwrap();
    assert_eq!(history.iter().filter(|r| r.is_active()).count(), 1);
}

#[tokio::test]
async fn test_no_upload_after_approval() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("tia@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    let me = customer.actor();
    let payments = &h.services.payments;

    payments
        .upload_receipt(&me, order.id, None, &png())
        .await
        .unwrap();
    payments
        .review(&admin, order.id, ReceiptDecision::Verified, None)
        .await
        .unwrap();

    let err = rule_error(payments.upload_receipt(&me, order.id, None, &png()).await);
    assert_eq!(err, PaymentRuleError::AlreadyVerified);

    let current = h.services.orders.get_order(&me, order.id).await.unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Verified);
}

#[tokio::test]
async fn test_upload_guards() {
    let h = Harness::default();
    let owner = h.verified_customer("uma@boxlane.test").await;
    let stranger = h.verified_customer("vic@boxlane.test").await;
    let product = h.product("snack-box", 3000).await.unwrap();
    let payments = &h.services.payments;

    let cod = h.order(&owner, &product, PaymentMethod::CashOnDelivery).await;
    let err = rule_error(
        payments
            .upload_receipt(&owner.actor(), cod.id, None, &png())
            .await,
    );
    assert_eq!(err, PaymentRuleError::WrongPaymentMethod);

    let order = h.order(&owner, &product, PaymentMethod::BankTransfer).await;
    assert!(matches!(
        payments
            .upload_receipt(&stranger.actor(), order.id, None, &png())
            .await,
        Err(PaymentError::NotOwner)
    ));

    // File checks
    assert!(matches!(
        payments
            .upload_receipt(&owner.actor(), order.id, Some("image/jpeg"), &png())
            .await,
        Err(PaymentError::Upload(UploadError::InvalidFileType))
    ));
    assert!(matches!(
        payments
            .upload_receipt(&owner.actor(), order.id, Some("application/pdf"), b"%PDF-1.7")
            .await,
        Err(PaymentError::Upload(UploadError::InvalidFileType))
    ));
    let mut huge = png();
    huge.resize(MAX_RECEIPT_BYTES + 1, 0);
    assert!(matches!(
        payments
            .upload_receipt(&owner.actor(), order.id, Some("image/png"), &huge)
            .await,
        Err(PaymentError::Upload(UploadError::FileTooLarge { .. }))
    ));
    assert_eq!(h.blobs.writes(), 0);

    h.services
        .orders
        .cancel(&owner.actor(), order.id)
        .await
        .unwrap();
    let err = rule_error(
        payments
            .upload_receipt(&owner.actor(), order.id, None, &png())
            .await,
    );
    assert_eq!(err, PaymentRuleError::OrderCancelled);
}

#[tokio::test]
async fn test_review_guards() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("wes@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;
    let payments = &h.services.payments;

    let err = rule_error(
        payments
            .review(&admin, order.id, ReceiptDecision::Verified, None)
            .await,
    );
    assert_eq!(err, PaymentRuleError::NoPendingReceipt);

    payments
        .upload_receipt(&customer.actor(), order.id, None, &png())
        .await
        .unwrap();

    let err = rule_error(
        payments
            .review(&customer.actor(), order.id, ReceiptDecision::Verified, None)
            .await,
    );
    assert_eq!(err, PaymentRuleError::Forbidden);

    let err = rule_error(
        payments
            .review(&admin, order.id, ReceiptDecision::Rejected, Some("  "))
            .await,
    );
    assert_eq!(err, PaymentRuleError::ReasonRequired);

    let queue = payments.pending_reviews(&admin).await.unwrap();
    assert_eq!(queue.iter().map(|o| o.id).collect::<Vec<_>>(), vec![order.id]);
    assert!(matches!(
        payments.pending_reviews(&customer.actor()).await,
        Err(PaymentError::Rule(PaymentRuleError::Forbidden))
    ));
}
