//! Order lifecycle transitions, including the cash-on-delivery path.

use boxlane_core::{
    Actor, LifecycleError, OrderStatus, PaymentMethod, PaymentStatus,
};
use boxlane_integration_tests::Harness;
use boxlane_storefront::services::OrderError;

fn lifecycle_error<T: std::fmt::Debug>(result: Result<T, OrderError>) -> LifecycleError {
    match result {
        Err(OrderError::Lifecycle(e)) => e,
        other => panic!("expected a lifecycle error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cash_on_delivery_verified_on_delivery() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("kim@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();

    let order = h
        .order(&customer, &product, PaymentMethod::CashOnDelivery)
        .await;
    assert_eq!(order.status, OrderStatus::Placed);
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let orders = &h.services.orders;
    let order = orders
        .transition(&admin, order.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let order = orders
        .transition(&admin, order.id, OrderStatus::Shipped, Some(" TRK-001 "))
        .await
        .unwrap();
    assert_eq!(order.tracking_reference.as_deref(), Some("TRK-001"));
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let order = orders
        .transition(&admin, order.id, OrderStatus::Delivered, None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(order.payment_status, PaymentStatus::Verified);

    let stored = orders.get_order(&admin, order.id).await.unwrap();
    assert_eq!(stored, order);
}

#[tokio::test]
async fn test_illegal_requests_leave_order_untouched() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("lee@boxlane.test").await;
    let product = h.product("tea-sampler", 1850).await.unwrap();
    let order = h
        .order(&customer, &product, PaymentMethod::CashOnDelivery)
        .await;
    let orders = &h.services.orders;

    // Skipping an edge
    let err = lifecycle_error(
        orders
            .transition(&admin, order.id, OrderStatus::Delivered, None)
            .await,
    );
    assert_eq!(
        err,
        LifecycleError::IllegalTransition {
            from: OrderStatus::Placed,
            to: OrderStatus::Delivered
        }
    );

    orders
        .transition(&admin, order.id, OrderStatus::Processing, None)
        .await
        .unwrap();

    // Going backward
    let err = lifecycle_error(
        orders
            .transition(&admin, order.id, OrderStatus::Placed, None)
            .await,
    );
    assert!(matches!(err, LifecycleError::IllegalTransition { .. }));

    // Shipping without a tracking reference
    let err = lifecycle_error(
        orders
            .transition(&admin, order.id, OrderStatus::Shipped, Some("   "))
            .await,
    );
    assert_eq!(err, LifecycleError::TrackingReferenceRequired);

    let stored = orders.get_order(&admin, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.tracking_reference, None);
}

#[tokio::test]
async fn test_repeating_current_status_is_a_no_op() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("max@boxlane.test").await;
    let product = h.product("snack-box", 3000).await.unwrap();
    let order = h
        .order(&customer, &product, PaymentMethod::CashOnDelivery)
        .await;

    let first = h
        .services
        .orders
        .transition(&admin, order.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    h.clock.advance(5);
    let again = h
        .services
        .orders
        .transition(&admin, order.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(again.updated_at, first.updated_at);
}

#[tokio::test]
async fn test_bank_transfer_needs_verified_payment() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let customer = h.verified_customer("ned@boxlane.test").await;
    let product = h.product("coffee-monthly", 2400).await.unwrap();
    let order = h.order(&customer, &product, PaymentMethod::BankTransfer).await;

    for actor in [admin, Actor::System] {
        let err = lifecycle_error(
            h.services
                .orders
                .transition(&actor, order.id, OrderStatus::Processing, None)
                .await,
        );
        assert_eq!(err, LifecycleError::PaymentNotVerified);
    }
}

#[tokio::test]
async fn test_customer_cancellation_rules() {
    let h = Harness::default();
    let admin = h.admin("ops@boxlane.test").await;
    let owner = h.verified_customer("oz@boxlane.test").await;
    let stranger = h.verified_customer("pat@boxlane.test").await;
    let product = h.product("tea-sampler", 1850).await.unwrap();
    let orders = &h.services.orders;

    let first = h.order(&owner, &product, PaymentMethod::CashOnDelivery).await;
    let second = h.order(&owner, &product, PaymentMethod::CashOnDelivery).await;

    // Someone else's order
    let err = lifecycle_error(orders.cancel(&stranger.actor(), first.id).await);
    assert_eq!(err, LifecycleError::NotOwner);
    assert!(matches!(
        orders.get_order(&stranger.actor(), first.id).await,
        Err(OrderError::OrderNotFound)
    ));

    // Customers never set other statuses
    let err = lifecycle_error(
        orders
            .transition(&owner.actor(), first.id, OrderStatus::Processing, None)
            .await,
    );
    assert_eq!(err, LifecycleError::Forbidden);

    let cancelled = orders.cancel(&owner.actor(), first.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Once processing, only an admin may cancel
    orders
        .transition(&admin, second.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    let err = lifecycle_error(orders.cancel(&owner.actor(), second.id).await);
    assert!(matches!(err, LifecycleError::IllegalTransition { .. }));
    orders.cancel(&admin, second.id).await.unwrap();

    let listed = orders.list_orders(&owner.actor()).await.unwrap();
    assert_eq!(
        listed.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    assert!(listed.iter().all(|o| o.status == OrderStatus::Cancelled));
}

#[tokio::test]
async fn test_system_only_moves_to_processing() {
    let h = Harness::default();
    let customer = h.verified_customer("quinn@boxlane.test").await;
    let product = h.product("snack-box", 3000).await.unwrap();
    let order = h
        .order(&customer, &product, PaymentMethod::CashOnDelivery)
        .await;

    let err = lifecycle_error(h.services.orders.cancel(&Actor::System, order.id).await);
    assert_eq!(err, LifecycleError::Forbidden);

    let order = h
        .services
        .orders
        .transition(&Actor::System, order.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}
