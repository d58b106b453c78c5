//! Verification codes and the account gate, end to end.

use boxlane_core::{CodeError, CodePolicy, CodePurpose, VerificationState};
use boxlane_integration_tests::{Harness, PASSWORD};
use boxlane_storefront::services::AccountError;

fn other_code(code: &str) -> String {
    let wrong = if code == "000000" { "111111" } else { "000000" };
    wrong.to_owned()
}

fn code_error(result: Result<impl std::fmt::Debug, AccountError>) -> CodeError {
    match result {
        Err(AccountError::Code(e)) => e,
        other => panic!("expected a code error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_guesses_lock_the_code() {
    let h = Harness::default();
    let accounts = &h.services.accounts;
    accounts.register("ann@boxlane.test", PASSWORD).await.unwrap();
    let code = h
        .outbox
        .last_code("ann@boxlane.test", CodePurpose::Registration)
        .unwrap();
    let wrong = other_code(&code);

    for _ in 0..3 {
        let err = code_error(accounts.verify("ann@boxlane.test", &wrong).await);
        assert_eq!(err, CodeError::InvalidCode);
    }

    let err = code_error(accounts.verify("ann@boxlane.test", &code).await);
    assert_eq!(err, CodeError::AttemptsExceeded);

    // Still unverified, so login keeps asking for verification
    assert!(matches!(
        accounts.login("ann@boxlane.test", PASSWORD).await,
        Err(AccountError::VerificationRequired)
    ));
}

#[tokio::test]
async fn test_cooldown_then_reissue_supersedes_old_code() {
    let h = Harness::default();
    let accounts = &h.services.accounts;
    accounts.register("bo@boxlane.test", PASSWORD).await.unwrap();
    let first = h
        .outbox
        .last_code("bo@boxlane.test", CodePurpose::Registration)
        .unwrap();

    h.clock.advance(20);
    let err = code_error(accounts.resend_verification("bo@boxlane.test").await);
    assert_eq!(
        err,
        CodeError::Cooldown {
            retry_after_seconds: 40
        }
    );
    assert_eq!(h.outbox.len(), 1);

    h.clock.advance(40);
    accounts.resend_verification("bo@boxlane.test").await.unwrap();
    assert_eq!(h.outbox.len(), 2);
    let second = h
        .outbox
        .last_code("bo@boxlane.test", CodePurpose::Registration)
        .unwrap();

    if first != second {
        let err = code_error(accounts.verify("bo@boxlane.test", &first).await);
        assert_eq!(err, CodeError::InvalidCode);
    }

    let account = accounts.verify("bo@boxlane.test", &second).await.unwrap();
    assert_eq!(account.verification_state, VerificationState::Verified);
}

#[tokio::test]
async fn test_code_expires_after_ttl() {
    let h = Harness::new(CodePolicy::from_seconds(300, 60, 3));
    let accounts = &h.services.accounts;
    accounts.register("cy@boxlane.test", PASSWORD).await.unwrap();
    let code = h
        .outbox
        .last_code("cy@boxlane.test", CodePurpose::Registration)
        .unwrap();

    h.clock.advance(300);
    let err = code_error(accounts.verify("cy@boxlane.test", &code).await);
    assert_eq!(err, CodeError::Expired);
}

#[tokio::test]
async fn test_consumed_code_cannot_be_replayed() {
    let h = Harness::default();
    let account = h.verified_customer("di@boxlane.test").await;
    assert!(account.is_verified());

    h.services
        .accounts
        .request_password_reset("di@boxlane.test")
        .await
        .unwrap();
    let code = h
        .outbox
        .last_code("di@boxlane.test", CodePurpose::PasswordReset)
        .unwrap();

    h.services
        .accounts
        .reset_password("di@boxlane.test", &code, "a much better password")
        .await
        .unwrap();
    let err = code_error(
        h.services
            .accounts
            .reset_password("di@boxlane.test", &code, "yet another password")
            .await,
    );
    assert_eq!(err, CodeError::InvalidCode);
}

#[tokio::test]
async fn test_login_on_unverified_account_sends_a_code() {
    let h = Harness::default();
    let accounts = &h.services.accounts;
    accounts.register("ed@boxlane.test", PASSWORD).await.unwrap();
    assert_eq!(h.outbox.len(), 1);

    // Inside the cooldown: still rejected, no second code
    assert!(matches!(
        accounts.login("ed@boxlane.test", PASSWORD).await,
        Err(AccountError::VerificationRequired)
    ));
    assert_eq!(h.outbox.len(), 1);

    h.clock.advance(60);
    assert!(matches!(
        accounts.login("ed@boxlane.test", PASSWORD).await,
        Err(AccountError::VerificationRequired)
    ));
    assert_eq!(h.outbox.len(), 2);

    let code = h
        .outbox
        .last_code("ed@boxlane.test", CodePurpose::Registration)
        .unwrap();
    accounts.verify("ed@boxlane.test", &code).await.unwrap();
    let account = accounts.login("ed@boxlane.test", PASSWORD).await.unwrap();
    assert!(account.is_verified());
}

#[tokio::test]
async fn test_password_reset_keeps_verification_state() {
    let h = Harness::default();
    let accounts = &h.services.accounts;
    accounts.register("flo@boxlane.test", PASSWORD).await.unwrap();

    // Reset works on an unverified account but does not verify it
    accounts
        .request_password_reset("flo@boxlane.test")
        .await
        .unwrap();
    let code = h
        .outbox
        .last_code("flo@boxlane.test", CodePurpose::PasswordReset)
        .unwrap();
    accounts
        .reset_password("flo@boxlane.test", &code, "new password 123")
        .await
        .unwrap();

    assert!(matches!(
        accounts.login("flo@boxlane.test", PASSWORD).await,
        Err(AccountError::InvalidCredentials)
    ));
    assert!(matches!(
        accounts.login("flo@boxlane.test", "new password 123").await,
        Err(AccountError::VerificationRequired)
    ));
}

#[tokio::test]
async fn test_credential_failures_are_generic() {
    let h = Harness::default();
    h.verified_customer("gus@boxlane.test").await;
    let accounts = &h.services.accounts;

    let unknown = accounts.login("nobody@boxlane.test", PASSWORD).await;
    let wrong = accounts.login("gus@boxlane.test", "not the password").await;
    assert!(matches!(unknown, Err(AccountError::InvalidCredentials)));
    assert!(matches!(wrong, Err(AccountError::InvalidCredentials)));

    // Unknown emails are silent on resend and reset
    accounts
        .resend_verification("nobody@boxlane.test")
        .await
        .unwrap();
    accounts
        .request_password_reset("nobody@boxlane.test")
        .await
        .unwrap();
    assert!(matches!(
        accounts.verify("nobody@boxlane.test", "123456").await,
        Err(AccountError::Code(CodeError::InvalidCode))
    ));
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let h = Harness::default();
    let accounts = &h.services.accounts;
    accounts.register("hal@boxlane.test", PASSWORD).await.unwrap();
    assert!(matches!(
        accounts.register("  HAL@boxlane.test ", PASSWORD).await,
        Err(AccountError::AccountAlreadyExists)
    ));
    assert!(matches!(
        accounts.register("ivy@boxlane.test", "short").await,
        Err(AccountError::WeakPassword(_))
    ));
}

#[tokio::test]
async fn test_purposes_are_independent() {
    let h = Harness::default();
    h.verified_customer("jo@boxlane.test").await;
    let accounts = &h.services.accounts;

    // A registration code was just issued; reset is a different pair
    accounts
        .request_password_reset("jo@boxlane.test")
        .await
        .unwrap();
    assert!(
        h.outbox
            .last_code("jo@boxlane.test", CodePurpose::PasswordReset)
            .is_some()
    );
}
