//! Boundary logic that needs no database: payload normalization for both
//! gateways, signature verification and the transition decision table.

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;

use coursepay::models::{
    AttemptStatus, GatewayPaymentAttempt, Provider, ProviderMethod, Tier,
};
use coursepay::reconcile::{
    normalize_card_payload, normalize_voucher_payload, plan_transition, sign_body,
    verify_signature, ProviderReport, ReconcileAction, ReportedOutcome,
};

fn report(outcome: ReportedOutcome) -> ProviderReport {
    ProviderReport {
        merchant_order_id: "8f14e45f-ceea-4e67-8d9a-265f2f6d4c11".to_string(),
        outcome,
        amount: dec!(100.00),
        currency: "EGP".to_string(),
        provider_reference: Some("tx-900".to_string()),
    }
}

fn attempt(status: AttemptStatus) -> GatewayPaymentAttempt {
    let now = Utc::now();
    GatewayPaymentAttempt {
        id: 41,
        student_id: 7,
        content_group_id: "algebra-101".to_string(),
        tier: Tier::Standard,
        amount: dec!(100.00),
        currency: "EGP".to_string(),
        provider: Provider::CardGateway,
        provider_method: ProviderMethod::Card,
        merchant_order_id: "8f14e45f-ceea-4e67-8d9a-265f2f6d4c11".to_string(),
        provider_reference: None,
        status,
        expires_at: None,
        webhook_received_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn normalize_card_success_example() {
    let body = json!({
        "merchantOrderId": "8f14e45f-ceea-4e67-8d9a-265f2f6d4c11",
        "status": "succeeded",
        "amount": "100.00",
        "currency": "EGP",
        "transactionId": "tx-900"
    })
    .to_string();

    let report = normalize_card_payload(body.as_bytes()).expect("normalize");
    assert_eq!(
        report.merchant_order_id,
        "8f14e45f-ceea-4e67-8d9a-265f2f6d4c11"
    );
    assert_eq!(report.outcome, ReportedOutcome::Succeeded);
    assert_eq!(report.amount, dec!(100.00));
    assert_eq!(report.currency, "EGP");
    assert_eq!(report.provider_reference.as_deref(), Some("tx-900"));
}

#[test]
fn normalize_card_accepts_order_id_alias_and_status_synonyms() {
    let body = json!({
        "orderId": "abc",
        "status": "paid",
        "amount": "9.99",
        "currency": "EGP"
    })
    .to_string();

    let report = normalize_card_payload(body.as_bytes()).expect("normalize");
    assert_eq!(report.merchant_order_id, "abc");
    assert_eq!(report.outcome, ReportedOutcome::Succeeded);
    assert_eq!(report.provider_reference, None);
}

#[test]
fn normalize_card_unknown_status_is_unrecognized() {
    let body = json!({
        "merchantOrderId": "abc",
        "status": "authorized",
        "amount": "9.99",
        "currency": "EGP"
    })
    .to_string();

    let report = normalize_card_payload(body.as_bytes()).expect("normalize");
    assert_eq!(report.outcome, ReportedOutcome::Unrecognized);
}

#[test]
fn normalize_card_rejects_malformed_body() {
    assert!(normalize_card_payload(b"not json at all").is_err());
    // missing amount
    let body = json!({ "merchantOrderId": "abc", "status": "paid" }).to_string();
    assert!(normalize_card_payload(body.as_bytes()).is_err());
    // unparseable amount
    let body = json!({
        "merchantOrderId": "abc",
        "status": "paid",
        "amount": "a lot",
        "currency": "EGP"
    })
    .to_string();
    assert!(normalize_card_payload(body.as_bytes()).is_err());
}

#[test]
fn normalize_voucher_paid_example() {
    let body = json!({
        "event": "voucher.paid",
        "order": {
            "merchant_ref": "voucher-41",
            "store_receipt": "store-777"
        },
        "paid_amount": "250.00",
        "currency_code": "EGP"
    })
    .to_string();

    let report = normalize_voucher_payload(body.as_bytes()).expect("normalize");
    assert_eq!(report.merchant_order_id, "voucher-41");
    assert_eq!(report.outcome, ReportedOutcome::Succeeded);
    assert_eq!(report.amount, dec!(250.00));
    assert_eq!(report.provider_reference.as_deref(), Some("store-777"));
}

#[test]
fn normalize_voucher_expiry_reports_as_failure() {
    let body = json!({
        "event": "voucher.expired",
        "order": { "merchant_ref": "voucher-41" },
        "paid_amount": "0.00",
        "currency_code": "EGP"
    })
    .to_string();

    let report = normalize_voucher_payload(body.as_bytes()).expect("normalize");
    assert_eq!(report.outcome, ReportedOutcome::Failed);
}

#[test]
fn signature_round_trip_and_rejections() {
    let body = br#"{"merchantOrderId":"abc"}"#;
    let signature = sign_body("secret-a", body);

    assert!(verify_signature("secret-a", body, &signature));
    assert!(verify_signature("secret-a", body, &format!("  {signature} ")));
    assert!(!verify_signature("secret-b", body, &signature));
    assert!(!verify_signature("secret-a", b"tampered body", &signature));
    assert!(!verify_signature("secret-a", body, "zz-not-hex"));
    assert!(!verify_signature("secret-a", body, ""));
}

#[test]
fn pending_success_with_matching_numbers_is_paid() {
    let action = plan_transition(
        &attempt(AttemptStatus::Pending),
        &report(ReportedOutcome::Succeeded),
    );
    assert_eq!(action, ReconcileAction::MarkPaid);
}

#[test]
fn amount_equality_ignores_decimal_scale() {
    let mut success = report(ReportedOutcome::Succeeded);
    success.amount = dec!(100);
    let action = plan_transition(&attempt(AttemptStatus::Pending), &success);
    assert_eq!(action, ReconcileAction::MarkPaid);
}

#[test]
fn tampered_amount_never_reaches_paid() {
    let mut forged = report(ReportedOutcome::Succeeded);
    forged.amount = dec!(50.00);
    let action = plan_transition(&attempt(AttemptStatus::Pending), &forged);
    assert_eq!(action, ReconcileAction::MismatchFailed);
}

#[test]
fn wrong_currency_is_a_mismatch_but_case_is_not() {
    let mut lowercase = report(ReportedOutcome::Succeeded);
    lowercase.currency = "egp".to_string();
    assert_eq!(
        plan_transition(&attempt(AttemptStatus::Pending), &lowercase),
        ReconcileAction::MarkPaid
    );

    let mut wrong = report(ReportedOutcome::Succeeded);
    wrong.currency = "USD".to_string();
    assert_eq!(
        plan_transition(&attempt(AttemptStatus::Pending), &wrong),
        ReconcileAction::MismatchFailed
    );
}

#[test]
fn pending_failure_marks_failed() {
    let action = plan_transition(
        &attempt(AttemptStatus::Pending),
        &report(ReportedOutcome::Failed),
    );
    assert_eq!(action, ReconcileAction::MarkFailed);
}

#[test]
fn unrecognized_outcome_is_ignored() {
    let action = plan_transition(
        &attempt(AttemptStatus::Pending),
        &report(ReportedOutcome::Unrecognized),
    );
    assert_eq!(action, ReconcileAction::Ignore);
}

#[test]
fn terminal_states_absorb_replays() {
    for status in [
        AttemptStatus::Paid,
        AttemptStatus::Failed,
        AttemptStatus::Expired,
        AttemptStatus::Cancelled,
    ] {
        let action = plan_transition(&attempt(status), &report(ReportedOutcome::Succeeded));
        assert_eq!(
            action,
            ReconcileAction::ReplayTerminal {
                backfill_reference: Some("tx-900".to_string())
            },
            "replay on {status:?}"
        );
    }

    // a divergent replay payload still cannot reopen the attempt
    let mut forged = report(ReportedOutcome::Succeeded);
    forged.amount = dec!(1.00);
    let action = plan_transition(&attempt(AttemptStatus::Paid), &forged);
    assert!(matches!(action, ReconcileAction::ReplayTerminal { .. }));
}

#[test]
fn replay_backfills_reference_only_when_absent() {
    let mut settled = attempt(AttemptStatus::Paid);
    settled.provider_reference = Some("tx-1".to_string());
    let action = plan_transition(&settled, &report(ReportedOutcome::Succeeded));
    assert_eq!(
        action,
        ReconcileAction::ReplayTerminal {
            backfill_reference: None
        }
    );

    let mut silent = report(ReportedOutcome::Succeeded);
    silent.provider_reference = None;
    let action = plan_transition(&attempt(AttemptStatus::Paid), &silent);
    assert_eq!(
        action,
        ReconcileAction::ReplayTerminal {
            backfill_reference: None
        }
    );
}
