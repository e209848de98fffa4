mod common;

use axum::http::{HeaderMap, HeaderValue};
use common::{harness, owner, stranger, Harness};
use payments_aggregator::domain::payment::{
    InitiatePaymentRequest, PaymentStatus, RedirectUrls, RefundRequest,
};
use payments_aggregator::domain::transaction::DeliveryChannel;
use payments_aggregator::error::PaymentError;
use payments_aggregator::gateways::payu::{response_hash, HashFields};
use payments_aggregator::gateways::registry::GatewayRegistry;
use payments_aggregator::gateways::signature::{hmac_sha256_base64, hmac_sha256_hex};
use payments_aggregator::gateways::{CallbackPayload, CompletionAction};
use payments_aggregator::repo::store::TransactionStore;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

fn initiate_request(h: &Harness, gateway: &str, amount: i64) -> InitiatePaymentRequest {
    InitiatePaymentRequest {
        gateway: gateway.to_string(),
        amount: Some(Decimal::new(amount, 0)),
        currency: None,
        customer: common::customer(),
        redirect: RedirectUrls::default(),
        meta: None,
        project_id: Some(h.project.id),
    }
}

async fn mock_razorpay_order(server: &mut mockito::ServerGuard, order_id: &str) -> mockito::Mock {
    server
        .mock("POST", "/v1/orders")
        .match_header("authorization", mockito::Matcher::Regex("^Basic ".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": order_id, "amount": 10000, "currency": "INR", "status": "created"}).to_string())
        .create_async()
        .await
}

fn checkout_callback(order_id: &str, payment_id: &str, secret: &str) -> CallbackPayload {
    let signature = hmac_sha256_hex(secret, format!("{order_id}|{payment_id}").as_bytes());
    CallbackPayload::from_fields(json!({
        "razorpay_order_id": order_id,
        "razorpay_payment_id": payment_id,
        "razorpay_signature": signature,
    }))
}

fn razorpay_webhook(order_id: &str, payment_id: &str, status: &str) -> CallbackPayload {
    let raw = json!({
        "event": format!("payment.{status}"),
        "payload": {"payment": {"entity": {
            "id": payment_id,
            "order_id": order_id,
            "status": status,
            "amount": 10000
        }}}
    })
    .to_string()
    .into_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-razorpay-signature",
        HeaderValue::from_str(&hmac_sha256_hex(common::RAZORPAY_WEBHOOK_SECRET, &raw)).unwrap(),
    );
    CallbackPayload {
        fields: serde_json::from_slice(&raw).unwrap(),
        raw_body: raw,
        headers,
    }
}

#[tokio::test]
async fn unsupported_gateway_is_rejected_without_a_ledger_row() {
    let h = harness("http://127.0.0.1:9").await;
    let err = h
        .service
        .initiate(&owner(), initiate_request(&h, "acme", 100))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Validation(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn razorpay_initiate_creates_pending_row_with_order_id() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_razorpay_order(&mut server, "order_TEST1").await;
    let h = harness(&server.url()).await;

    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    assert_eq!(resp.gateway_order_id, "order_TEST1");
    assert_eq!(resp.status, PaymentStatus::Pending);
    let CompletionAction::Popup { order_id, amount_minor, key, .. } = &resp.action else {
        panic!("expected popup parameters");
    };
    assert_eq!(order_id, "order_TEST1");
    assert_eq!(*amount_minor, 10000);
    assert_eq!(key, "rzp_test_key");

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Pending);
    assert_eq!(row.gateway_order_id.as_deref(), Some("order_TEST1"));
    assert_eq!(row.transaction_id, Some(row.id.to_string()));
}

#[tokio::test]
async fn upstream_failure_marks_row_failed() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/orders")
        .with_status(500)
        .with_body(r#"{"error":{"description":"gateway down"}}"#)
        .create_async()
        .await;
    let h = harness(&server.url()).await;

    let err = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Upstream(ref m) if m == "gateway down"));

    let rows = h.store.list(None, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PaymentStatus::Failed);
    assert_eq!(rows[0].failure_reason.as_deref(), Some("gateway down"));
}

#[tokio::test]
async fn sub_cent_amount_is_rejected_without_a_ledger_row() {
    let h = harness("http://127.0.0.1:9").await;
    let mut req = initiate_request(&h, "razorpay", 0);
    req.amount = Some(Decimal::new(1, 3));

    let err = h.service.initiate(&owner(), req).await.unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn unreachable_gateway_marks_row_failed() {
    let h = harness("http://127.0.0.1:9").await;
    let err = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Upstream(ref m) if m.ends_with("request failed")));

    let rows = h.store.list(None, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PaymentStatus::Failed);
    assert!(rows[0].failure_reason.is_some());
}

#[tokio::test]
async fn slow_gateway_times_out_and_marks_row_failed() {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut h = harness(&format!("http://{addr}")).await;
    h.service.registry =
        GatewayRegistry::with_default_adapters(reqwest::Client::new(), Duration::from_millis(200));

    let err = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Upstream(ref m) if m.ends_with("request timed out")));

    let rows = h.store.list(None, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn non_owner_cannot_initiate_on_project() {
    let h = harness("http://127.0.0.1:9").await;
    let err = h
        .service
        .initiate(&stranger(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Forbidden(_)));
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn invalid_phone_is_rejected_before_any_write() {
    let h = harness("http://127.0.0.1:9").await;
    let mut req = initiate_request(&h, "cashfree", 100);
    req.customer.phone = Some("12345".to_string());
    let err = h.service.initiate(&owner(), req).await.unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn valid_checkout_signature_marks_row_paid() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_razorpay_order(&mut server, "order_C").await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    let report = h
        .service
        .reconcile(
            "razorpay",
            checkout_callback("order_C", "pay_C", common::RAZORPAY_SECRET),
            DeliveryChannel::Callback,
        )
        .await;
    let outcome = report.result.as_ref().unwrap();
    assert_eq!(outcome.status, PaymentStatus::Paid);
    assert!(outcome.applied);

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Paid);
    assert_eq!(row.gateway_payment_id.as_deref(), Some("pay_C"));
    assert!(row.verified_at.is_some());
    assert!(row.callback_payload.is_some());

    let location = report.redirect_location("http://localhost:5173");
    assert!(location.starts_with("https://shop.example.com/paid?"));
    assert!(location.contains(&format!("txnid={}", row.id)));
    assert!(location.contains("status=paid"));
}

#[tokio::test]
async fn wrong_signature_leaves_row_pending() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_razorpay_order(&mut server, "order_D").await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    let report = h
        .service
        .reconcile(
            "razorpay",
            checkout_callback("order_D", "pay_D", "not-the-secret"),
            DeliveryChannel::Callback,
        )
        .await;
    assert!(matches!(report.result, Err(PaymentError::InvalidSignature(_))));

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Pending);
    assert!(row.gateway_payment_id.is_none());
    assert!(row.verified_at.is_none());
    assert!(row.callback_payload.is_none());

    let logs = h.store.gateway_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "verify");
    assert!(!logs[0].ok);

    assert!(report
        .redirect_location("http://localhost:5173")
        .starts_with("https://shop.example.com/failed?"));
}

#[tokio::test]
async fn signed_payload_cannot_settle_a_different_row() {
    let mut server = mockito::Server::new_async().await;
    let _victim_order = mock_razorpay_order(&mut server, "order_VICTIM").await;
    let h = harness(&server.url()).await;
    let victim = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    // Genuine signature for another order, with a reference field aimed at the victim row.
    let mut payload = checkout_callback("order_ATTACKER", "pay_X", common::RAZORPAY_SECRET);
    payload.fields["ORDERID"] = json!("order_VICTIM");

    let report = h
        .service
        .reconcile("razorpay", payload, DeliveryChannel::Callback)
        .await;
    assert!(matches!(report.result, Err(PaymentError::InvalidSignature(_))));

    let row = h.store.find_by_id(victim.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn duplicate_webhook_keeps_first_verification() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_razorpay_order(&mut server, "order_E").await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    let first = h
        .service
        .reconcile("razorpay", razorpay_webhook("order_E", "pay_E", "captured"), DeliveryChannel::Webhook)
        .await;
    assert!(first.result.as_ref().unwrap().applied);
    let after_first = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();

    let second = h
        .service
        .reconcile("razorpay", razorpay_webhook("order_E", "pay_E", "captured"), DeliveryChannel::Webhook)
        .await;
    let outcome = second.result.unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.status, PaymentStatus::Paid);

    let after_second = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(after_second.status, PaymentStatus::Paid);
    assert_eq!(after_second.verified_at, after_first.verified_at);
    assert_eq!(after_second.amount, Decimal::new(10000, 2));
    assert!(after_second.webhook_received);
    assert!(h.store.gateway_logs().await.is_empty());
}

#[tokio::test]
async fn late_failure_webhook_does_not_regress_paid_row() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_razorpay_order(&mut server, "order_L").await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    h.service
        .reconcile("razorpay", checkout_callback("order_L", "pay_L", common::RAZORPAY_SECRET), DeliveryChannel::Callback)
        .await
        .result
        .unwrap();
    let report = h
        .service
        .reconcile("razorpay", razorpay_webhook("order_L", "pay_L", "failed"), DeliveryChannel::Webhook)
        .await;
    assert!(!report.result.unwrap().applied);

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Paid);
    assert!(row.failure_reason.is_none());
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let h = harness("http://127.0.0.1:9").await;
    let report = h
        .service
        .reconcile(
            "razorpay",
            checkout_callback("order_missing", "pay_1", common::RAZORPAY_SECRET),
            DeliveryChannel::Callback,
        )
        .await;
    assert!(matches!(report.result, Err(PaymentError::NotFound(_))));
    assert!(report.transaction.is_none());
    assert_eq!(
        report.redirect_location("http://localhost:5173"),
        "http://localhost:5173/payments/failure?status=failed"
    );

    let logs = h.store.gateway_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].transaction_id, None);
    assert_eq!(logs[0].gateway, "razorpay");
    assert_eq!(logs[0].action, "verify");
    assert!(!logs[0].ok);
    assert_eq!(logs[0].request["references"][0], json!("order_missing"));
}

#[tokio::test]
async fn rejections_before_lookup_are_audited() {
    let h = harness("http://127.0.0.1:9").await;

    let report = h
        .service
        .reconcile("Acme", CallbackPayload::from_fields(json!({"orderId": "o_1"})), DeliveryChannel::Webhook)
        .await;
    assert!(matches!(report.result, Err(PaymentError::Validation(_))));

    let report = h
        .service
        .reconcile("razorpay", CallbackPayload::from_fields(json!({"event": "ping"})), DeliveryChannel::Webhook)
        .await;
    assert!(matches!(report.result, Err(PaymentError::Validation(_))));

    let logs = h.store.gateway_logs().await;
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.transaction_id.is_none() && !l.ok && l.action == "verify"));
    assert!(logs.iter().any(|l| l.gateway == "acme"));
    assert!(logs.iter().any(|l| l.gateway == "razorpay" && l.response["event"] == json!("ping")));
}

#[tokio::test]
async fn refund_on_paid_row_is_recorded_and_audited() {
    let mut server = mockito::Server::new_async().await;
    let _order = mock_razorpay_order(&mut server, "order_F").await;
    let _refund = server
        .mock("POST", "/v1/payments/pay_F/refund")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"rfnd_F","status":"processed","amount":10000}"#)
        .create_async()
        .await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();
    h.service
        .reconcile("razorpay", checkout_callback("order_F", "pay_F", common::RAZORPAY_SECRET), DeliveryChannel::Callback)
        .await
        .result
        .unwrap();

    let outcome = h
        .service
        .refund(
            &owner(),
            RefundRequest {
                transaction_id: resp.transaction_id.to_string(),
                amount: Some(Decimal::new(100, 0)),
                reason: Some("damaged".to_string()),
                config: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Refunded);
    assert_eq!(outcome.refund_id.as_deref(), Some("rfnd_F"));

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Refunded);
    assert!(row.refunded_at.is_some());

    let logs = h.store.gateway_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "refund");
    assert!(logs[0].ok);
}

#[tokio::test]
async fn refund_rules_are_enforced_before_calling_gateway() {
    let mut server = mockito::Server::new_async().await;
    let _order = mock_razorpay_order(&mut server, "order_R").await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();

    let refund = |amount: Option<i64>| RefundRequest {
        transaction_id: resp.transaction_id.to_string(),
        amount: amount.map(|a| Decimal::new(a, 0)),
        reason: None,
        config: None,
    };

    // Still pending.
    let err = h.service.refund(&owner(), refund(None)).await.unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));

    h.service
        .reconcile("razorpay", checkout_callback("order_R", "pay_R", common::RAZORPAY_SECRET), DeliveryChannel::Callback)
        .await
        .result
        .unwrap();

    let err = h.service.refund(&owner(), refund(Some(101))).await.unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));

    let err = h.service.refund(&stranger(), refund(None)).await.unwrap_err();
    assert!(matches!(err, PaymentError::Forbidden(_)));

    let err = h
        .service
        .refund(
            &owner(),
            RefundRequest {
                transaction_id: Uuid::new_v4().to_string(),
                amount: None,
                reason: None,
                config: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
    assert!(h.store.gateway_logs().await.is_empty());
}

#[tokio::test]
async fn cashfree_webhook_matches_row_through_link_reference() {
    let mut server = mockito::Server::new_async().await;
    let _link = server
        .mock("POST", "/links")
        .match_header("x-api-version", "2023-08-01")
        .match_header("x-client-id", "cf_app")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"link_id":"link_fixed_1","link_url":"https://payments.cashfree.com/links/abc","cf_link_id":4411}"#)
        .create_async()
        .await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "cashfree", 250))
        .await
        .unwrap();
    assert!(matches!(resp.action, CompletionAction::Redirect { ref url } if url.ends_with("/links/abc")));

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.customer.phone.as_deref(), Some("9876543210"));
    assert_eq!(row.gateway_order_id.as_deref(), Some("link_fixed_1"));
    assert_eq!(row.gateway_link_id.as_deref(), Some("link_fixed_1"));
    assert_eq!(row.gateway_secondary_order_id.as_deref(), Some("4411"));

    let raw = json!({
        "type": "PAYMENT_SUCCESS_WEBHOOK",
        "data": {
            "order": {"order_id": "CF_ORDER_9", "order_tags": {"link_id": "link_fixed_1"}},
            "payment": {"cf_payment_id": 777001, "payment_status": "SUCCESS", "payment_amount": 250.0}
        }
    })
    .to_string()
    .into_bytes();
    let timestamp = "1700000000";
    let mut signed = timestamp.as_bytes().to_vec();
    signed.extend_from_slice(&raw);
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-webhook-signature",
        HeaderValue::from_str(&hmac_sha256_base64(common::CASHFREE_SECRET, &signed)).unwrap(),
    );
    headers.insert("x-webhook-timestamp", HeaderValue::from_static("1700000000"));

    let report = h
        .service
        .reconcile(
            "cashfree",
            CallbackPayload {
                fields: serde_json::from_slice(&raw).unwrap(),
                raw_body: raw,
                headers,
            },
            DeliveryChannel::Webhook,
        )
        .await;
    let outcome = report.result.unwrap();
    assert_eq!(outcome.status, PaymentStatus::Paid);
    assert_eq!(outcome.gateway_payment_id.as_deref(), Some("777001"));
}

async fn mock_cashfree_link(server: &mut mockito::ServerGuard, link_id: &str) -> mockito::Mock {
    server
        .mock("POST", "/links")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"link_id": link_id, "link_url": "https://payments.cashfree.com/links/x", "cf_link_id": 9001}).to_string())
        .create_async()
        .await
}

async fn mock_cashfree_lookup(server: &mut mockito::ServerGuard, link_id: &str, noted_id: Uuid) -> mockito::Mock {
    server
        .mock("GET", format!("/links/{link_id}").as_str())
        .match_header("x-client-id", "cf_app")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "link_id": link_id,
                "link_status": "PAID",
                "link_amount_paid": 250,
                "link_notes": {"transactionId": noted_id.to_string()}
            })
            .to_string(),
        )
        .create_async()
        .await
}

#[tokio::test]
async fn cashfree_return_without_signature_is_confirmed_by_lookup() {
    let mut server = mockito::Server::new_async().await;
    let _link = mock_cashfree_link(&mut server, "link_cf_lookup").await;
    let h = harness(&server.url()).await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "cashfree", 250))
        .await
        .unwrap();
    let _lookup = mock_cashfree_lookup(&mut server, "link_cf_lookup", resp.transaction_id).await;

    let report = h
        .service
        .reconcile(
            "cashfree",
            CallbackPayload::from_fields(json!({"link_id": "link_cf_lookup"})),
            DeliveryChannel::Callback,
        )
        .await;
    let outcome = report.result.unwrap();
    assert_eq!(outcome.status, PaymentStatus::Paid);
    assert!(outcome.applied);

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.status, PaymentStatus::Paid);
    assert_eq!(row.amount, Decimal::new(25000, 2));
    assert!(row.verified_at.is_some());
}

#[tokio::test]
async fn cashfree_lookup_noting_another_row_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _order = mock_razorpay_order(&mut server, "order_OTHER").await;
    let _link = mock_cashfree_link(&mut server, "link_cf_own").await;
    let h = harness(&server.url()).await;
    let other = h
        .service
        .initiate(&owner(), initiate_request(&h, "razorpay", 100))
        .await
        .unwrap();
    let own = h
        .service
        .initiate(&owner(), initiate_request(&h, "cashfree", 250))
        .await
        .unwrap();
    let _lookup = mock_cashfree_lookup(&mut server, "link_cf_own", other.transaction_id).await;

    let report = h
        .service
        .reconcile(
            "cashfree",
            CallbackPayload::from_fields(json!({"link_id": "link_cf_own"})),
            DeliveryChannel::Callback,
        )
        .await;
    assert!(matches!(report.result, Err(PaymentError::InvalidSignature(_))));

    for id in [own.transaction_id, other.transaction_id] {
        let row = h.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.status, PaymentStatus::Pending);
        assert!(row.verified_at.is_none());
    }

    let logs = h.store.gateway_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].transaction_id, Some(own.transaction_id));
    assert_eq!(logs[0].gateway, "cashfree");
    assert!(!logs[0].ok);
}

#[tokio::test]
async fn payu_form_callback_round_trip() {
    let h = harness("https://test.payu.in").await;
    let resp = h
        .service
        .initiate(&owner(), initiate_request(&h, "payu", 499))
        .await
        .unwrap();
    let CompletionAction::FormPost { fields, .. } = &resp.action else {
        panic!("expected a form post");
    };
    let txnid = fields["txnid"].clone();

    let hash_fields = HashFields {
        txnid: txnid.clone(),
        amount: "499.00".to_string(),
        productinfo: "Payment".to_string(),
        firstname: "Asha Rao".to_string(),
        email: "asha@example.com".to_string(),
        udf: [
            resp.transaction_id.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ],
    };
    let hash = response_hash(common::PAYU_KEY, common::PAYU_SALT, "success", &hash_fields, None);
    let payload = CallbackPayload::from_fields(json!({
        "status": "success",
        "txnid": txnid,
        "amount": "499.00",
        "productinfo": "Payment",
        "firstname": "Asha Rao",
        "email": "asha@example.com",
        "udf1": resp.transaction_id.to_string(),
        "mihpayid": "403993715521",
        "hash": hash,
    }));

    let report = h
        .service
        .reconcile("payu", payload, DeliveryChannel::Callback)
        .await;
    assert_eq!(report.result.unwrap().status, PaymentStatus::Paid);

    let row = h.store.find_by_id(resp.transaction_id).await.unwrap().unwrap();
    assert_eq!(row.gateway_payment_id.as_deref(), Some("403993715521"));
    assert_eq!(row.amount, Decimal::new(49900, 2));
}
