//! Webhook delivery integration tests
//!
//! These drive the assembled router end to end with `tower::ServiceExt`:
//! signed deliveries in, HTTP statuses and store contents out.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use civipay::config::AppConfig;
use civipay::handlers::AppState;
use civipay::model::{Membership, MembershipStatus, PaymentStatus, Product, UserProfile};
use civipay::notify::LogNotifier;
use civipay::provider::StaticSubscriptions;
use civipay::reconcile::Reconciler;
use civipay::server::build_router;
use civipay::store::{MemoryStore, Store};
use civipay::webhook::events::ProviderSubscription;
use civipay::webhook::handler::WebhookState;
use civipay::webhook::idempotency::InMemoryIdempotencyStore;
use civipay::webhook::signature::SignatureVerifier;
use civipay::webhook::{SIGNATURE_HEADER, WEBHOOK_PATH};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs()
}

fn test_verifier() -> SignatureVerifier {
    let config = AppConfig::for_tests();
    SignatureVerifier::new(config.webhook_secret(), config.signature_tolerance_secs)
}

fn test_app() -> (Router, Arc<MemoryStore>) {
    test_app_with_subscriptions(StaticSubscriptions::new())
}

fn test_app_with_subscriptions(subscriptions: StaticSubscriptions) -> (Router, Arc<MemoryStore>) {
    let config = AppConfig::for_tests();
    let store = Arc::new(MemoryStore::new());
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::new(subscriptions),
        Arc::new(LogNotifier),
        config.free_tier.clone(),
    ));
    let metrics = Arc::new(AppState::new());
    let webhook_state = Arc::new(WebhookState::new(
        test_verifier(),
        Arc::new(InMemoryIdempotencyStore::default()),
        reconciler,
        Arc::clone(&metrics),
    ));
    (build_router(webhook_state, metrics), store)
}

async fn deliver_signed(app: Router, payload: &str) -> axum::response::Response {
    deliver_signed_at(app, payload, unix_now()).await
}

async fn deliver_signed_at(app: Router, payload: &str, timestamp: u64) -> axum::response::Response {
    let header_value = test_verifier().sign(payload.as_bytes(), timestamp);
    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(SIGNATURE_HEADER, header_value)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn donation_checkout_payload(event_id: &str, amount_total: i64) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": unix_now(),
        "livemode": false,
        "data": {
            "object": {
                "id": "cs_test_1",
                "mode": "payment",
                "amount_total": amount_total,
                "currency": "usd",
                "payment_intent": "pi_test_1",
                "client_reference_id": "user_1",
                "metadata": { "type": "donation", "description": "General fund" },
                "livemode": false
            }
        }
    })
    .to_string()
}

fn purchase_payload(event_id: &str, intent_id: &str, succeeded: bool) -> String {
    json!({
        "id": event_id,
        "type": if succeeded { "payment_intent.succeeded" } else { "payment_intent.payment_failed" },
        "created": unix_now(),
        "livemode": false,
        "data": {
            "object": {
                "id": intent_id,
                "amount": 2500,
                "currency": "usd",
                "status": if succeeded { "succeeded" } else { "requires_payment_method" },
                "metadata": {
                    "type": "purchase",
                    "user_id": "user_9",
                    "product_id": "prod_tshirt",
                    "product_name": "Org T-Shirt"
                },
                "livemode": false
            }
        }
    })
    .to_string()
}

fn subscription_lifecycle_payload(event_id: &str, event_type: &str, status: &str) -> String {
    let now = unix_now();
    json!({
        "id": event_id,
        "type": event_type,
        "created": now,
        "livemode": false,
        "data": {
            "object": {
                "id": "sub_test_1",
                "customer": "cus_test_1",
                "status": status,
                "current_period_start": now,
                "current_period_end": now + 30 * 24 * 3600,
                "cancel_at_period_end": false,
                "metadata": {},
                "livemode": false
            }
        }
    })
    .to_string()
}

fn tshirt_product() -> Product {
    Product {
        id: "prod_tshirt".into(),
        name: "Org T-Shirt".into(),
        price: 25.0,
        currency: "usd".into(),
        stock: 3,
    }
}

fn seeded_membership() -> Membership {
    let now = Utc::now();
    Membership {
        id: Uuid::new_v4(),
        user_id: "user_7".into(),
        tier: "member".into(),
        subscription_ref: "sub_test_1".into(),
        status: MembershipStatus::Active,
        started_at: now,
        current_period_end: None,
        ended_at: None,
        cancel_at_period_end: false,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let (app, store) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(donation_checkout_payload("evt_nosig", 5000)))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("signature"));
    assert!(store.donations().is_empty());
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let (app, store) = test_app();

    let payload = donation_checkout_payload("evt_tamper", 5000);
    let header_value = test_verifier().sign(payload.as_bytes(), unix_now());
    // Inflate the amount after signing
    let tampered = payload.replace("5000", "999999");

    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(SIGNATURE_HEADER, header_value)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(tampered))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.donations().is_empty());
}

#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let (app, store) = test_app();

    let payload = donation_checkout_payload("evt_stale", 5000);
    let response = deliver_signed_at(app, &payload, unix_now() - 3600).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.donations().is_empty());
}

#[tokio::test]
async fn test_donation_checkout_recorded() {
    let (app, store) = test_app();

    let response = deliver_signed(app, &donation_checkout_payload("evt_donation", 5000)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["received"], json!(true));

    let donations = store.donations();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].user_id, "user_1");
    assert_eq!(donations[0].amount, 50.0);
    assert_eq!(donations[0].currency, "usd");
    assert_eq!(donations[0].status, PaymentStatus::Succeeded);
    assert_eq!(donations[0].payment_ref, "pi_test_1");
}

#[tokio::test]
async fn test_duplicate_delivery_records_once() {
    let (app, store) = test_app();
    let payload = donation_checkout_payload("evt_dup", 5000);

    let first = deliver_signed(app.clone(), &payload).await;
    let second = deliver_signed(app, &payload).await;

    // Both deliveries are acknowledged so the provider stops retrying
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(store.donations().len(), 1);
}

#[tokio::test]
async fn test_purchase_decrements_stock() {
    let (app, store) = test_app();
    store.upsert_product(tshirt_product()).await.unwrap();

    let response = deliver_signed(app, &purchase_payload("evt_buy", "pi_buy_1", true)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let purchases = store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].product_id, "prod_tshirt");
    assert_eq!(purchases[0].status, PaymentStatus::Succeeded);

    let product = store.product("prod_tshirt").await.unwrap().unwrap();
    assert_eq!(product.stock, 2);
}

#[tokio::test]
async fn test_failed_purchase_keeps_stock() {
    let (app, store) = test_app();
    store.upsert_product(tshirt_product()).await.unwrap();

    let response = deliver_signed(app, &purchase_payload("evt_fail", "pi_fail_1", false)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let purchases = store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].status, PaymentStatus::Failed);

    let product = store.product("prod_tshirt").await.unwrap().unwrap();
    assert_eq!(product.stock, 3);
}

#[tokio::test]
async fn test_stock_never_goes_negative_across_deliveries() {
    let (app, store) = test_app();
    store
        .upsert_product(Product {
            stock: 2,
            ..tshirt_product()
        })
        .await
        .unwrap();

    for i in 0..4 {
        let payload = purchase_payload(&format!("evt_rush_{i}"), &format!("pi_rush_{i}"), true);
        let response = deliver_signed(app.clone(), &payload).await;
        // Out-of-stock decrements are swallowed, the sale record still lands
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(store.purchases().len(), 4);
    let product = store.product("prod_tshirt").await.unwrap().unwrap();
    assert_eq!(product.stock, 0);
}

#[tokio::test]
async fn test_subscription_checkout_creates_membership() {
    let now = unix_now() as i64;
    let subscriptions = StaticSubscriptions::new().with(ProviderSubscription {
        id: "sub_new_1".into(),
        customer: "cus_new_1".into(),
        status: MembershipStatus::Active,
        current_period_start: now,
        current_period_end: now + 30 * 24 * 3600,
        cancel_at_period_end: false,
        canceled_at: None,
        ended_at: None,
        metadata: Default::default(),
        livemode: false,
    });
    let (app, store) = test_app_with_subscriptions(subscriptions);
    store
        .upsert_user(UserProfile {
            id: "user_5".into(),
            email: Some("member@example.org".into()),
            tier: "free".into(),
        })
        .await
        .unwrap();

    let payload = json!({
        "id": "evt_sub_checkout",
        "type": "checkout.session.completed",
        "created": unix_now(),
        "livemode": false,
        "data": {
            "object": {
                "id": "cs_sub_1",
                "mode": "subscription",
                "amount_total": 1500,
                "currency": "usd",
                "subscription": "sub_new_1",
                "client_reference_id": "user_5",
                "metadata": { "tier": "sustainer" },
                "livemode": false
            }
        }
    })
    .to_string();
    let response = deliver_signed(app, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    let memberships = store.memberships();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].user_id, "user_5");
    assert_eq!(memberships[0].tier, "sustainer");
    assert_eq!(memberships[0].subscription_ref, "sub_new_1");

    let user = store.user("user_5").await.unwrap().unwrap();
    assert_eq!(user.tier, "sustainer");
}

#[tokio::test]
async fn test_subscription_update_mirrors_status() {
    let (app, store) = test_app();
    store.create_membership(seeded_membership()).await.unwrap();

    let payload =
        subscription_lifecycle_payload("evt_past_due", "customer.subscription.updated", "past_due");
    let response = deliver_signed(app, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    let membership = store
        .membership_by_subscription("sub_test_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.status, MembershipStatus::PastDue);
}

#[tokio::test]
async fn test_subscription_deleted_cancels_membership_and_resets_tier() {
    let (app, store) = test_app();
    store.create_membership(seeded_membership()).await.unwrap();
    store
        .upsert_user(UserProfile {
            id: "user_7".into(),
            email: None,
            tier: "member".into(),
        })
        .await
        .unwrap();

    let payload = subscription_lifecycle_payload(
        "evt_deleted",
        "customer.subscription.deleted",
        "canceled",
    );
    let response = deliver_signed(app, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    let membership = store
        .membership_by_subscription("sub_test_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.status, MembershipStatus::Canceled);
    assert!(membership.ended_at.is_some());

    let user = store.user("user_7").await.unwrap().unwrap();
    assert_eq!(user.tier, "free");
}

#[tokio::test]
async fn test_subscription_deleted_clears_scheduled_cancellation() {
    let (app, store) = test_app();
    let mut membership = seeded_membership();
    membership.cancel_at_period_end = true;
    store.create_membership(membership).await.unwrap();

    // Period-end cancellations deliver their final deleted event with the
    // schedule flag still set
    let now = unix_now();
    let payload = json!({
        "id": "evt_sched_end",
        "type": "customer.subscription.deleted",
        "created": now,
        "livemode": false,
        "data": {
            "object": {
                "id": "sub_test_1",
                "customer": "cus_test_1",
                "status": "canceled",
                "current_period_start": now - 30 * 24 * 3600,
                "current_period_end": now,
                "cancel_at_period_end": true,
                "ended_at": now,
                "metadata": {},
                "livemode": false
            }
        }
    })
    .to_string();
    let response = deliver_signed(app, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    let membership = store
        .membership_by_subscription("sub_test_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.status, MembershipStatus::Canceled);
    assert!(membership.ended_at.is_some());
    assert!(!membership.cancel_at_period_end);
}

#[tokio::test]
async fn test_subscription_deleted_without_membership_is_acknowledged() {
    let (app, store) = test_app();

    let payload = subscription_lifecycle_payload(
        "evt_orphan",
        "customer.subscription.deleted",
        "canceled",
    );
    let response = deliver_signed(app, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.memberships().is_empty());
}

#[tokio::test]
async fn test_unknown_event_type_acknowledged() {
    let (app, store) = test_app();

    let payload = json!({
        "id": "evt_unknown",
        "type": "product.created",
        "created": unix_now(),
        "livemode": false,
        "data": { "object": { "id": "prod_1" } }
    })
    .to_string();
    let response = deliver_signed(app, &payload).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.donations().is_empty());
    assert!(store.purchases().is_empty());
    assert!(store.memberships().is_empty());
}

#[tokio::test]
async fn test_garbage_payload_rejected() {
    let (app, _store) = test_app();

    let response = deliver_signed(app, "this is not json").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_endpoint_reports_pipeline_counters() {
    let (app, _store) = test_app();

    let delivery = deliver_signed(app.clone(), &donation_checkout_payload("evt_status", 5000)).await;
    assert_eq!(delivery.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["events"]["received"], json!(1));
    assert_eq!(body["events"]["donations_recorded"], json!(1));
    assert_eq!(body["status"], json!("running"));

    let metrics = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = axum::body::to_bytes(metrics.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("civipay_events_received_total 1"));
    assert!(text.contains("civipay_donations_recorded_total 1"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn test_cors_preflight_allows_localhost() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/status")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}

#[tokio::test]
async fn test_cors_preflight_blocks_external_origin() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/status")
                .header(header::ORIGIN, "http://evil.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
