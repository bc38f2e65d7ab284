mod support;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use support::{
    order_payload, response_json, seed_admin, seed_product, seed_user, send_json, test_app,
};

use storefront::domain::user::AdminRole;

fn money(value: &Value) -> Decimal {
    value.as_str().expect("decimal as string").parse().unwrap()
}

#[tokio::test]
async fn placing_an_order_snapshots_prices_and_reserves_stock() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let product = seed_product(&state, "Widget", dec!(10.00), 5).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 2)])),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;

    assert_eq!(money(&body["subtotal"]), dec!(20.00));
    assert_eq!(money(&body["tax"]), dec!(2.00));
    assert_eq!(money(&body["total"]), dec!(22.00));
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payment"]["status"], "pending");
    assert!(body["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD"));

    let stored = state.products.get(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 3);
}

#[tokio::test]
async fn insufficient_stock_rejects_the_order_and_leaves_stock_alone() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let product = seed_product(&state, "Widget", dec!(10.00), 1).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 3)])),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("insufficient stock"));

    let stored = state.products.get(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 1);
}

#[tokio::test]
async fn empty_order_is_a_validation_error() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[])),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delisted_product_cannot_be_ordered() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let mut product = seed_product(&state, "Widget", dec!(10.00), 5).await;
    product.is_active = false;
    state.products.update(&product).await.unwrap();

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 1)])),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancelling_a_pending_order_restores_stock_once() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let product = seed_product(&state, "Widget", dec!(10.00), 5).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 2)])),
    )
    .await;
    let order = response_json(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/cancel"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "cancelled");

    let stored = state.products.get(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 5);

    // A second cancel is rejected and must not restock again.
    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/cancel"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let stored = state.products.get(product.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 5);
}

#[tokio::test]
async fn confirmed_orders_cannot_be_cancelled_by_the_buyer() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let product = seed_product(&state, "Widget", dec!(10.00), 5).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 1)])),
    )
    .await;
    let order = response_json(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(&admin_token),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/cancel"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("pending"));
}

#[tokio::test]
async fn status_updates_follow_the_transition_table() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let product = seed_product(&state, "Widget", dec!(10.00), 5).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 1)])),
    )
    .await;
    let order = response_json(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    // pending -> delivered skips the whole pipeline and is rejected.
    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(&admin_token),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for status in ["confirmed", "processing", "shipped", "delivered"] {
        let response = send_json(
            &app,
            "PATCH",
            &format!("/api/orders/{order_id}/status"),
            Some(&admin_token),
            Some(json!({ "status": status })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {status}");
    }
}

#[tokio::test]
async fn admin_cancellation_restores_stock() {
    let (app, state) = test_app();
    let (_, token) = seed_user(&state, "ada").await;
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let product = seed_product(&state, "Widget", dec!(10.00), 4).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&token),
        Some(order_payload(&[(product.id, 4)])),
    )
    .await;
    let order = response_json(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    assert_eq!(
        state.products.get(product.id).await.unwrap().unwrap().stock,
        0
    );

    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(&admin_token),
        Some(json!({ "status": "cancelled", "note": "fraud check failed" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        state.products.get(product.id).await.unwrap().unwrap().stock,
        4
    );
}

#[tokio::test]
async fn orders_are_visible_to_their_owner_and_admins_only() {
    let (app, state) = test_app();
    let (_, owner_token) = seed_user(&state, "ada").await;
    let (_, other_token) = seed_user(&state, "bob").await;
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let product = seed_product(&state, "Widget", dec!(10.00), 5).await;

    let response = send_json(
        &app,
        "POST",
        "/api/orders",
        Some(&owner_token),
        Some(order_payload(&[(product.id, 1)])),
    )
    .await;
    let order = response_json(response).await;
    let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());

    let response = send_json(&app, "GET", &uri, Some(&other_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_json(&app, "GET", &uri, Some(&owner_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_json(&app, "GET", &uri, Some(&admin_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_json(&app, "GET", &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn own_listing_excludes_other_buyers() {
    let (app, state) = test_app();
    let (_, ada_token) = seed_user(&state, "ada").await;
    let (_, bob_token) = seed_user(&state, "bob").await;
    let product = seed_product(&state, "Widget", dec!(10.00), 10).await;

    for token in [&ada_token, &bob_token] {
        let response = send_json(
            &app,
            "POST",
            "/api/orders",
            Some(token),
            Some(order_payload(&[(product.id, 1)])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = send_json(&app, "GET", "/api/orders", Some(&ada_token), None).await;
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
