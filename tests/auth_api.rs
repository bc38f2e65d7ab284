mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::{response_json, seed_admin, seed_user, send_json, test_app};

use storefront::domain::user::AdminRole;

#[tokio::test]
async fn register_then_login_round_trip() {
    let (app, _state) = test_app();

    let response = send_json(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": "ada",
            "email": "ada@example.com",
            "password": "hunter22"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["username"], "ada");
    assert!(body["user"].get("password_hash").is_none());

    let response = send_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "hunter22" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let token = body["token"].as_str().unwrap().to_string();

    let response = send_json(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["user"]["email"], "ada@example.com");
}

#[tokio::test]
async fn duplicate_registrations_conflict() {
    let (app, _state) = test_app();
    let payload = json!({
        "username": "ada",
        "email": "ada@example.com",
        "password": "hunter22"
    });

    let response = send_json(&app, "POST", "/api/auth/register", None, Some(payload.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send_json(&app, "POST", "/api/auth/register", None, Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_read_the_same() {
    let (app, state) = test_app();
    seed_user(&state, "ada").await;

    let wrong_password = send_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "nope-nope" })),
    )
    .await;
    let unknown_email = send_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "ghost@example.com", "password": "nope-nope" })),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

    let a = response_json(wrong_password).await;
    let b = response_json(unknown_email).await;
    assert_eq!(a["error"]["message"], b["error"]["message"]);
}

#[tokio::test]
async fn sms_codes_are_rate_limited_and_single_use() {
    let (app, _state) = test_app();

    let response = send_json(
        &app,
        "POST",
        "/api/auth/sms/send",
        None,
        Some(json!({ "phone": "13812345678" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    // Echo mode is on for tests.
    let code = body["code"].as_str().unwrap().to_string();

    // A second send inside the rate window is refused.
    let response = send_json(
        &app,
        "POST",
        "/api/auth/sms/send",
        None,
        Some(json!({ "phone": "13812345678" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send_json(
        &app,
        "POST",
        "/api/auth/sms/login",
        None,
        Some(json!({ "phone": "13812345678", "code": code })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["user"]["phone"], "13812345678");

    // The code was consumed by the first login.
    let response = send_json(
        &app,
        "POST",
        "/api/auth/sms/login",
        None,
        Some(json!({ "phone": "13812345678", "code": code })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_phone_numbers_are_rejected() {
    let (app, _state) = test_app();
    for phone in ["12812345678", "1381234567", "phone-number"] {
        let response = send_json(
            &app,
            "POST",
            "/api/auth/sms/send",
            None,
            Some(json!({ "phone": phone })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{phone}");
    }
}

#[tokio::test]
async fn wrong_sms_code_does_not_log_in() {
    let (app, _state) = test_app();
    send_json(
        &app,
        "POST",
        "/api/auth/sms/send",
        None,
        Some(json!({ "phone": "13812345678" })),
    )
    .await;

    let response = send_json(
        &app,
        "POST",
        "/api/auth/sms/login",
        None,
        Some(json!({ "phone": "13812345678", "code": "000000" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_tokens_do_not_open_admin_routes() {
    let (app, state) = test_app();
    let (_, user_token) = seed_user(&state, "ada").await;

    let response = send_json(&app, "GET", "/api/admin/me", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_json(&app, "GET", "/api/orders/admin", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_super_admins_manage_admin_accounts() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;

    let payload = json!({
        "username": "newadmin",
        "email": "newadmin@example.com",
        "password": "secret-pass"
    });
    let response = send_json(
        &app,
        "POST",
        "/api/admin/register",
        Some(&admin_token),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_json(&app, "GET", "/api/admins", Some(&admin_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let (_, super_token) = seed_admin_super(&state).await;
    let response = send_json(
        &app,
        "POST",
        "/api/admin/register",
        Some(&super_token),
        Some(payload),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send_json(&app, "GET", "/api/admins", Some(&super_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["admins"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn admins_list_and_search_user_accounts() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let (_, user_token) = seed_user(&state, "ada").await;
    seed_user(&state, "bob").await;

    // The listing is admin-only.
    let response = send_json(&app, "GET", "/api/users", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_json(&app, "GET", "/api/users", Some(&admin_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["total"], 2);

    let response = send_json(&app, "GET", "/api/users?search=ada", Some(&admin_token), None).await;
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["username"], "ada");
}

#[tokio::test]
async fn disabled_accounts_lose_access_until_reenabled() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let (user, user_token) = seed_user(&state, "ada").await;

    // Users cannot toggle account status, not even their own.
    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/users/{}/status", user.id),
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/users/{}/status", user.id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["is_active"], false);

    // The existing token and password login both stop working.
    let response = send_json(&app, "GET", "/api/auth/me", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send_json(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": user.email, "password": "password123" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send_json(
        &app,
        "PATCH",
        &format!("/api/users/{}/status", user.id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send_json(&app, "GET", "/api/auth/me", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn profile_updates_are_owner_or_admin_scoped() {
    let (app, state) = test_app();
    let (_, admin_token) = seed_admin(&state, AdminRole::Admin).await;
    let (user, user_token) = seed_user(&state, "ada").await;
    let (other, other_token) = seed_user(&state, "bob").await;

    let response = send_json(
        &app,
        "PUT",
        &format!("/api/users/{}", user.id),
        Some(&user_token),
        Some(json!({ "username": "ada-lovelace", "phone": "13812345678" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["username"], "ada-lovelace");
    assert_eq!(body["phone"], "13812345678");
    assert!(body.get("password_hash").is_none());

    // Taken usernames and malformed phones are rejected.
    let response = send_json(
        &app,
        "PUT",
        &format!("/api/users/{}", user.id),
        Some(&user_token),
        Some(json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = send_json(
        &app,
        "PUT",
        &format!("/api/users/{}", user.id),
        Some(&user_token),
        Some(json!({ "phone": "12345" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Another user can neither read nor edit the account.
    let response = send_json(
        &app,
        "GET",
        &format!("/api/users/{}", user.id),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = send_json(
        &app,
        "PUT",
        &format!("/api/users/{}", user.id),
        Some(&other_token),
        Some(json!({ "username": "mallory" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // `is_active` in the payload only applies to admin callers.
    let response = send_json(
        &app,
        "PUT",
        &format!("/api/users/{}", other.id),
        Some(&other_token),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["is_active"], true);

    let response = send_json(
        &app,
        "PUT",
        &format!("/api/users/{}", other.id),
        Some(&admin_token),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["is_active"], false);
}

async fn seed_admin_super(
    state: &storefront::AppState,
) -> (storefront::domain::user::Admin, String) {
    use storefront::auth::{hash_password, PrincipalKind};
    use storefront::domain::user::Admin;
    let admin = state
        .users
        .insert_admin(Admin::new(
            "root".into(),
            "root@example.com".into(),
            hash_password("root-pass").unwrap(),
            AdminRole::SuperAdmin,
        ))
        .await
        .unwrap();
    let token = state.tokens.issue(admin.id, PrincipalKind::Admin).unwrap();
    (admin, token)
}
