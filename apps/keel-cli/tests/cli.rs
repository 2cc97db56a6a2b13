use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{json, Value};

fn bin() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("keel").expect("binary");
    cmd.env_remove("NEXT_PUBLIC_API_URL")
        .env_remove("KEEL_ADMIN_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn user(email: &str, role: &str) -> Value {
    json!({
        "id": "3f1c7c1e-0000-4000-8000-000000000001",
        "email": email,
        "name": "Someone",
        "role": role,
        "emailVerified": true,
        "createdAt": "2026-01-02T03:04:05Z"
    })
}

fn session(email: &str, role: &str) -> Value {
    json!({
        "session": {
            "id": "sess-1",
            "userId": "3f1c7c1e-0000-4000-8000-000000000001",
            "expiresAt": "2026-01-09T03:04:05Z",
            "createdAt": "2026-01-02T03:04:05Z"
        },
        "user": user(email, role)
    })
}

fn mock_sign_in(server: &MockServer, email: &str, role: &str) {
    let email = email.to_string();
    let role = role.to_string();
    server.mock(|when, then| {
        when.method(POST).path("/api/auth/sign-in/email");
        then.status(200)
            .header("content-type", "application/json")
            .header(
                "set-cookie",
                "keel.session_token=tok-1; Path=/; HttpOnly; Secure; SameSite=None; Max-Age=604800",
            )
            .json_body(json!({ "token": "tok-1", "user": user(&email, &role) }));
    });
    let email = email.clone();
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/auth/get-session")
            .header("cookie", "keel.session_token=tok-1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(session(&email, &role));
    });
}

#[test]
fn status_reports_connected() {
    let server = MockServer::start();
    let hello = server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "message": "Hello World!" }));
    });

    bin()
        .args(["status", "--base", &server.base_url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("API Connected"));
    hello.assert();
}

#[test]
fn status_uses_public_api_url_env() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "message": "Hello World!" }));
    });

    bin()
        .env("NEXT_PUBLIC_API_URL", server.base_url())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"connected\":true"));
}

#[test]
fn status_reports_disconnected_on_bad_payload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "message": 42 }));
    });

    bin()
        .args(["status", "--base", &server.base_url()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("API Disconnected"))
        .stdout(predicate::str::contains("Start keel-server on port 3000"));
}

#[test]
fn status_reports_disconnected_when_unreachable() {
    bin()
        .args(["status", "--base", "http://127.0.0.1:9", "--timeout", "2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("API Disconnected"));
}

#[test]
fn hello_prints_greeting() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "message": "Hello World!" }));
    });

    bin()
        .args(["hello", "--base", &server.base_url()])
        .assert()
        .success()
        .stdout(predicate::eq("Hello World!\n"));
}

#[test]
fn admin_sign_in_succeeds_for_admins() {
    let server = MockServer::start();
    mock_sign_in(&server, "root@example.com", "admin");

    bin()
        .args([
            "admin",
            "sign-in",
            "--base",
            &server.base_url(),
            "--email",
            "root@example.com",
        ])
        .env("KEEL_ADMIN_PASSWORD", "hunter2hunter2")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signin successful"))
        .stdout(predicate::str::contains("root@example.com (admin)"));
}

#[test]
fn admin_sign_in_rejects_plain_users_and_signs_out() {
    let server = MockServer::start();
    mock_sign_in(&server, "plain@example.com", "user");
    let sign_out = server.mock(|when, then| {
        when.method(POST).path("/api/auth/sign-out");
        then.status(200)
            .header("content-type", "application/json")
            .header("set-cookie", "keel.session_token=; Path=/; Max-Age=0")
            .json_body(json!({ "success": true }));
    });

    bin()
        .args([
            "admin",
            "sign-in",
            "--base",
            &server.base_url(),
            "--email",
            "plain@example.com",
            "--password",
            "hunter2hunter2",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "You are not authorized to access this page",
        ));
    sign_out.assert();
}

#[test]
fn admin_sign_in_shows_server_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/auth/sign-in/email");
        then.status(401)
            .header("content-type", "application/problem+json")
            .json_body(json!({
                "type": "about:blank",
                "title": "Invalid email or password",
                "status": 401,
                "code": "UNAUTHORIZED"
            }));
    });

    bin()
        .args([
            "admin",
            "sign-in",
            "--base",
            &server.base_url(),
            "--email",
            "root@example.com",
            "--password",
            "wrong-password",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid email or password"));
}

#[test]
fn admin_sign_in_validates_form_locally() {
    bin()
        .args([
            "admin",
            "sign-in",
            "--base",
            "http://127.0.0.1:9",
            "--email",
            "nope",
            "--password",
            "short",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid email address"))
        .stderr(predicate::str::contains(
            "Password must be at least 8 characters",
        ));
}

#[test]
fn contract_export_formats() {
    bin()
        .args(["contract", "export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"openapi\": \"3.1.0\""));

    bin()
        .args(["contract", "export", "--format", "manifest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"hello.get\""));

    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("spec").join("openapi.json");
    bin()
        .args(["contract", "export", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(doc["paths"]["/"]["get"].is_object());
}
