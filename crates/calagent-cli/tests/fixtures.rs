//! Shared helpers for CLI integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Unsigned token expiring an hour from now.
pub fn live_token() -> String {
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "42", "exp": exp }).to_string());
    format!("{header}.{payload}.signature")
}

/// Answers `GET /user/profile` for `token` with `status`.
pub async fn mount_profile(server: &MockServer, token: &str, status: u16) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "name": "Ada Lovelace",
            "email": "ada@example.com"
        }))
    } else {
        ResponseTemplate::new(status)
    };

    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Writes a storage file holding only `token`.
pub fn write_token(home: &Path, token: &str) {
    fs::create_dir_all(home).unwrap();
    fs::write(
        home.join("storage.json"),
        json!({ "auth_token": token }).to_string(),
    )
    .unwrap();
}

/// Reads the storage file, or an empty object if it does not exist.
pub fn read_storage(home: &Path) -> Value {
    match fs::read_to_string(home.join("storage.json")) {
        Ok(contents) => serde_json::from_str(&contents).unwrap(),
        Err(_) => json!({}),
    }
}
