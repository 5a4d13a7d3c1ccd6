use actix_web::{body, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use log::debug;
use resale_common::Secret;

use crate::{config::WebhookAuthConfig, helpers::calculate_hmac};

pub const TEST_API_KEY: &str = "test-api-key-7f3a";
pub const TEST_HMAC_SECRET: &str = "test-hmac-secret-91c2";

// Test credentials. DO NOT re-use these anywhere.
pub fn get_auth_config() -> WebhookAuthConfig {
    WebhookAuthConfig {
        api_key: Secret::new(TEST_API_KEY.to_string()),
        hmac_secret: Secret::new(TEST_HMAC_SECRET.to_string()),
        ..WebhookAuthConfig::default()
    }
}

pub fn api_key_header() -> (&'static str, String) {
    ("Authorization", format!("Apikey {TEST_API_KEY}"))
}

pub fn signature_header(body: &str) -> (&'static str, String) {
    ("X-Signature", calculate_hmac(TEST_HMAC_SECRET, body.as_bytes()).unwrap())
}

/// POSTs `body` to the app built by `configure` and returns the status and response body. Errors raised by middleware
/// are rendered the way the server would render them.
pub async fn post_request<F>(path: &str, body: &str, headers: &[(&str, String)], configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig)
{
    let mut req = TestRequest::post().uri(path).set_payload(body.to_string());
    for (name, value) in headers {
        req = req.insert_header((*name, value.as_str()));
    }
    let service = test::init_service(App::new().configure(configure)).await;
    debug!("Making request to {path}");
    let res = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => res.into_parts().1.map_into_boxed_body(),
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let bytes = body::to_bytes(res.into_body()).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}
