#![cfg(target_arch = "wasm32")]
//! Caption fetching through the browser `fetch` API.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_wasm::CaptionFetchClient;
use std::time::Duration;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const VTT: &str = "data:text/vtt,WEBVTT%0A%0A00:00:00.000%20--%3E%2000:00:02.000%0AHello%0A";

#[wasm_bindgen_test]
async fn test_caption_body_is_read_as_text() {
    let client = CaptionFetchClient::new().unwrap();

    let response = client.execute(HttpRequest::get(VTT)).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.header("Content-Type"), Some("text/vtt"));
    assert_eq!(
        response.text().unwrap(),
        "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nHello\n"
    );
}

#[wasm_bindgen_test]
async fn test_head_request_has_no_body() {
    let client = CaptionFetchClient::new()
        .unwrap()
        .with_default_timeout(Duration::from_secs(5));

    let response = client
        .execute(HttpRequest::new(HttpMethod::Head, VTT))
        .await
        .unwrap();

    assert!(response.is_success());
    assert!(response.body.is_empty());
}

#[wasm_bindgen_test]
async fn test_unreachable_host_is_an_error() {
    let client = CaptionFetchClient::new().unwrap();

    let result = client
        .execute(HttpRequest::get("https://invalid.invalid/en.vtt").timeout(Duration::from_secs(5)))
        .await;

    assert!(result.is_err());
}
