//! Caption file fetching through the browser's `fetch` API.
//!
//! [`CaptionFetchClient`] is the [`HttpClient`] the player uses for sideloaded
//! WebVTT and SRT files. Media segments never pass through it. Every request
//! carries a caption `Accept` header and is aborted through an
//! `AbortController` once its deadline passes; bodies are read as text.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use bytes::Bytes;
use futures::{
    future::{select, Either},
    pin_mut,
};
use gloo_timers::future::TimeoutFuture;
use tracing::debug;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AbortController, Request, RequestInit, RequestMode, Response, Window};

use crate::error::WasmError;

/// Deadline for requests that do not set their own.
pub const DEFAULT_CAPTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Formats the caption parser understands, most specific first.
const CAPTION_ACCEPT: &str = "text/vtt, application/x-subrip;q=0.9, text/plain;q=0.8";

/// Response headers kept on [`HttpResponse`].
const KEPT_HEADERS: &[&str] = &["content-type", "content-length"];

/// `fetch`-backed client for caption files.
pub struct CaptionFetchClient {
    window: Window,
    default_timeout: Duration,
}

impl CaptionFetchClient {
    /// Create a client bound to the current browser window.
    pub fn new() -> BridgeResult<Self> {
        let window =
            web_sys::window().ok_or_else(|| BridgeError::NotAvailable("window".to_string()))?;
        Ok(Self {
            window,
            default_timeout: DEFAULT_CAPTION_TIMEOUT,
        })
    }

    /// Override the deadline applied to requests without one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn build_request(
        &self,
        request: &HttpRequest,
        controller: &AbortController,
    ) -> BridgeResult<Request> {
        let init = RequestInit::new();
        init.set_method(request.method.as_str());
        init.set_mode(RequestMode::Cors);
        init.set_signal(Some(&controller.signal()));

        let headers = web_sys::Headers::new().map_err(|err| fetch_error("headers", err))?;
        if !request.headers.keys().any(|key| key.eq_ignore_ascii_case("accept")) {
            headers
                .set("Accept", CAPTION_ACCEPT)
                .map_err(|err| fetch_error("headers", err))?;
        }
        for (key, value) in &request.headers {
            headers
                .set(key, value)
                .map_err(|err| fetch_error("headers", err))?;
        }
        init.set_headers(&headers);

        Request::new_with_str_and_init(&request.url, &init)
            .map_err(|err| fetch_error("request", err))
    }

    /// Run `fetch` and abort it once `timeout` elapses.
    async fn fetch(
        &self,
        request: &Request,
        controller: &AbortController,
        timeout: Duration,
    ) -> BridgeResult<Response> {
        let fetch = JsFuture::from(self.window.fetch_with_request(request));
        let deadline = TimeoutFuture::new(timeout.as_millis().min(u128::from(u32::MAX)) as u32);
        pin_mut!(fetch);
        pin_mut!(deadline);

        let result = match select(fetch, deadline).await {
            Either::Left((result, _)) => result,
            Either::Right((_, pending)) => {
                controller.abort();
                // The aborted promise still has to settle before it is dropped.
                let _ = pending.await;
                return Err(BridgeError::OperationFailed(format!(
                    "caption fetch timed out after {} ms",
                    timeout.as_millis()
                )));
            }
        };

        result
            .map_err(|err| fetch_error("fetch", err))?
            .dyn_into::<Response>()
            .map_err(|_| BridgeError::OperationFailed("fetch resolved to a non-Response".into()))
    }

    async fn read_text(response: &Response) -> BridgeResult<Bytes> {
        let promise = response.text().map_err(|err| fetch_error("body", err))?;
        let text = JsFuture::from(promise)
            .await
            .map_err(|err| fetch_error("body", err))?
            .as_string()
            .unwrap_or_default();
        Ok(Bytes::from(text))
    }

    fn kept_headers(response: &Response) -> HashMap<String, String> {
        let headers = response.headers();
        KEPT_HEADERS
            .iter()
            .filter_map(|&name| {
                let value = headers.get(name).ok().flatten()?;
                Some((name.to_string(), value))
            })
            .collect()
    }
}

#[async_trait(?Send)]
impl HttpClient for CaptionFetchClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let controller =
            AbortController::new().map_err(|err| fetch_error("abort controller", err))?;
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let req = self.build_request(&request, &controller)?;

        let response = self.fetch(&req, &controller, timeout).await?;
        let status = response.status();
        debug!(status, method = request.method.as_str(), "Caption request finished");

        let body = match request.method {
            HttpMethod::Head => Bytes::new(),
            HttpMethod::Get => Self::read_text(&response).await?,
        };
        Ok(HttpResponse {
            status,
            headers: Self::kept_headers(&response),
            body,
        })
    }
}

fn fetch_error(stage: &str, err: JsValue) -> BridgeError {
    BridgeError::OperationFailed(format!("caption {stage}: {}", WasmError::from(err)))
}
