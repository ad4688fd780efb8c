use crate::client::{ApiClient, ApiError, ApiRequest, RawResponse, Transport};
use async_trait::async_trait;
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex};

type Handler = Box<dyn Fn(&ApiRequest) -> RawResponse + Send + Sync>;

/// Answers every request from a closure and records what was sent.
pub struct FakeTransport {
    handler: Handler,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> RawResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(FakeTransport {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn client(self: &Arc<Self>) -> ApiClient {
        ApiClient::new(self.clone())
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Every request that is not a GET.
    pub fn writes(&self) -> Vec<ApiRequest> {
        self.calls()
            .into_iter()
            .filter(|call| call.method != Method::GET)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok((self.handler)(&request))
    }
}

pub fn ok(body: Value) -> RawResponse {
    RawResponse::json(StatusCode::OK, &body)
}

pub fn created(body: Value) -> RawResponse {
    RawResponse::json(StatusCode::CREATED, &body)
}

pub fn no_content() -> RawResponse {
    RawResponse {
        status: StatusCode::NO_CONTENT,
        link: None,
        body: Vec::new(),
    }
}

pub fn not_found() -> RawResponse {
    RawResponse::json(StatusCode::NOT_FOUND, &serde_json::json!({"detail": "Not found"}))
}

pub fn server_error() -> RawResponse {
    RawResponse::json(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({"detail": "Internal Error"}),
    )
}

/// A list page whose `Link` header points at `next`, or marks the end when `None`.
pub fn page(items: Value, next: Option<&str>) -> RawResponse {
    let (results, cursor) = match next {
        Some(cursor) => ("true", cursor),
        None => ("false", "0:100:0"),
    };
    RawResponse {
        status: StatusCode::OK,
        link: Some(format!(
            r#"<https://sentry.test/api/0/?&cursor=0:0:1>; rel="previous"; results="false"; cursor="0:0:1", <https://sentry.test/api/0/?&cursor={cursor}>; rel="next"; results="{results}"; cursor="{cursor}""#
        )),
        body: items.to_string().into_bytes(),
    }
}

pub fn cursor_of(request: &ApiRequest) -> Option<&str> {
    request
        .query
        .iter()
        .find(|(key, _)| key == "cursor")
        .map(|(_, value)| value.as_str())
}
