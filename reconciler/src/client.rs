//! Transport boundary to the remote API.
//!
//! [`Transport`] performs one authenticated call and hands back status, `Link` header and raw
//! body; [`HttpTransport`] is the reqwest implementation. [`ApiClient`] sits on top and adds
//! what every resource needs: cancellation, status classification, JSON encoding and
//! paginated listing.

use crate::config::ApiConfig;
use crate::cursor::{CursorError, LinkHeader};
use crate::metrics_defs::{API_REQUEST_DURATION, API_REQUESTS};
use crate::pagination::{self, Page};
use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Every request path is relative to this version prefix under the base URL.
const API_VERSION: &str = "0/";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found: {path}")]
    NotFound { path: String },
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
        body: String,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("could not encode request body: {0}")]
    Encode(serde_json::Error),
    #[error("invalid Link header: {0}")]
    Cursor(#[from] CursorError),
    #[error("invalid request path {path:?}: {source}")]
    InvalidUrl {
        path: String,
        source: url::ParseError,
    },
    #[error("operation cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HealthError {
    #[error("the base URL does not point at the API")]
    BaseUrl,
    #[error("the authentication token was rejected")]
    Token,
    #[error("unexpected status {0} from the API root")]
    UnexpectedStatus(StatusCode),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    /// Raw `Link` header, present on list endpoints.
    pub link: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json(status: StatusCode, body: &Value) -> Self {
        RawResponse {
            status,
            link: None,
            body: body.to_string().into_bytes(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    api_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()?;
        let api_url = config
            .base_url
            .join(API_VERSION)
            .map_err(|source| ApiError::InvalidUrl {
                path: API_VERSION.to_string(),
                source,
            })?;

        Ok(HttpTransport {
            client,
            api_url,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let url = self
            .api_url
            .join(&request.path)
            .map_err(|source| ApiError::InvalidUrl {
                path: request.path.clone(),
                source,
            })?;

        let mut builder = self.client.request(request.method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let link = response
            .headers()
            .get(http::header::LINK)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { status, link, body })
    }
}

/// Shared handle passed to every resource operation.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        ApiClient {
            transport,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Every call made through the returned client fails with [`ApiError::Cancelled`] once
    /// `cancel` fires, including one already in flight.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sends a request and classifies the response: 404 is [`ApiError::NotFound`], any other
    /// status outside 2xx is [`ApiError::Status`] carrying the body.
    pub async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(%method, path = %path, "Request cancelled");
                return Err(ApiError::Cancelled);
            }
            result = self.transport.send(request) => result,
        };
        histogram!(API_REQUEST_DURATION).record(start.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                counter!(API_REQUESTS, "method" => method.to_string(), "status" => "error")
                    .increment(1);
                return Err(e);
            }
        };

        counter!(
            API_REQUESTS,
            "method" => method.to_string(),
            "status" => status_class(response.status)
        )
        .increment(1);
        tracing::debug!(%method, path = %path, status = response.status.as_u16(), "API request");

        if response.status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound { path });
        }
        if !response.status.is_success() {
            return Err(ApiError::Status {
                method,
                path,
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        Ok(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(ApiRequest::get(path)).await?;
        decode(path, &response)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write(Method::POST, path, body).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write(Method::PUT, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    async fn write<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        let response = self
            .send(ApiRequest::new(method, path).with_body(body))
            .await?;
        decode(path, &response)
    }

    /// Fetches one page of a list endpoint. The next cursor comes from the `Link` header.
    pub async fn list_page<T: DeserializeOwned>(
        &self,
        path: &str,
        cursor: Option<String>,
    ) -> Result<Page<T>, ApiError> {
        let mut request = ApiRequest::get(path);
        if let Some(cursor) = &cursor {
            request = request.with_query("cursor", cursor);
        }

        let response = self.send(request).await?;
        let items: Vec<T> = decode(path, &response)?;
        let next_cursor = match &response.link {
            Some(link) => link.parse::<LinkHeader>()?.next_cursor().map(String::from),
            None => None,
        };
        Ok(Page::new(items, next_cursor))
    }

    /// Every item of a list endpoint, across all pages.
    pub async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        pagination::list_all(move |cursor| self.list_page::<T>(path, cursor), None).await
    }

    /// The first item of a list endpoint satisfying `predicate`. Stops paging once found.
    pub async fn find_first<T: DeserializeOwned>(
        &self,
        path: &str,
        predicate: impl Fn(&T) -> bool + Sync,
    ) -> Result<Option<T>, ApiError> {
        pagination::find_first(move |cursor| self.list_page::<T>(path, cursor), predicate).await
    }

    /// Verifies the base URL and token with `GET 0/`. Only a 200 counts as healthy.
    pub async fn health_check(&self) -> Result<(), HealthError> {
        match self.send(ApiRequest::get("")).await {
            Ok(response) if response.status == StatusCode::OK => Ok(()),
            Ok(response) => Err(HealthError::UnexpectedStatus(response.status)),
            Err(ApiError::NotFound { .. }) => Err(HealthError::BaseUrl),
            Err(ApiError::Status {
                status: StatusCode::UNAUTHORIZED,
                ..
            }) => Err(HealthError::Token),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, response: &RawResponse) -> Result<T, ApiError> {
    // Some endpoints answer 204 with nothing at all
    let body: &[u8] = if response.body.is_empty() {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
