//! HTTP to MQTT Request Bridge
//!
//! Turns one HTTP request into at most one publish:
//!
//! 1. `GET <ping_path>` answers a fixed liveness body, no auth, no broker
//! 2. Basic authentication (unless insecure mode), else 401 with a challenge
//! 3. Topic from the URL path (`/a//b/` -> `a/b`), else 400
//! 4. Body size check against `max_payload_size`, else 413
//! 5. Publish through the [`ConnectionManager`]: 200, 503 or 500
//!
//! Every response carries permissive CORS headers.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bus::{ConnectionManager, PublishError};
use crate::config::HttpConfig;
use crate::metrics::Metrics;

mod auth;
mod topic;


pub use auth::{is_authorized, CHALLENGE};
pub use topic::{derive_topic, validate_topic_name};

/// Response body type used by the gateway
pub type GatewayBody = Full<Bytes>;

/// Failures that end a request with 500
#[derive(Debug)]
pub enum GatewayError {
    /// Reading the request body failed
    Body(String),
    /// Building the response body failed
    Serialize(serde_json::Error),
    /// Connected, but the broker client refused the publish
    Publish(PublishError),
    /// The handler panicked
    Panic(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Body(msg) => write!(f, "failed to read request body: {}", msg),
            GatewayError::Serialize(e) => write!(f, "failed to encode response: {}", e),
            GatewayError::Publish(e) => write!(f, "{}", e),
            GatewayError::Panic(msg) => write!(f, "handler panicked: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialize(e)
    }
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct PublishedBody<'a> {
    status: &'static str,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Cow<'a, str>>,
}

fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<GatewayBody>, GatewayError> {
    let body = serde_json::to_vec(body)?;
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// JSON error response; falls back to plain text if encoding fails
pub fn error_response(status: StatusCode, message: &str) -> Response<GatewayBody> {
    json_response(
        status,
        &StatusBody {
            status: "error",
            message,
        },
    )
    .unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
        *response.status_mut() = status;
        response
    })
}

fn unauthorized() -> Response<GatewayBody> {
    let mut response = error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
    response
}

/// Attach the CORS headers every response carries
pub fn with_cors(mut response: Response<GatewayBody>) -> Response<GatewayBody> {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

/// Per-request bridge from HTTP to the broker
pub struct Gateway {
    config: HttpConfig,
    manager: Arc<ConnectionManager>,
    metrics: Arc<Metrics>,
}

impl Gateway {
    pub fn new(config: HttpConfig, manager: Arc<ConnectionManager>, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            manager,
            metrics,
        }
    }

    /// Handle one request. Never fails: internal errors become 500.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let response = match self.route(req).await {
            Ok(response) => response,
            Err(e) => self.internal_error(&method, &e),
        };
        self.finish(response)
    }

    /// Turn an internal failure into a 500
    pub fn internal_error(&self, method: &Method, e: &GatewayError) -> Response<GatewayBody> {
        error!("{} request error: {}", method, e);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Internal server error: {}", e),
        )
    }

    /// Add CORS headers and count the response
    pub fn finish(&self, response: Response<GatewayBody>) -> Response<GatewayBody> {
        let response = with_cors(response);
        self.metrics.record_response(response.status().as_u16());
        response
    }

    async fn route<B>(&self, req: Request<B>) -> Result<Response<GatewayBody>, GatewayError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();

        if method == Method::GET && req.uri().path() == self.config.ping_path {
            info!("Heartbeat received on {}", self.config.ping_path);
            return json_response(
                StatusCode::OK,
                &StatusBody {
                    status: "alive",
                    message: "Server is running",
                },
            );
        }

        if method == Method::OPTIONS {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NO_CONTENT;
            return Ok(response);
        }

        if method != Method::GET && method != Method::POST {
            return Ok(error_response(
                StatusCode::NOT_IMPLEMENTED,
                &format!("Unsupported method ('{}')", method),
            ));
        }

        if !self.config.allow_insecure
            && !is_authorized(
                req.headers().get(header::AUTHORIZATION),
                &self.config.username,
                &self.config.password,
            )
        {
            debug!("Rejected {} {}: bad or missing credentials", method, req.uri().path());
            return Ok(unauthorized());
        }

        let topic = derive_topic(req.uri().path());
        if let Err(reason) = validate_topic_name(&topic) {
            debug!("Rejected path '{}': {}", req.uri().path(), reason);
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "Invalid topic format",
            ));
        }

        let payload = if method == Method::POST {
            match self.read_body(req).await? {
                Some(body) => body,
                None => {
                    return Ok(error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "Payload too large",
                    ))
                }
            }
        } else {
            Bytes::new()
        };

        match self.manager.publish(&topic, payload.clone(), false).await {
            Ok(()) => {
                self.metrics.bridged_publishes.inc();
                info!("{} -> '{}' ({} bytes)", method, topic, payload.len());
                let payload = (method == Method::POST).then(|| String::from_utf8_lossy(&payload));
                json_response(
                    StatusCode::OK,
                    &PublishedBody {
                        status: "success",
                        topic: &topic,
                        payload,
                    },
                )
            }
            Err(PublishError::Unavailable(e)) => {
                warn!("Dropping message for '{}': {}", topic, e);
                Ok(error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "MQTT connection could not be established.",
                ))
            }
            Err(e) => Err(GatewayError::Publish(e)),
        }
    }

    /// Read the body, or `None` if it exceeds `max_payload_size`.
    /// Never buffers more than the limit.
    async fn read_body<B>(&self, req: Request<B>) -> Result<Option<Bytes>, GatewayError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let limit = self.config.max_payload_size;

        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit as u64) {
            return Ok(None);
        }

        match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => Ok(Some(collected.to_bytes())),
            Err(e) if e.is::<LengthLimitError>() => Ok(None),
            Err(e) => Err(GatewayError::Body(e.to_string())),
        }
    }
}
