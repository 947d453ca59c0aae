//! Dispatcher stages.
//!
//! Each ACME resource is wrapped in the same stack of middleware, outermost
//! first:
//!
//! 1. [`request_event`]: creates, finishes and logs the [`RequestEvent`]
//!    (applied router-wide so the index page is covered too)
//! 2. [`issue_nonce`]: best-effort `Replay-Nonce`
//! 3. [`strip_head`]: HEAD is served as GET without a body
//! 4. [`handle_options`]: `Allow` plus CORS preflight, never reaches the handler
//! 5. [`gate_method`]: 405 with `Allow` for anything else not served here
//! 6. [`apply_cors`]: CORS headers on actual requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{warn, Instrument};

use super::error::{ApiError, ProblemRecord};
use super::event::{EventHandle, RequestEvent};
use super::state::WfeState;
use crate::request_span;

pub const REPLAY_NONCE: HeaderName = HeaderName::from_static("replay-nonce");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const EXPOSED_HEADERS: &str = "Link, Replay-Nonce";
const CORS_MAX_AGE: &str = "86400";

/// Route label carried on responses for metrics.
#[derive(Debug, Clone, Copy)]
pub struct EndpointLabel(pub &'static str);

/// What a stage needs to know about the route it wraps.
#[derive(Clone)]
pub struct RouteContext {
    pub wfe: WfeState,
    pub endpoint: &'static str,
    pub methods: Arc<[Method]>,
    pub allow: HeaderValue,
}

impl RouteContext {
    /// `methods` is the declared set; GET implies HEAD.
    pub fn new(wfe: WfeState, endpoint: &'static str, methods: &[Method]) -> Self {
        let mut methods = methods.to_vec();
        if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD);
        }
        let allow = allow_header(&methods);
        Self { wfe, endpoint, methods: methods.into(), allow }
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

pub fn allow_header(methods: &[Method]) -> HeaderValue {
    let joined = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Stage 1: request event.
pub async fn request_event(
    State(wfe): State<WfeState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut event = RequestEvent::new(method.as_str(), &path, wfe.clock.now());
    event.real_ip = header_string(request.headers(), &X_REAL_IP);
    event.user_agent = header_string(request.headers(), &header::USER_AGENT).unwrap_or_default();
    event.client_addr =
        request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);

    let handle = EventHandle::new(event);
    request.extensions_mut().insert(handle.clone());

    let span = request_span!(method, path);
    let response = next.run(request).instrument(span).await;

    if let Some(ProblemRecord(problem)) = response.extensions().get::<ProblemRecord>() {
        handle.add_error(problem.clone());
    }

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    let endpoint = response
        .extensions()
        .get::<EndpointLabel>()
        .map(|EndpointLabel(label)| *label)
        .unwrap_or("/");
    wfe.metrics.record_http_request(method.as_str(), endpoint, status, elapsed.as_secs_f64());
    handle.finish(status, elapsed.as_millis() as u64);

    response
}

/// Stage 2: attach a fresh nonce. Failure to mint one never fails the request.
pub async fn issue_nonce(
    State(context): State<RouteContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    response.extensions_mut().insert(EndpointLabel(context.endpoint));

    match context.wfe.nonces.issue().await {
        Ok(nonce) => match HeaderValue::from_str(&nonce) {
            Ok(value) => {
                response.headers_mut().insert(REPLAY_NONCE, value);
                context.wfe.metrics.record_nonce("issued");
            }
            Err(err) => warn!(error = %err, "Nonce is not a valid header value"),
        },
        Err(err) => {
            warn!(error = %err, "Failed to issue nonce");
            context.wfe.metrics.record_nonce("issue_failed");
        }
    }
    response
}

/// Stage 3: serve HEAD as GET and drop the body.
pub async fn strip_head(mut request: Request<Body>, next: Next) -> Response {
    if request.method() != Method::HEAD {
        return next.run(request).await;
    }

    *request.method_mut() = Method::GET;
    let response = next.run(request).await;
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

/// Stage 4: answer OPTIONS here.
pub async fn handle_options(
    State(context): State<RouteContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(header::ALLOW, context.allow.clone());

    let requested = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_METHOD)
        .and_then(|value| value.to_str().ok())
        .map(|value| Method::from_bytes(value.as_bytes()))
        .unwrap_or(Ok(Method::GET));
    if matches!(&requested, Ok(method) if context.allows(method)) {
        set_cors_headers(
            &context.wfe.allow_origins,
            request.headers(),
            response.headers_mut(),
            Some(&context.allow),
        );
    }
    response
}

/// Stage 5: refuse methods this resource does not serve.
pub async fn gate_method(
    State(context): State<RouteContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if context.allows(request.method()) {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let mut response = ApiError::method_not_allowed("Method not allowed")
        .with_context(method)
        .into_response();
    response.headers_mut().insert(header::ALLOW, context.allow.clone());
    response
}

/// Stage 6: CORS headers for actual requests.
pub async fn apply_cors(
    State(context): State<RouteContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_headers = request.headers().clone();
    let mut response = next.run(request).await;
    set_cors_headers(&context.wfe.allow_origins, &request_headers, response.headers_mut(), None);
    response
}

/// Add CORS headers when the request's `Origin` is allowed. `allow_methods`
/// is only given for preflight responses.
pub fn set_cors_headers(
    allow_origins: &[String],
    request: &HeaderMap,
    response: &mut HeaderMap,
    allow_methods: Option<&HeaderValue>,
) {
    let Some(origin) = request.get(header::ORIGIN).and_then(|value| value.to_str().ok()) else {
        return;
    };

    let mut allowed = false;
    for candidate in allow_origins {
        if candidate == "*" {
            response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            allowed = true;
            break;
        }
        if candidate == origin {
            if let Ok(value) = HeaderValue::from_str(candidate) {
                response.insert(header::VARY, HeaderValue::from_static("Origin"));
                response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                allowed = true;
            }
            break;
        }
    }
    if !allowed {
        return;
    }

    if let Some(methods) = allow_methods {
        response.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
    }
    response.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
    response.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(CORS_MAX_AGE));
}

fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}
