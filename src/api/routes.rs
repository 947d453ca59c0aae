use std::collections::HashSet;

use axum::{
    http::Method,
    middleware,
    routing::{any, MethodRouter},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::dispatch::{
    apply_cors, gate_method, handle_options, issue_nonce, request_event, strip_head, RouteContext,
};
use super::handlers;
use super::state::WfeState;
use crate::errors::{Error, Result};

/// One ACME resource: where it lives, which methods it serves, and the handler.
pub struct ResourceRoute {
    pub path: &'static str,
    pub methods: Vec<Method>,
    pub handler: MethodRouter<WfeState>,
}

impl ResourceRoute {
    fn new(path: &'static str, methods: &[Method], handler: MethodRouter<WfeState>) -> Self {
        Self { path, methods: methods.to_vec(), handler }
    }
}

pub fn resource_routes() -> Vec<ResourceRoute> {
    vec![
        ResourceRoute::new("/directory", &[Method::GET], any(handlers::directory)),
        ResourceRoute::new("/acme/new-reg", &[Method::POST], any(handlers::new_registration)),
        ResourceRoute::new("/acme/reg/{*id}", &[Method::POST], any(handlers::update_registration)),
        ResourceRoute::new("/acme/new-authz", &[Method::POST], any(handlers::new_authorization)),
        ResourceRoute::new("/acme/authz/{*id}", &[Method::GET], any(handlers::get_authorization)),
        ResourceRoute::new(
            "/acme/challenge/{*slug}",
            &[Method::GET, Method::POST],
            any(handlers::challenge),
        ),
        ResourceRoute::new("/acme/new-cert", &[Method::POST], any(handlers::new_certificate)),
        ResourceRoute::new("/acme/cert/{*serial}", &[Method::GET], any(handlers::get_certificate)),
        ResourceRoute::new(
            "/acme/revoke-cert",
            &[Method::POST],
            any(handlers::revoke_certificate),
        ),
        ResourceRoute::new("/terms", &[Method::GET], any(handlers::terms)),
        ResourceRoute::new("/acme/issuer-cert", &[Method::GET], any(handlers::issuer_certificate)),
        ResourceRoute::new("/build", &[Method::GET], any(handlers::build_id)),
    ]
}

/// Reject tables with empty method sets, relative paths or duplicates.
pub fn validate_routes(routes: &[ResourceRoute]) -> Result<()> {
    let mut seen = HashSet::new();
    for route in routes {
        if !route.path.starts_with('/') {
            return Err(Error::config(format!("Route '{}' is not absolute", route.path)));
        }
        if route.methods.is_empty() {
            return Err(Error::config(format!("Route '{}' serves no methods", route.path)));
        }
        if !seen.insert(route.path) {
            return Err(Error::config(format!("Route '{}' is registered twice", route.path)));
        }
    }
    Ok(())
}

pub fn build_router(wfe: WfeState) -> Result<Router> {
    build_router_with_routes(wfe, resource_routes())
}

pub fn build_router_with_routes(wfe: WfeState, routes: Vec<ResourceRoute>) -> Result<Router> {
    validate_routes(&routes)?;

    let mut router = Router::new();
    for route in routes {
        let context = RouteContext::new(wfe.clone(), route.path, &route.methods);
        let stages = ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(context.clone(), issue_nonce))
            .layer(middleware::from_fn(strip_head))
            .layer(middleware::from_fn_with_state(context.clone(), handle_options))
            .layer(middleware::from_fn_with_state(context.clone(), gate_method))
            .layer(middleware::from_fn_with_state(context, apply_cors));
        let handler = route.handler.layer(stages);
        router = router.route(route.path, handler);
    }

    Ok(router
        .fallback(handlers::index)
        .layer(middleware::from_fn_with_state(wfe.clone(), request_event))
        .layer(TraceLayer::new_for_http())
        .with_state(wfe))
}
