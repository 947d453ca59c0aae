//! # ACME HTTP Surface
//!
//! The web front end: route table and dispatcher stages, envelope
//! verification, the problem-document classifier and the resource handlers.

pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod verify;

pub use error::{classify, ApiError, ErrorDetail, ProblemDetails};
pub use event::{EventHandle, RequestEvent};
pub use routes::{build_router, resource_routes, validate_routes, ResourceRoute};
pub use server::start_wfe_server;
pub use state::{AcmeUrls, WebFrontEnd, WfeState};
pub use verify::{verify_post, VerifiedPost};
