//! # Domain Model
//!
//! Accounts, authorizations, challenges and certificates as exchanged with
//! clients and backend collaborators.

pub mod authorization;
pub mod certificate;
pub mod clock;
pub mod registration;
pub mod resource;

pub use authorization::{
    Authorization, AuthorizationRequest, AuthorizationView, Challenge, ChallengeResponse,
    ChallengeView, Identifier, Status,
};
pub use certificate::{
    serial_to_string, valid_serial, Certificate, CertificateDetails, CertificateRequest,
    CertificateStatus, CsrDetails,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use registration::{Registration, RegistrationPayload};
pub use resource::AcmeResource;
