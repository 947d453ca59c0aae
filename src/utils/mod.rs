//! Utility functions and helpers

pub mod certificates;

pub use certificates::{
    load_certificate_bundle, load_issuer_certificate, CertificateBundle, CertificateInfo,
};
