//! Authentication helpers for gateway ingress: provider webhook signatures and
//! bearer tokens for the operator-facing endpoints.

pub mod bearer;
pub mod signature;

pub use bearer::{BearerConfig, require_bearer, token_matches};
pub use signature::{SIGNATURE_HEADER, SignatureVerifier};
