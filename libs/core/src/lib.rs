//! Conversational commerce gateway core contracts and value types.
//!
//! This crate exposes the values exchanged between the webhook ingress, the
//! orchestrator and the outbound dispatcher, together with the total
//! normalization function that turns provider payloads into
//! [`CanonicalMessage`]s.
pub mod normalize;
pub mod types;

pub use normalize::*;
pub use types::*;
