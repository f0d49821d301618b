//! Authentication strategies for SSH connections.
//!
//! Sessions authenticate with public keys only. The strategy trait keeps the
//! session code independent of how the key signature is negotiated.
//!
//! # Available Strategies
//!
//! - [`KeyAuth`]: Public key authentication with the batch's decoded key

mod key;
mod traits;

pub use key::{KeyAuth, signature_candidates};
pub use traits::AuthStrategy;
