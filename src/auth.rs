//! Auth-domain identifiers, secrets, credentials, and nonce providers.

pub mod credential;
pub mod id;
pub mod nonce;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use nonce::*;
pub use secret::*;
