//! Secure-element session manager (spec §4.8, C8): SCP03 session
//! hand-off, RNG, AES-256-CBC, HMAC-SHA256, PBKDF2-HMAC-SHA256,
//! RSA-OAEP, ECDSA-P384, SHA2-384, and the stable device uid.

pub mod key_ids;
pub mod session;
pub mod transport;

pub use key_ids::SeKeyId;
pub use session::SeSession;
pub use transport::{EphemeralTransport, SeTransport};
