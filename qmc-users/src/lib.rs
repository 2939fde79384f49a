//! User & session manager: passphrase policy, PBKDF2 hashing and
//! history, account lockout, and JWT-like session tokens (spec §4.7,
//! C7).

pub mod manager;
pub mod policy;
pub mod sinks;
pub mod token;
pub mod types;

pub use manager::UserManager;
pub use policy::{classify, name_is_valid, passphrase_satisfies_policy};
pub use sinks::{NoopUserEventSink, UserEventSink};
pub use token::{decode, encode, DecodedToken, EncodedToken};
pub use types::{
    CharClass, Role, UserConfig, UserSession, HISTORY_HASH_COUNT, LOCKOUT_DURATION_SECS,
    MAX_SESSIONS, MIN_PASSPHRASE_ITERATIONS, MIN_PASSPHRASE_LENGTH, NAME_REJECTED, NO_CURRENT_SESSION,
    PASSPHRASE_REJECTED, PASSPHRASE_REQUIRED, PAYLOAD_BUFFER_LENGTH, RESERVED_SESSIONS, SALT_LENGTH,
    USER_NAME_MAX_LENGTH, USER_SECRET_LENGTH,
};
