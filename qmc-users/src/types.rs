use bitflags::bitflags;

/// Role-based access control roles (spec §3 `UserConfig`, grounded
/// bit-for-bit on `api_usermanagement.h`'s `usrmgmt_role_t`). The
/// numeric values are preserved even though this crate never persists
/// them anywhere that cares about the exact bit pattern, because the
/// original firmware's role values double as a crude integrity check —
/// a corrupted role field is overwhelmingly unlikely to decode to a
/// valid variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Role {
    /// Unregistered or failed authentication.
    None = 0x0000,
    /// Pseudo-role marking a free `UserConfig` slot.
    Empty = 0x0001,
    Maintenance = 0x555A,
    Operator = 0x5A55,
    /// Authenticated via a mechanical key, not cryptographically —
    /// used for logging SD-card insert/remove/lid-open activity.
    LocalSd = 0xAAA5,
    /// Authenticated via a mechanical key — used for logging
    /// button-triggered motor start/stop activity.
    LocalButton = 0xAA5A,
    /// Used for logging emergency-stop-button events.
    LocalEmergency = 0xA5AA,
}

impl Role {
    pub fn from_u16(v: u16) -> Option<Self> {
        use Role::*;
        const ALL: &[Role] = &[None, Empty, Maintenance, Operator, LocalSd, LocalButton, LocalEmergency];
        ALL.iter().find(|r| **r as u16 == v).copied()
    }

    pub fn as_jwt_str(&self) -> &'static str {
        match self {
            Role::Maintenance => "maintenance",
            _ => "operator",
        }
    }
}

/// Passphrase/username character classes (spec §4.7 "Passphrase
/// policy"). `NAME_REJECTED` names the classes a username must not
/// contain at all.
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CharClass: u8 {
        const UPPERCASE = 1 << 0;
        const LOWERCASE = 1 << 1;
        const NUMBERS   = 1 << 2;
        const SPECIAL   = 1 << 3;
        const CONTROL   = 1 << 4;
        const NON_ASCII = 1 << 5;
    }
}

/// Bits a passphrase must contain (spec §4.7: "classification is the
/// bitwise OR over {...}. A candidate satisfies the policy iff
/// `(classification & REQUIRED) == REQUIRED`").
pub const PASSPHRASE_REQUIRED: CharClass =
    CharClass::from_bits_truncate(CharClass::UPPERCASE.bits() | CharClass::LOWERCASE.bits() | CharClass::NUMBERS.bits());

/// Bits a passphrase must not contain at all.
pub const PASSPHRASE_REJECTED: CharClass = CharClass::from_bits_truncate(CharClass::CONTROL.bits());

/// Bits a username must not contain at all.
pub const NAME_REJECTED: CharClass = CharClass::from_bits_truncate(
    CharClass::SPECIAL.bits() | CharClass::CONTROL.bits() | CharClass::NON_ASCII.bits(),
);

pub const MIN_PASSPHRASE_LENGTH: usize = 10;
pub const MIN_PASSPHRASE_ITERATIONS: u32 = 100_000;
pub const USER_SECRET_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;
pub const USER_NAME_MAX_LENGTH: usize = 32;
pub const PAYLOAD_BUFFER_LENGTH: usize = 256;
pub const LOCKOUT_DURATION_SECS: u64 = 300;
pub const RESERVED_SESSIONS: usize = 2;
pub const MAX_SESSIONS: usize = 16;
/// `HISTORY_HASH_COUNT = CONFIG_MAX_VALUE_LEN / USER_SECRET_LENGTH` (spec §4.7).
pub const HISTORY_HASH_COUNT: usize = qmc_config::CONFIG_MAX_VALUE_LEN / USER_SECRET_LENGTH;

/// Spec §3 `UserConfig`: `role > Empty` iff the slot is occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub name: String,
    pub role: Role,
    pub lockout_timestamp: u64,
    pub iterations: u32,
    pub salt: [u8; SALT_LENGTH],
    pub secret: [u8; USER_SECRET_LENGTH],
    pub validity_timestamp: u64,
}

impl UserConfig {
    pub fn is_occupied(&self) -> bool {
        !matches!(self.role, Role::Empty | Role::None)
    }

    pub fn empty_slot() -> Self {
        Self {
            name: String::new(),
            role: Role::Empty,
            lockout_timestamp: 0,
            iterations: 0,
            salt: [0u8; SALT_LENGTH],
            secret: [0u8; USER_SECRET_LENGTH],
            validity_timestamp: 0,
        }
    }
}

/// Spec §3 `UserSession`: sessions `0..RESERVED_SESSIONS` are reserved
/// for role `Maintenance`; `exp > iat`; only one session per `uid`
/// exists at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub sid: i32,
    pub uid: u8,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
    pub session_secret: [u8; 32],
}

/// `USRMGMT_NO_CURRENT_SESSION`: sentinel for "no session", used by
/// callers authenticating via a mechanical key rather than a token
/// (board buttons, SD-card lid).
pub const NO_CURRENT_SESSION: i32 = -1;
