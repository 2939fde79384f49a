/// Object ids of keys/files held inside the secure element, named so the
/// rest of the workspace references keys symbolically. Only the subset
/// this workspace actually touches (config-at-rest, the log pipeline's
/// RSA/ECDSA pair, the device identity, and the app auth object used to
/// bind the user-session JWT secret) is carried; the PKI/cert-chain ids
/// for OTA issuer verification live entirely in the out-of-scope SBL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SeKeyId {
    /// AES128 key binding the application's user-authentication session.
    AppAuthObject = 0x0000_001E,
    /// AES256 key used for configuration-at-rest encryption (C6).
    ConfigEnc = 0x0000_0020,
    /// BrainpoolP512r1/NISTP-384 device identity key pair, used to sign
    /// exported log records (C5).
    DevIdKeyPair = 0x0000_0014,
    /// RSA3072 public key of the off-device log reader; log records are
    /// RSA-OAEP encrypted to this key (C5).
    LogReaderIdPubKey = 0x0000_0008,
    /// Stable 32-byte device identifier surfaced as `se_get_uid()`.
    DeviceIdFull = 0x0000_0026,
}
