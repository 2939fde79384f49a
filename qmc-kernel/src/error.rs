/// The language-agnostic error kinds of the coordination kernel (spec §7).
///
/// Every public entry point in every `qmc-*` crate returns this type
/// instead of panicking or throwing; callers match on `kind()` rather than
/// on crate-specific variants, the way the original firmware returns a
/// single `qmc_status_t` from every API.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QmcError {
    #[error("unspecified failure")]
    Err,
    #[error("value not in enumeration or past array bounds")]
    OutOfRange,
    #[error("null or malformed argument")]
    ArgInvalid,
    #[error("operation did not complete in time")]
    Timeout,
    #[error("resource temporarily unavailable")]
    Busy,
    #[error("static slot pool exhausted")]
    NoMem,
    #[error("mutex/event-group contention beyond timeout")]
    Sync,
    #[error("non-blocking receive found nothing")]
    NoMsg,
    #[error("command could not be atomically applied, retry later")]
    Interrupted,
    #[error("caller-provided buffer too small")]
    NoBufs,
    #[error("unexpected internal state")]
    Internal,
    #[error("cryptographic verification failed")]
    SignatureInvalid,
}

pub type QmcResult<T> = Result<T, QmcError>;

impl QmcError {
    /// Whether this error, per spec §7, is always logged by the component
    /// that first observes it regardless of call site.
    pub fn is_fatal_class(&self) -> bool {
        matches!(self, QmcError::SignatureInvalid | QmcError::Internal)
    }
}

/// Thin wrapper so call sites that need a human string (e.g. the REST
/// `{"error": "..."}` body) don't have to re-derive it from `Display`.
impl From<QmcError> for String {
    fn from(e: QmcError) -> Self {
        format!("{e}")
    }
}

/// Helper used by components that bridge `tokio::time::error::Elapsed`
/// (from `tokio::time::timeout`) into the kernel's own `Timeout` kind.
pub fn map_elapsed<T>(r: Result<T, tokio::time::error::Elapsed>) -> QmcResult<T> {
    r.map_err(|_| QmcError::Timeout)
}
