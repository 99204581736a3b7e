//! Error types for cryptographic operations.

use thiserror::Error;

/// Failures surfaced by the primitives in this crate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The ciphertext or its tag has been altered, or the wrong key was used.
    #[error("ciphertext failed authentication")]
    BadAuthTag,

    /// A key or IV had the wrong length for the requested operation.
    #[error("invalid key material length")]
    BadKeyLength,

    /// The box payload is too short or structurally invalid.
    #[error("corrupt box payload: {0}")]
    CorruptBox(&'static str),

    /// The box was produced by an envelope version this build does not know.
    #[error("unsupported encryption type {0}")]
    UnsupportedEncryptionType(u32),

    /// SNRP values outside what the scrypt implementation accepts.
    #[error("invalid scrypt parameters")]
    BadScryptParams,

    /// A TOTP secret that is not valid base32.
    #[error("invalid base32 OTP key")]
    BadOtpKey,

    /// A decrypted payload that was expected to be text is not UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    BadUtf8,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CryptoError>;
