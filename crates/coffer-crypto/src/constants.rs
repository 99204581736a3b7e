//! Protocol constants.
//!
//! The SNRP values and the username-id salt are persisted on disk and on the
//! wire; changing any of them orphans every existing account.

/// Envelope version written into every box. The only version in existence.
pub const BOX_ENCRYPTION_TYPE: u32 = 0;

/// AES-CBC initialization vector size in bytes
pub const AES_IV_SIZE: usize = 16;

/// HMAC-SHA256 authentication tag size in bytes
pub const HMAC_TAG_SIZE: usize = 32;

/// Size of freshly generated SNRP salts in bytes
pub const SNRP_SALT_SIZE: usize = 32;

/// Output size of every scrypt derivation in bytes
pub const SCRYPT_OUTPUT_SIZE: usize = 32;

/// Size of login identifiers and login keys in bytes
pub const LOGIN_ID_SIZE: usize = 32;

/// Baseline scrypt cost, also the benchmark setting for device calibration
pub const SNRP_BASE_N: u32 = 16384;

/// Baseline scrypt block size
pub const SNRP_BASE_R: u32 = 8;

/// Baseline scrypt parallelism
pub const SNRP_BASE_P: u32 = 1;

/// Hard ceiling on `n` (2^17), limiting worst-case memory on low-end devices
pub const SNRP_MAX_N: u32 = 131072;

/// Hard ceiling on `r`. Equal to the base value, so tuning happens through
/// `n` and `p`; kept as a separate constant so the budget logic stays
/// adjustable without changing its default output.
pub const SNRP_MAX_R: u32 = 8;

/// Hard ceiling on `p`
pub const SNRP_MAX_P: u32 = 64;

/// Fixed salt for hashing usernames into stable 32-byte identifiers
pub const USERNAME_ID_SALT_HEX: &str =
    "9a8b1f0c4de66ba77a9d3a5c2e81f04b6c33d9e05a12c47f8b960d3e7f5a1c28";

/// TOTP code length in digits
pub const OTP_DIGITS: u32 = 6;

/// TOTP time step in seconds
pub const OTP_PERIOD: u64 = 30;
