//! One-time passwords: RFC 4226 HOTP and RFC 6238 TOTP.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::constants::{OTP_DIGITS, OTP_PERIOD};
use crate::errors::{CryptoError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Normalize a user-entered base32 OTP secret.
///
/// Strips whitespace, separators, and padding, uppercases, and verifies the
/// result decodes. The cleaned secret is what gets persisted.
pub fn fix_otp_key(key: &str) -> Result<String> {
    let cleaned: String = key
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD
        .decode(cleaned.as_bytes())
        .map_err(|_| CryptoError::BadOtpKey)?;
    Ok(cleaned)
}

/// Compute an RFC 4226 HOTP code for a counter value.
pub fn hotp(secret: &[u8], counter: u64, digits: u32) -> String {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[19] & 0xf) as usize;
    let code = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = code % 10u32.pow(digits);
    format!("{code:0width$}", width = digits as usize)
}

/// Compute the current TOTP code for a base32 secret.
pub fn totp(base32_key: &str) -> Result<String> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    totp_at(base32_key, now)
}

/// Compute the TOTP code for a base32 secret at a given Unix timestamp.
pub fn totp_at(base32_key: &str, timestamp: u64) -> Result<String> {
    let secret = BASE32_NOPAD
        .decode(fix_otp_key(base32_key)?.as_bytes())
        .map_err(|_| CryptoError::BadOtpKey)?;
    Ok(hotp(&secret, timestamp / OTP_PERIOD, OTP_DIGITS))
}
