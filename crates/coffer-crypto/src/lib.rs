//! # coffer-crypto
//!
//! Cryptographic primitives for the coffer login system: authenticated
//! AES-256-CBC envelope boxes, scrypt key stretching with persisted SNRP
//! parameters, HMAC-SHA256, RFC 4226/6238 one-time passwords, and the
//! wire codecs shared by the stash and protocol types.
//!
//! Everything in this crate is synchronous and pure; scheduling concerns
//! (serializing memory-hard scrypt calls, benchmarking) live in the
//! `coffer-core` crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod constants;
pub mod encryption;
pub mod errors;
pub mod hashing;
pub mod otp;
pub mod snrp;
pub mod utils;

pub use encryption::{decrypt, decrypt_text, encrypt, EncryptedBox};
pub use errors::CryptoError;
pub use hashing::hmac_sha256;
pub use otp::{fix_otp_key, hotp, totp, totp_at};
pub use snrp::{calc_snrp_for_target, make_snrp, scrypt_derive, username_id_snrp, Snrp};
pub use utils::random_bytes;
