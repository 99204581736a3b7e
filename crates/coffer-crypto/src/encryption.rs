//! Authenticated AES-256-CBC envelope boxes.
//!
//! A box carries `{ encryptionType, iv_hex, data_base64 }` on the wire. The
//! payload inside `data_base64` is the CBC ciphertext (PKCS#7 padded)
//! followed by an HMAC-SHA256 tag over `iv ‖ ciphertext`, keyed with the same
//! 32-byte key as the cipher. Decryption verifies the tag before unpadding,
//! so a box opens only with exactly the key that sealed it.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::codec::{b64, hex_bytes};
use crate::constants::{AES_IV_SIZE, BOX_ENCRYPTION_TYPE, HMAC_TAG_SIZE};
use crate::errors::{CryptoError, Result};
use crate::utils::random_bytes;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// An opaque authenticated-encryption envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBox {
    /// Envelope version; always [`BOX_ENCRYPTION_TYPE`] today.
    #[serde(rename = "encryptionType")]
    pub encryption_type: u32,

    /// CBC initialization vector.
    #[serde(rename = "iv_hex", with = "hex_bytes")]
    pub iv: Vec<u8>,

    /// Ciphertext followed by the authentication tag.
    #[serde(rename = "data_base64", with = "b64")]
    pub data: Vec<u8>,
}

/// Seal `data` under a 32-byte key.
pub fn encrypt(data: &[u8], key: &[u8]) -> Result<EncryptedBox> {
    let iv: [u8; AES_IV_SIZE] = random_bytes();
    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CryptoError::BadKeyLength)?;
    let mut payload = cipher.encrypt_padded_vec_mut::<Pkcs7>(data);
    payload.extend_from_slice(&box_mac(key, &iv, &payload));
    Ok(EncryptedBox {
        encryption_type: BOX_ENCRYPTION_TYPE,
        iv: iv.to_vec(),
        data: payload,
    })
}

/// Open a box, returning the plaintext bytes.
pub fn decrypt(envelope: &EncryptedBox, key: &[u8]) -> Result<Vec<u8>> {
    if envelope.encryption_type != BOX_ENCRYPTION_TYPE {
        return Err(CryptoError::UnsupportedEncryptionType(
            envelope.encryption_type,
        ));
    }
    if envelope.iv.len() != AES_IV_SIZE {
        return Err(CryptoError::CorruptBox("bad IV length"));
    }
    if envelope.data.len() < HMAC_TAG_SIZE {
        return Err(CryptoError::CorruptBox("payload shorter than tag"));
    }
    let (ciphertext, tag) = envelope.data.split_at(envelope.data.len() - HMAC_TAG_SIZE);

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::BadKeyLength)?;
    mac.update(&envelope.iv);
    mac.update(ciphertext);
    mac.verify_slice(tag).map_err(|_| CryptoError::BadAuthTag)?;

    let cipher =
        Aes256CbcDec::new_from_slices(key, &envelope.iv).map_err(|_| CryptoError::BadKeyLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::CorruptBox("bad padding"))
}

/// Open a box whose plaintext is UTF-8 text.
pub fn decrypt_text(envelope: &EncryptedBox, key: &[u8]) -> Result<String> {
    let mut bytes = decrypt(envelope, key)?;
    match String::from_utf8(std::mem::take(&mut bytes)) {
        Ok(text) => Ok(text),
        Err(err) => {
            let mut bytes = err.into_bytes();
            bytes.zeroize();
            Err(CryptoError::BadUtf8)
        }
    }
}

fn box_mac(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> [u8; HMAC_TAG_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(iv);
    mac.update(ciphertext);
    mac.finalize().into_bytes().into()
}
