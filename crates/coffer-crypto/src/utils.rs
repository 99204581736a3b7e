//! Shared helpers.

use rand::RngCore;

/// Generate cryptographically secure random bytes.
///
/// Uses the system CSPRNG to fill a fixed-size array.
///
/// # Example
///
/// ```
/// use coffer_crypto::random_bytes;
///
/// let iv: [u8; 16] = random_bytes();
/// let login_key: [u8; 32] = random_bytes();
/// ```
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_different() {
        let a: [u8; 32] = random_bytes();
        let b: [u8; 32] = random_bytes();
        assert_ne!(a, b, "random bytes should be different");
    }
}
