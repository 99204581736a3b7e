//! Scrypt parameters (SNRP) and the device-calibrated parameter chooser.

use scrypt::Params;
use serde::{Deserialize, Serialize};

use crate::codec::hex_bytes;
use crate::constants::{
    SCRYPT_OUTPUT_SIZE, SNRP_BASE_N, SNRP_BASE_P, SNRP_BASE_R, SNRP_MAX_N, SNRP_MAX_P, SNRP_MAX_R,
    SNRP_SALT_SIZE, USERNAME_ID_SALT_HEX,
};
use crate::errors::{CryptoError, Result};
use crate::utils::random_bytes;

/// Scrypt parameters, persisted verbatim on disk and over the wire
/// alongside every scrypt-derived secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snrp {
    /// Salt bytes, hex on the wire.
    #[serde(rename = "salt_hex", with = "hex_bytes")]
    pub salt: Vec<u8>,
    /// CPU/memory cost; must be a power of two.
    pub n: u32,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
}

impl Snrp {
    /// The benchmark baseline: `n = 16384, r = 8, p = 1`.
    pub fn base(salt: Vec<u8>) -> Self {
        Snrp {
            salt,
            n: SNRP_BASE_N,
            r: SNRP_BASE_R,
            p: SNRP_BASE_P,
        }
    }
}

/// Fixed parameters for hashing usernames into stable 32-byte identifiers.
///
/// The salt is a protocol constant: every device must derive the same
/// `loginId` / `userId` for the same normalized username.
pub fn username_id_snrp() -> Snrp {
    Snrp {
        salt: hex::decode(USERNAME_ID_SALT_HEX).expect("constant salt is valid hex"),
        n: SNRP_BASE_N,
        r: 1,
        p: 1,
    }
}

/// Run scrypt over `data` with the given parameters, producing 32 bytes.
pub fn scrypt_derive(data: &[u8], snrp: &Snrp) -> Result<[u8; SCRYPT_OUTPUT_SIZE]> {
    if !snrp.n.is_power_of_two() || snrp.n < 2 {
        return Err(CryptoError::BadScryptParams);
    }
    let log_n = snrp.n.ilog2() as u8;
    let params = Params::new(log_n, snrp.r, snrp.p, SCRYPT_OUTPUT_SIZE)
        .map_err(|_| CryptoError::BadScryptParams)?;
    let mut out = [0u8; SCRYPT_OUTPUT_SIZE];
    scrypt::scrypt(data, &snrp.salt, &params, &mut out)
        .map_err(|_| CryptoError::BadScryptParams)?;
    Ok(out)
}

/// Choose SNRP values for a target latency, given the measured time of one
/// baseline run on this device.
///
/// Starts from the baseline and spends the remaining time budget in order:
/// `r` linearly (capped at [`SNRP_MAX_R`]), then `n` one doubling at a time
/// (capped at [`SNRP_MAX_N`]), then `p` linearly (capped at [`SNRP_MAX_P`]).
/// Integer division floors every step. A zero benchmark means the device
/// could not be measured; the answer is then the fixed worst-case cap.
pub fn calc_snrp_for_target(salt: Vec<u8>, bench_ms: u64, target_ms: u64) -> Snrp {
    if bench_ms == 0 {
        return Snrp {
            salt,
            n: SNRP_MAX_N,
            r: SNRP_BASE_R,
            p: SNRP_MAX_P,
        };
    }

    let mut n = SNRP_BASE_N;
    let mut r = SNRP_BASE_R;
    let mut p = SNRP_BASE_P;
    let mut time_used = bench_ms;

    // Each unit of r costs one eighth of the benchmark.
    if time_used < target_ms {
        let per_r = (bench_ms / u64::from(SNRP_BASE_R)).max(1);
        let extra = ((target_ms - time_used) / per_r) as u32;
        let new_r = r.saturating_add(extra).min(SNRP_MAX_R);
        time_used += u64::from(new_r - r) * per_r;
        r = new_r;
    }

    // Doubling n doubles the time.
    while n < SNRP_MAX_N && time_used * 2 <= target_ms {
        n *= 2;
        time_used *= 2;
    }

    // Each additional unit of p costs a full pass at the current n and r.
    if time_used < target_ms {
        let extra = ((target_ms - time_used) / time_used.max(1)) as u32;
        p = p.saturating_add(extra).min(SNRP_MAX_P);
    }

    Snrp { salt, n, r, p }
}

/// [`calc_snrp_for_target`] with a fresh 32-byte random salt.
pub fn make_snrp(bench_ms: u64, target_ms: u64) -> Snrp {
    calc_snrp_for_target(random_bytes::<SNRP_SALT_SIZE>().to_vec(), bench_ms, target_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrypt_is_deterministic() {
        let snrp = Snrp {
            salt: vec![1; 32],
            n: 1024,
            r: 1,
            p: 1,
        };
        let a = scrypt_derive(b"password", &snrp).unwrap();
        let b = scrypt_derive(b"password", &snrp).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, scrypt_derive(b"other", &snrp).unwrap());
    }

    #[test]
    fn test_scrypt_rejects_non_power_of_two() {
        let snrp = Snrp {
            salt: vec![1; 32],
            n: 1000,
            r: 1,
            p: 1,
        };
        assert_eq!(
            scrypt_derive(b"x", &snrp),
            Err(CryptoError::BadScryptParams)
        );
    }

    #[test]
    fn test_username_id_snrp_is_stable() {
        let snrp = username_id_snrp();
        assert_eq!(snrp.salt.len(), 32);
        assert_eq!((snrp.n, snrp.r, snrp.p), (16384, 1, 1));
    }

    #[test]
    fn test_chooser_zero_bench_returns_cap() {
        let snrp = calc_snrp_for_target(vec![0; 32], 0, 2000);
        assert_eq!((snrp.n, snrp.r, snrp.p), (131072, 8, 64));
    }

    #[test]
    fn test_chooser_slow_device_keeps_baseline() {
        // Device already slower than the target: nothing to spend.
        let snrp = calc_snrp_for_target(vec![0; 32], 3000, 2000);
        assert_eq!((snrp.n, snrp.r, snrp.p), (16384, 8, 1));
    }

    #[test]
    fn test_chooser_r_stays_at_base() {
        // The r cap equals the base value, so every budget lands in n and p.
        for bench_ms in [1, 5, 50, 500, 1999] {
            let snrp = calc_snrp_for_target(vec![0; 32], bench_ms, 2000);
            assert_eq!(snrp.r, 8, "bench {bench_ms}");
        }
    }

    #[test]
    fn test_chooser_fast_device_maxes_n_then_p() {
        // 1 ms baseline, 2000 ms target: n hits its cap (3 doublings),
        // then p soaks up the rest.
        let snrp = calc_snrp_for_target(vec![0; 32], 1, 2000);
        assert_eq!(snrp.n, 131072);
        assert!(snrp.p > 1 && snrp.p <= 64);
    }

    #[test]
    fn test_chooser_n_doubles_within_budget() {
        // 400 ms baseline, 2000 ms target: two doublings fit (1600 ms), a
        // third (3200 ms) does not.
        let snrp = calc_snrp_for_target(vec![0; 32], 400, 2000);
        assert_eq!(snrp.n, 65536);
        assert_eq!(snrp.p, 1);
    }

    #[test]
    fn test_snrp_wire_format() {
        let snrp = Snrp {
            salt: vec![0xab; 4],
            n: 16384,
            r: 8,
            p: 1,
        };
        let json = serde_json::to_value(&snrp).unwrap();
        assert_eq!(json["salt_hex"], "abababab");
        assert_eq!(json["n"], 16384);
        let back: Snrp = serde_json::from_value(json).unwrap();
        assert_eq!(back, snrp);
    }
}
