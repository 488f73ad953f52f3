//! Deterministic hashing for traffic bucketing.
//!
//! Variant assignment and canary routing need "randomness" that is stable
//! across processes and restarts: the same `(scope, key)` pair must always
//! land in the same bucket, with no coordination and no stored assignment
//! table. This module intentionally provides **no** cryptographic guarantees.

/// Deterministic (non-crypto) 64-bit hash of a `(scope, key)` pair.
///
/// Implementation:
/// - FNV-1a over `scope`, a separator byte, then `key` (cheap, stable across platforms)
/// - SplitMix64 finalizer (improves bit diffusion / uniformity)
#[must_use]
pub fn bucket_hash64(scope: &str, key: &str) -> u64 {
    let mut h: u64 = 14695981039346656037u64;
    for b in scope.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211u64);
    }
    // Separator so ("ab","c") and ("a","bc") hash differently.
    h ^= 0x1f;
    h = h.wrapping_mul(1099511628211u64);
    for b in key.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211u64);
    }
    splitmix64(h)
}

/// Map a `(scope, key)` pair onto the unit interval `[0, 1)`.
///
/// Uses the top 53 bits of [`bucket_hash64`] so the full f64 mantissa is
/// exercised. Suitable for cumulative-weight bucket lookup.
#[must_use]
pub fn bucket01(scope: &str, key: &str) -> f64 {
    const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
    (bucket_hash64(scope, key) >> 11) as f64 * SCALE
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket01_is_stable_and_in_range() {
        for i in 0..1000 {
            let u = bucket01("exp-1", &format!("user-{i}"));
            assert!((0.0..1.0).contains(&u));
            assert_eq!(u, bucket01("exp-1", &format!("user-{i}")));
        }
    }

    #[test]
    fn scope_and_key_boundaries_matter() {
        assert_ne!(bucket_hash64("ab", "c"), bucket_hash64("a", "bc"));
        assert_ne!(bucket_hash64("exp-1", "u1"), bucket_hash64("exp-2", "u1"));
    }

    #[test]
    fn bucket01_is_roughly_uniform() {
        let n = 2000;
        let below_half = (0..n)
            .filter(|i| bucket01("uniformity", &format!("k{i}")) < 0.5)
            .count();
        // Binomial(2000, 0.5): ±4 sigma is ~±90.
        assert!((900..=1100).contains(&below_half), "got {below_half}");
    }
}
