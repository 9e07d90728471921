//! World seed resolution.

use rand::Rng;

/// Resolves the configured seed text into a numeric seed.
///
/// Empty text and an explicit `0` pick a random seed. Numeric text is used
/// as-is; anything else hashes to a stable value so the same word always
/// generates the same world.
pub fn resolve_seed(text: &str) -> i64 {
    resolve_seed_with(text, &mut rand::thread_rng())
}

/// [`resolve_seed`] with a caller-supplied random source.
pub fn resolve_seed_with<R: Rng + ?Sized>(text: &str, rng: &mut R) -> i64 {
    let random: i64 = rng.gen();
    if text.is_empty() {
        return random;
    }
    match text.parse::<i64>() {
        Ok(0) => random,
        Ok(seed) => seed,
        Err(_) => i64::from(string_hash(text)),
    }
}

/// 32-bit polynomial hash over UTF-16 code units (`h = 31 * h + unit`).
///
/// This matches the hash worlds were historically seeded with, so a textual
/// seed keeps producing the same terrain.
pub fn string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_numeric_seed() {
        assert_eq!(resolve_seed("12345"), 12345);
        assert_eq!(resolve_seed("-42"), -42);
    }

    #[test]
    fn test_textual_seed_hashes() {
        assert_eq!(string_hash("abc"), 96354);
        assert_eq!(resolve_seed("abc"), 96354);
        assert_eq!(string_hash(""), 0);
    }

    #[test]
    fn test_hash_wraps() {
        // long enough to overflow 32 bits several times
        let h = string_hash("the quick brown fox jumps over the lazy dog");
        assert_eq!(i64::from(h), resolve_seed("the quick brown fox jumps over the lazy dog"));
    }

    #[test]
    fn test_zero_and_empty_are_random() {
        let mut rng = StdRng::seed_from_u64(7);
        let expected: i64 = StdRng::seed_from_u64(7).gen();
        assert_eq!(resolve_seed_with("0", &mut rng), expected);

        let mut rng = StdRng::seed_from_u64(9);
        let expected: i64 = StdRng::seed_from_u64(9).gen();
        assert_eq!(resolve_seed_with("", &mut rng), expected);
    }
}
