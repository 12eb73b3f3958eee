use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Opaque 128-bit token rendered as hex
pub fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:032x}", rng.gen::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let first = get_timestamp();
        std::thread::sleep(Duration::from_millis(2));
        assert!(get_timestamp() > first);
    }

    #[test]
    fn test_tokens_are_hex_and_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = generate_token(&mut rng);
        let b = generate_token(&mut rng);

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
