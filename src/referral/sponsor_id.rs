//! Sponsor ID format: `FX` followed by six digits.

use rand::Rng;

pub const SPONSOR_PREFIX: &str = "FX";
const DIGITS: usize = 6;

/// Trim and uppercase user input
pub fn normalize(input: &str) -> String {
    input.trim().to_uppercase()
}

pub fn is_valid(id: &str) -> bool {
    id.len() == SPONSOR_PREFIX.len() + DIGITS
        && id.starts_with(SPONSOR_PREFIX)
        && id[SPONSOR_PREFIX.len()..].bytes().all(|b| b.is_ascii_digit())
}

pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}{:06}", SPONSOR_PREFIX, rng.gen_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_shape() {
        assert!(is_valid("FX000123"));
        assert!(!is_valid("FX12345"));
        assert!(!is_valid("FX1234567"));
        assert!(!is_valid("fx123456"));
        assert!(!is_valid("FXABCDEF"));
        assert!(is_valid(&normalize("  fx123456 ")));
    }

    #[test]
    fn generated_ids_are_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            assert!(is_valid(&generate(&mut rng)));
        }
    }
}
