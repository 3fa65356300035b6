use rand::Rng;

pub fn format_token_amount(amount: u128, decimals: u32) -> String {
    format!(
        "{:.*}",
        decimals as usize,
        amount as f64 / 10f64.powi(decimals as i32)
    )
}

/// Fill a buffer of `length` bytes from the thread-local RNG.
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    rand::rng().fill(&mut bytes[..]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_amounts() {
        assert_eq!(format_token_amount(1_500_000, 6), "1.500000");
        assert_eq!(format_token_amount(0, 2), "0.00");
    }

    #[test]
    fn random_bytes_have_requested_length() {
        assert_eq!(random_bytes(32).len(), 32);
        assert!(random_bytes(0).is_empty());
    }
}
