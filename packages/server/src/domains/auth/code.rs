//! One-time code generation.

use ring::rand::{SecureRandom, SystemRandom};

/// Width of a one-time code in digits.
pub const CODE_LEN: usize = 6;

const CODE_SPACE: u32 = 1_000_000;

// Largest multiple of CODE_SPACE that fits in a u32; draws at or above it are
// rejected so the result stays uniform.
const REJECT_AT: u32 = u32::MAX - (u32::MAX % CODE_SPACE);

/// Generate a zero-padded numeric one-time code, uniformly distributed over
/// `000000..=999999`, from the system CSPRNG.
///
/// The code is only returned, never persisted here; the issuer owns its
/// lifecycle.
pub fn generate_code() -> anyhow::Result<String> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; 4];
    loop {
        rng.fill(&mut buf)
            .map_err(|_| anyhow::anyhow!("system RNG unavailable"))?;
        let n = u32::from_be_bytes(buf);
        if n < REJECT_AT {
            return Ok(format!("{:06}", n % CODE_SPACE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_ascii_digits() {
        for _ in 0..256 {
            let code = generate_code().unwrap();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn codes_vary() {
        let first = generate_code().unwrap();
        let distinct = (0..64).any(|_| generate_code().unwrap() != first);
        assert!(distinct, "64 consecutive identical codes");
    }
}
