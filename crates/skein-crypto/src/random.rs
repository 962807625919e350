//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Generate a random fixed-size array.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_array<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Uniform random index in `0..bound`. Returns 0 for an empty range.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_index(bound: usize) -> Result<usize, CryptoError> {
    if bound <= 1 {
        return Ok(0);
    }
    let bound = bound as u64;
    // Rejection sampling keeps the distribution uniform.
    let zone = u64::MAX - (u64::MAX % bound);
    loop {
        let value = u64::from_le_bytes(random_array::<8>()?);
        if value < zone {
            #[allow(clippy::cast_possible_truncation)]
            return Ok((value % bound) as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_array_not_constant() {
        let a: [u8; 32] = random_array().unwrap();
        let b: [u8; 32] = random_array().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_index_bounds() {
        assert_eq!(random_index(0).unwrap(), 0);
        assert_eq!(random_index(1).unwrap(), 0);
        for _ in 0..200 {
            assert!(random_index(7).unwrap() < 7);
        }
    }
}
