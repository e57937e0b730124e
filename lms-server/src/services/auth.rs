//! Password hashing and OTP generation
//!
//! Passwords are stored as hex(SHA-256(salt + password)) with a random
//! per-user salt. OTPs are 6 decimal digits.

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Generate a random per-user salt
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hash a password with the given salt
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Check a candidate password against a stored salt and hash
pub fn verify_password(salt: &str, stored_hash: &str, candidate: &str) -> bool {
    hash_password(salt, candidate) == stored_hash
}

/// Generate a 6-digit one-time password
pub fn generate_otp() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let salt = generate_salt();
        let hash = hash_password(&salt, "hunter22");

        assert!(verify_password(&salt, &hash, "hunter22"));
        assert!(!verify_password(&salt, &hash, "hunter2"));
    }

    #[test]
    fn same_password_different_salts_differ() {
        let a = hash_password(&generate_salt(), "hunter22");
        let b = hash_password(&generate_salt(), "hunter22");
        assert_ne!(a, b);
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
