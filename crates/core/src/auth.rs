use rand::RngCore;
use rand::rngs::OsRng;

pub const SALT_LEN: usize = 16;

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// blake3(salt || password). The salt is per-account, so equal passwords
/// never share a hash.
pub fn hash_password(password: &str, salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}

pub fn verify_password(password: &str, salt: &[u8; SALT_LEN], expected: &[u8; 32]) -> bool {
    hash_password(password, salt) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let salt = generate_salt();
        let hash = hash_password("hunter2", &salt);
        assert!(verify_password("hunter2", &salt, &hash));
        assert!(!verify_password("hunter3", &salt, &hash));
    }

    #[test]
    fn equal_passwords_with_different_salts_hash_differently() {
        let a = generate_salt();
        let b = generate_salt();
        assert_ne!(a, b);
        assert_ne!(hash_password("root", &a), hash_password("root", &b));
    }
}
