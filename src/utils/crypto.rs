// Password hashing and checksum helpers

use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Salted password hash in the stored format `sha256$<salt>$<hex>`.
///
/// The admin account is first seeded with the plain password (other seed
/// structures reference it), then rehashed in place at the end of the
/// mandatory pipeline.
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    hash_password_with_salt(password, &salt)
}

pub fn hash_password_with_salt(password: &str, salt: &str) -> String {
    let digest = sha256_hex(format!("{}{}", salt, password).as_bytes());
    format!("sha256${}${}", salt, digest)
}

/// Verify a password against a stored `sha256$<salt>$<hex>` hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("sha256"), Some(salt), Some(_)) => hash_password_with_salt(password, salt) == stored,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("S3cretPass");
        assert!(hash.starts_with("sha256$"));
        assert!(verify_password("S3cretPass", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("x", "not-a-hash"));
        assert!(!verify_password("x", "md5$salt$digest"));
    }
}
