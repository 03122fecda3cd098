use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const AVATAR_SIZE: u32 = 250;

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Default avatar for a freshly registered account, keyed by the SHA-256 of the normalized email.
pub(crate) fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(normalize_email(email).as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?s={}&d=identicon",
        hex::encode(digest),
        AVATAR_SIZE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn gravatar_is_deterministic_and_case_insensitive() {
        let a = gravatar_url("A@X.com ");
        let b = gravatar_url("a@x.com");
        assert_eq!(a, b);
        assert!(a.starts_with("https://www.gravatar.com/avatar/"));
        assert!(a.ends_with("?s=250&d=identicon"));
        // 64 hex chars of SHA-256
        let hash = a
            .trim_start_matches("https://www.gravatar.com/avatar/")
            .split('?')
            .next()
            .unwrap();
        assert_eq!(hash.len(), 64);
        assert_ne!(gravatar_url("b@x.com"), b);
    }
}
