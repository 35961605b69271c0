//! Hash-algorithm collaborator contract consumed by the attack strategies and
//! workers, plus reference implementations over the RustCrypto digests.
//!
//! Implementations must be shareable across worker threads; the engine hands
//! the same `Arc<dyn HashAlgorithm>` to every worker.
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use md4::Md4;
use md5::Md5;
use sha1::Sha1;
use sha2::digest::Digest;
use sha2::{Sha256, Sha512};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("malformed {algorithm} digest: {digest:?}")]
    MalformedDigest {
        algorithm: &'static str,
        digest: String,
    },
    #[error("{0}")]
    Other(String),
}

pub trait HashAlgorithm: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Digest `plaintext`, returning its canonical text form.
    fn hash(&self, plaintext: &str) -> String;

    /// Check `plaintext` against an already normalized `digest`.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        Ok(self.hash(plaintext) == digest)
    }

    /// Canonicalize case and surrounding whitespace.
    fn normalize_hash(&self, digest: &str) -> String {
        digest.trim().to_ascii_lowercase()
    }

    /// Whether offline candidate search makes sense for this algorithm.
    fn is_attackable(&self) -> bool {
        true
    }
}

/// Unsalted digest rendered as lowercase hex.
pub struct HexDigest<D> {
    name: &'static str,
    encode: fn(&str) -> Vec<u8>,
    _digest: PhantomData<fn() -> D>,
}

impl<D> fmt::Debug for HexDigest<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HexDigest").field("name", &self.name).finish()
    }
}

impl<D: Digest> HexDigest<D> {
    fn with_encoding(name: &'static str, encode: fn(&str) -> Vec<u8>) -> Self {
        Self {
            name,
            encode,
            _digest: PhantomData,
        }
    }

    fn hex_len() -> usize {
        <D as Digest>::output_size() * 2
    }
}

impl<D: Digest> HashAlgorithm for HexDigest<D> {
    fn name(&self) -> &str {
        self.name
    }

    fn hash(&self, plaintext: &str) -> String {
        hex::encode(D::digest((self.encode)(plaintext)))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        if digest.len() != Self::hex_len() || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError::MalformedDigest {
                algorithm: self.name,
                digest: digest.to_string(),
            });
        }
        Ok(self.hash(plaintext).eq_ignore_ascii_case(digest))
    }
}

fn utf8(plaintext: &str) -> Vec<u8> {
    plaintext.as_bytes().to_vec()
}

/// NTLM hashes the UTF-16LE encoding of the password.
fn utf16_le(plaintext: &str) -> Vec<u8> {
    plaintext
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

pub fn md5() -> HexDigest<Md5> {
    HexDigest::with_encoding("MD5", utf8)
}

pub fn sha1() -> HexDigest<Sha1> {
    HexDigest::with_encoding("SHA-1", utf8)
}

pub fn sha256() -> HexDigest<Sha256> {
    HexDigest::with_encoding("SHA-256", utf8)
}

pub fn sha512() -> HexDigest<Sha512> {
    HexDigest::with_encoding("SHA-512", utf8)
}

pub fn ntlm() -> HexDigest<Md4> {
    HexDigest::with_encoding("NTLM", utf16_le)
}

/// Names accepted by [`algorithm_by_name`].
pub const ALGORITHM_NAMES: &[&str] = &["md5", "sha1", "sha256", "sha512", "ntlm"];

/// Look up a reference algorithm by case-insensitive name.
pub fn algorithm_by_name(name: &str) -> Option<Arc<dyn HashAlgorithm>> {
    let algorithm: Arc<dyn HashAlgorithm> = match name.to_ascii_lowercase().replace('-', "").as_str() {
        "md5" => Arc::new(md5()),
        "sha1" => Arc::new(sha1()),
        "sha256" => Arc::new(sha256()),
        "sha512" => Arc::new(sha512()),
        "ntlm" => Arc::new(ntlm()),
        _ => return None,
    };
    Some(algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answers() {
        assert_eq!(md5().hash("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(
            sha1().hash("password"),
            "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8"
        );
        assert_eq!(
            sha256().hash("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert_eq!(ntlm().hash("password"), "8846f7eaee8fb117ad06bdd830b7586c");
        assert_eq!(sha512().hash("").len(), 128);
    }

    #[test]
    fn verify_normalized_and_rejects_malformed() {
        let algo = md5();
        let target = algo.normalize_hash("  5F4DCC3B5AA765D61D8327DEB882CF99\n");
        assert_eq!(algo.verify("password", &target), Ok(true));
        assert_eq!(algo.verify("Password", &target), Ok(false));
        assert!(matches!(
            algo.verify("password", "xyz"),
            Err(HashError::MalformedDigest { .. })
        ));
    }

    #[test]
    fn lookup_by_name() {
        for name in ALGORITHM_NAMES {
            let algo = algorithm_by_name(name).unwrap();
            assert!(algo.is_attackable());
        }
        assert_eq!(algorithm_by_name("SHA-256").unwrap().name(), "SHA-256");
        assert!(algorithm_by_name("bcrypt").is_none());
    }
}
