//! AEAD primitives for sealing benchmark payloads (thin wrappers around ring)

use std::fmt;
use std::str::FromStr;

use ring::aead as ring_aead;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = ring_aead::NONCE_LEN;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },
    #[error("cipher setup failed")]
    Setup,
    #[error("system random source failed")]
    Rng,
    #[error("authentication failed")]
    Authentication,
}

impl Error {
    pub fn type_name(&self) -> &'static str {
        match self {
            Error::KeyLength { .. } => "key_length",
            Error::Setup => "cipher_setup",
            Error::Rng => "rng",
            Error::Authentication => "authentication",
        }
    }

    /// True for failures raised while setting up the cipher rather than by the tag check.
    pub fn is_setup(&self) -> bool {
        !matches!(self, Error::Authentication)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cipher {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl Cipher {
    fn algorithm(self) -> &'static ring_aead::Algorithm {
        match self {
            Cipher::Aes256Gcm => &ring_aead::AES_256_GCM,
            Cipher::ChaCha20Poly1305 => &ring_aead::CHACHA20_POLY1305,
        }
    }

    pub fn key_len(self) -> usize {
        self.algorithm().key_len()
    }

    pub fn tag_len(self) -> usize {
        self.algorithm().tag_len()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cipher::Aes256Gcm => "aes-256-gcm",
            Cipher::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cipher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-256-gcm" | "aes256gcm" | "aes" => Ok(Cipher::Aes256Gcm),
            "chacha20-poly1305" | "chacha20poly1305" | "chacha" => Ok(Cipher::ChaCha20Poly1305),
            other => Err(format!("unknown cipher '{other}'")),
        }
    }
}

/// Per-size symmetric key. Length is checked when the key is used, not here.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}

impl SessionKey {
    pub fn generate(cipher: Cipher) -> Result<Self, Error> {
        let mut key = vec![0u8; cipher.key_len()];
        SystemRandom::new().fill(&mut key).map_err(|_| Error::Rng)?;
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub mod aead {
    //! `nonce || ciphertext || tag` sealing with a fresh random nonce per call.

    use super::{Cipher, Error, NONCE_LEN};
    use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey};
    use ring::rand::{SecureRandom, SystemRandom};

    fn less_safe_key(cipher: Cipher, key: &[u8]) -> Result<LessSafeKey, Error> {
        let expected = cipher.key_len();
        if key.len() != expected {
            return Err(Error::KeyLength { expected, actual: key.len() });
        }
        let unbound = UnboundKey::new(cipher.algorithm(), key).map_err(|_| Error::Setup)?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn sealed_len(cipher: Cipher, plaintext_len: usize) -> usize {
        NONCE_LEN + plaintext_len + cipher.tag_len()
    }

    pub fn seal(cipher: Cipher, key: &[u8], pt: &[u8]) -> Result<Vec<u8>, Error> {
        let key = less_safe_key(cipher, key)?;
        let mut nonce = [0u8; NONCE_LEN];
        SystemRandom::new().fill(&mut nonce).map_err(|_| Error::Rng)?;

        // Single allocation: nonce prefix, plaintext encrypted in place, tag appended
        let mut out = Vec::with_capacity(sealed_len(cipher, pt.len()));
        out.extend_from_slice(&nonce);
        out.extend_from_slice(pt);
        let tag = key
            .seal_in_place_separate_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut out[NONCE_LEN..])
            .map_err(|_| Error::Setup)?;
        out.extend_from_slice(tag.as_ref());
        Ok(out)
    }

    pub fn open(cipher: Cipher, key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, Error> {
        let key = less_safe_key(cipher, key)?;
        if sealed.len() < NONCE_LEN + cipher.tag_len() {
            return Err(Error::Authentication);
        }
        let (nonce, ct) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| Error::Authentication)?;
        let mut buf = ct.to_vec();
        let len = key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| Error::Authentication)?
            .len();
        buf.truncate(len);
        Ok(buf)
    }
}
