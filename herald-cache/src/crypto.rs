//! Credential field encryption.
//!
//! AES-256-GCM authenticated encryption over individual secret values.
//! Encrypted fields are stored as `enc:<hex>` strings carrying
//! nonce (12 bytes) || ciphertext || tag (16 bytes); the prefix lets the
//! cache tell encrypted values from plaintext defaults.

use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use herald_core::error::CacheError;

/// AES-256-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

const ENC_PREFIX: &str = "enc:";

/// A nonce sequence that yields a single nonce.
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.nonce
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// AES-256-GCM cipher over credential fields.
///
/// The key is zeroed from memory when the cipher is dropped.
pub struct Cipher {
    key: [u8; KEY_SIZE],
}

impl Cipher {
    /// Creates a cipher with the given 32-byte key.
    #[must_use]
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Encrypts raw bytes.
    ///
    /// Returns nonce || ciphertext || tag.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CacheError> {
        let rng = SystemRandom::new();
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill(&mut nonce).map_err(|_| CacheError::Crypto {
            reason: "failed to generate nonce".to_string(),
        })?;

        let unbound_key =
            UnboundKey::new(&aead::AES_256_GCM, &self.key).map_err(|_| CacheError::Crypto {
                reason: "failed to create encryption key".to_string(),
            })?;
        let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce));

        let mut buffer = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::from(aad), &mut buffer)
            .map_err(|_| CacheError::Crypto {
                reason: "encryption failed".to_string(),
            })?;

        let mut output = Vec::with_capacity(NONCE_SIZE + buffer.len());
        output.extend_from_slice(&nonce);
        output.append(&mut buffer);
        Ok(output)
    }

    /// Decrypts nonce || ciphertext || tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is malformed or authentication
    /// fails.
    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CacheError> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CacheError::Crypto {
                reason: "ciphertext too short".to_string(),
            });
        }

        let nonce: [u8; NONCE_SIZE] =
            ciphertext[..NONCE_SIZE]
                .try_into()
                .map_err(|_| CacheError::Crypto {
                    reason: "invalid nonce".to_string(),
                })?;

        let unbound_key =
            UnboundKey::new(&aead::AES_256_GCM, &self.key).map_err(|_| CacheError::Crypto {
                reason: "failed to create decryption key".to_string(),
            })?;
        let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce));

        let mut buffer = ciphertext[NONCE_SIZE..].to_vec();
        let plaintext = opening_key
            .open_in_place(Aad::from(aad), &mut buffer)
            .map_err(|_| CacheError::Crypto {
                reason: "decryption failed, authentication error".to_string(),
            })?;

        Ok(plaintext.to_vec())
    }

    /// Encrypts a string field into storage form (`enc:<hex>`).
    ///
    /// Already-encrypted values pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt_field(&self, value: &str) -> Result<String, CacheError> {
        if value.starts_with(ENC_PREFIX) {
            return Ok(value.to_string());
        }
        let encrypted = self.encrypt(value.as_bytes(), b"")?;
        Ok(format!("{ENC_PREFIX}{}", encode_hex(&encrypted)))
    }

    /// Decrypts a storage-form field back to plaintext.
    ///
    /// Plaintext values (no `enc:` prefix) pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex or ciphertext is invalid.
    pub fn decrypt_field(&self, value: &str) -> Result<String, CacheError> {
        let Some(hex) = value.strip_prefix(ENC_PREFIX) else {
            return Ok(value.to_string());
        };
        let bytes = decode_hex(hex).ok_or_else(|| CacheError::Crypto {
            reason: "invalid hex in encrypted field".to_string(),
        })?;
        let plaintext = self.decrypt(&bytes, b"")?;
        String::from_utf8(plaintext).map_err(|_| CacheError::Crypto {
            reason: "decrypted value is not UTF-8".to_string(),
        })
    }
}

impl Drop for Cipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
