//! Payload encryption using AES-256-GCM
//!
//! This module seals capsule payloads under one process-wide master key.
//! Every encryption draws a fresh random nonce, providing:
//! - **Probabilistic output**: equal payloads never produce equal ciphertext
//! - **Tamper evidence**: the GCM tag turns any corruption into a hard error
//! - **Simple storage**: the nonce rides next to the ciphertext as its own column

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;
/// Size of an AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(#[from] hex::FromHexError),
    #[error("invalid nonce length: expected {NONCE_SIZE} bytes, got {0}")]
    InvalidNonceLength(usize),
    #[error("failed to draw random bytes: {0}")]
    Rng(#[from] getrandom::Error),
    #[error("payload failed authentication")]
    Authentication,
}

/// An encrypted payload: the nonce used to seal it plus the ciphertext
/// (which carries the GCM authentication tag at its tail).
///
/// The two parts are persisted as separate columns so a record can be
/// reassembled without any framing logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// The 256-bit master key used to seal capsule payloads
///
/// # Examples
///
/// ```ignore
/// let cipher = Cipher::generate();
///
/// let sealed = cipher.encrypt(b"see you in ten years")?;
/// let recovered = cipher.decrypt(&sealed.iv, &sealed.ciphertext)?;
/// assert_eq!(recovered, b"see you in ten years");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Cipher([u8; KEY_SIZE]);

impl fmt::Debug for Cipher {
    // Never let key bytes reach logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher(..)")
    }
}

impl Cipher {
    /// Create a cipher from raw key bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly `KEY_SIZE` bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        let mut buff = [0; KEY_SIZE];
        buff.copy_from_slice(key);
        Ok(Self(buff))
    }

    /// Create a cipher from a 64-character hex string
    ///
    /// This is the form keys take in config files and environment variables.
    pub fn from_hex(encoded: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(encoded.trim())?;
        Self::new(&bytes)
    }

    /// Generate a new random master key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; KEY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Render the key as lowercase hex, suitable for a config file
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Encrypt a payload under a fresh random nonce
    ///
    /// Two calls with the same plaintext produce different output. Empty
    /// payloads are sealable; the result still carries an authentication tag.
    ///
    /// # Errors
    ///
    /// Returns an error only if the system RNG fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, CipherError> {
        let key = Key::<Aes256Gcm>::from_slice(&self.0);
        let cipher = Aes256Gcm::new(key);

        let mut iv = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut iv)?;
        let nonce = Nonce::from_slice(&iv);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::Authentication)?;

        Ok(Sealed { iv, ciphertext })
    }

    /// Decrypt a payload previously produced by [`Cipher::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The nonce is not exactly `NONCE_SIZE` bytes
    /// - The tag does not verify: the ciphertext or nonce was altered,
    ///   truncated, or sealed under a different key
    pub fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if iv.len() != NONCE_SIZE {
            return Err(CipherError::InvalidNonceLength(iv.len()));
        }

        let key = Key::<Aes256Gcm>::from_slice(&self.0);
        let nonce = Nonce::from_slice(iv);
        let cipher = Aes256Gcm::new(key);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::Authentication)
    }
}
