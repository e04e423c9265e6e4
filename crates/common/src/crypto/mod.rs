//! Cryptographic primitives for Heirloom
//!
//! Capsule payloads are sealed with a single process-wide AES-256-GCM master
//! key loaded at startup:
//!
//! - **Encryption**: AES-256-GCM with a fresh random nonce per payload
//! - **No key hierarchy**: there is no per-user or per-capsule key material;
//!   the master key plus a capsule row is sufficient to recover a payload
//!
//! The master key is provisioned out-of-band (environment variable or config)
//! and never written to the database.

mod cipher;

pub use cipher::{Cipher, CipherError, Sealed, KEY_SIZE, NONCE_SIZE};
