//! Cryptographic primitives for the serial signer protocol.
//!
//! The host and the device agree on a key with an unauthenticated secp256k1
//! Diffie-Hellman exchange and then encrypt every command with AES-256-CBC.

pub mod cipher;
pub mod exchange;
pub mod key;

pub use cipher::{BLOCK_LEN, CipherCodec};
pub use exchange::{EphemeralKey, derive_shared_key};
pub use key::{CryptoError, SharedKey};
