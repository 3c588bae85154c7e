use std::fmt;

use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("secure session not established")]
    NoSecureSession,
    #[error("invalid peer public key")]
    InvalidPeerKey,
    #[error("invalid key material")]
    InvalidKeyMaterial,
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    InvalidCiphertext(usize),
    #[error("encryption failure")]
    EncryptionFailure,
    #[error("decryption failure")]
    DecryptionFailure,
    #[error("malformed plaintext: {0}")]
    MalformedPlaintext(&'static str),
}

/// 32-byte symmetric session key. Wiped on drop.
#[derive(Clone)]
pub struct SharedKey(Zeroizing<[u8; 32]>);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut key = Zeroizing::new([0u8; 32]);
        if bytes.len() != key.len() {
            return Err(CryptoError::InvalidKeyMaterial);
        }
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&*other.0).into()
    }
}

impl Eq for SharedKey {}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}
