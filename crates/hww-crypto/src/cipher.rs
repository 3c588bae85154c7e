use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use zeroize::Zeroizing;

use crate::key::{CryptoError, SharedKey};

pub const BLOCK_LEN: usize = 16;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// AES-256-CBC over length-prefixed, space-padded plaintext.
///
/// Plaintext layout is `"<byte length> <message>"` followed by spaces up to the
/// next block boundary. No PKCS#7 padding is applied.
#[derive(Debug, Clone, Copy)]
pub struct CipherCodec<'a> {
    key: &'a SharedKey,
}

impl<'a> CipherCodec<'a> {
    pub fn new(key: &'a SharedKey) -> Self {
        Self { key }
    }

    /// Codec for the current session key, if one has been agreed.
    pub fn for_session(key: Option<&'a SharedKey>) -> Result<Self, CryptoError> {
        key.map(Self::new).ok_or(CryptoError::NoSecureSession)
    }

    pub fn encode(&self, message: &str, iv: &[u8; BLOCK_LEN]) -> Result<Vec<u8>, CryptoError> {
        let mut buffer = frame_plaintext(message);
        let len = buffer.len();

        Encryptor::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|_| CryptoError::EncryptionFailure)?
            .encrypt_padded_mut::<NoPadding>(&mut buffer[..], len)
            .map_err(|_| CryptoError::EncryptionFailure)?;

        Ok(buffer.to_vec())
    }

    pub fn decode(
        &self,
        ciphertext: &[u8],
        iv: &[u8; BLOCK_LEN],
    ) -> Result<Zeroizing<String>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::InvalidCiphertext(ciphertext.len()));
        }

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        let plaintext = Decryptor::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|_| CryptoError::DecryptionFailure)?
            .decrypt_padded_mut::<NoPadding>(&mut buffer[..])
            .map_err(|_| CryptoError::DecryptionFailure)?;

        extract_message(plaintext)
    }
}

fn frame_plaintext(message: &str) -> Zeroizing<Vec<u8>> {
    let mut buffer = Zeroizing::new(format!("{} {}", message.len(), message).into_bytes());
    let padded = buffer.len().next_multiple_of(BLOCK_LEN);
    buffer.resize(padded, b' ');
    buffer
}

fn extract_message(plaintext: &[u8]) -> Result<Zeroizing<String>, CryptoError> {
    let separator = plaintext
        .iter()
        .position(|&b| b == b' ')
        .ok_or(CryptoError::MalformedPlaintext("missing length prefix"))?;

    let len: usize = std::str::from_utf8(&plaintext[..separator])
        .ok()
        .and_then(|prefix| prefix.parse().ok())
        .ok_or(CryptoError::MalformedPlaintext("length prefix is not a number"))?;

    let start = separator + 1;
    let message = start
        .checked_add(len)
        .and_then(|end| plaintext.get(start..end))
        .ok_or(CryptoError::MalformedPlaintext("length prefix exceeds plaintext"))?;

    let message = std::str::from_utf8(message)
        .map_err(|_| CryptoError::MalformedPlaintext("message is not valid utf-8"))?;
    Ok(Zeroizing::new(message.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key() -> SharedKey {
        SharedKey::from_bytes([0x42; 32])
    }

    proptest! {
        #[test]
        fn decode_recovers_encoded_message(message in "\\PC{0,120}", iv in any::<[u8; 16]>()) {
            let key = key();
            let codec = CipherCodec::new(&key);
            let ciphertext = codec.encode(&message, &iv).unwrap();
            prop_assert_eq!(ciphertext.len() % BLOCK_LEN, 0);
            let decoded = codec.decode(&ciphertext, &iv).unwrap();
            prop_assert_eq!(decoded.as_str(), message.as_str());
        }
    }

    #[test]
    fn plaintext_is_length_prefixed_and_space_padded() {
        assert_eq!(frame_plaintext("hi").as_slice(), b"2 hi            ");
        assert_eq!(frame_plaintext("").len(), BLOCK_LEN);
        // "14 " + 14 bytes fills 17 bytes, so the frame spills into a second block.
        assert_eq!(frame_plaintext("abcdefghijklmn").len(), 2 * BLOCK_LEN);
    }

    #[test]
    fn length_prefix_counts_bytes() {
        assert!(frame_plaintext("é").starts_with(b"2 \xc3\xa9"));
    }

    #[test]
    fn message_may_contain_spaces_and_trailing_padding_is_ignored() {
        let key = key();
        let codec = CipherCodec::new(&key);
        let iv = [9u8; 16];
        let ciphertext = codec.encode("SIGN_PSBT 1 cHNidP8 ", &iv).unwrap();
        assert_eq!(
            codec.decode(&ciphertext, &iv).unwrap().as_str(),
            "SIGN_PSBT 1 cHNidP8 "
        );
    }

    #[test]
    fn iv_changes_ciphertext() {
        let key = key();
        let codec = CipherCodec::new(&key);
        let a = codec.encode("XPUB", &[0u8; 16]).unwrap();
        let b = codec.encode("XPUB", &[1u8; 16]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn no_session_key() {
        assert_eq!(
            CipherCodec::for_session(None).err(),
            Some(CryptoError::NoSecureSession)
        );
    }

    #[test]
    fn rejects_partial_blocks() {
        let key = key();
        let codec = CipherCodec::new(&key);
        assert_eq!(
            codec.decode(&[], &[0u8; 16]).err(),
            Some(CryptoError::InvalidCiphertext(0))
        );
        assert_eq!(
            codec.decode(&[0u8; 17], &[0u8; 16]).err(),
            Some(CryptoError::InvalidCiphertext(17))
        );
    }

    #[test]
    fn wrong_key_yields_malformed_plaintext() {
        let key = key();
        let other = SharedKey::from_bytes([0x24; 32]);
        let iv = [3u8; 16];
        let ciphertext = CipherCodec::new(&key).encode("LOGIN", &iv).unwrap();
        assert!(matches!(
            CipherCodec::new(&other).decode(&ciphertext, &iv),
            Err(CryptoError::MalformedPlaintext(_))
        ));
    }

    #[test]
    fn extract_checks_prefix() {
        assert!(matches!(
            extract_message(b"nospace"),
            Err(CryptoError::MalformedPlaintext(_))
        ));
        assert!(matches!(
            extract_message(b"x hello"),
            Err(CryptoError::MalformedPlaintext(_))
        ));
        assert!(matches!(
            extract_message(b"40 short"),
            Err(CryptoError::MalformedPlaintext(_))
        ));
        assert_eq!(extract_message(b"3 abc   ").unwrap().as_str(), "abc");
    }
}
