use crate::line::CodecError;

pub const IV_LEN: usize = 16;
pub const IV_HEX_LEN: usize = IV_LEN * 2;

/// Encrypted wire frame: `hex(ciphertext) || hex(iv)` on a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
}

impl EncryptedFrame {
    pub fn new(ciphertext: Vec<u8>, iv: [u8; IV_LEN]) -> Self {
        Self { ciphertext, iv }
    }

    /// Splits a line into ciphertext and the trailing 32-hex-char IV.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let line = line.trim();
        if line.len() <= IV_HEX_LEN {
            return Err(CodecError::FrameTooShort(line.len()));
        }

        let split = line.len() - IV_HEX_LEN;
        if !line.is_char_boundary(split) {
            return Err(CodecError::InvalidHex);
        }
        let (ciphertext_hex, iv_hex) = line.split_at(split);

        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| CodecError::InvalidHex)?;
        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(iv_hex, &mut iv).map_err(|_| CodecError::InvalidHex)?;

        Ok(Self { ciphertext, iv })
    }

    pub fn to_line(&self) -> String {
        let mut line = hex::encode(&self.ciphertext);
        line.push_str(&hex::encode(self.iv));
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iv_is_taken_from_the_tail() {
        let frame = EncryptedFrame::new(vec![0xde, 0xad, 0xbe, 0xef], [0x11; IV_LEN]);
        let line = frame.to_line();
        assert_eq!(line.len(), 8 + IV_HEX_LEN);
        assert!(line.ends_with(&"11".repeat(IV_LEN)));
        assert_eq!(EncryptedFrame::parse(&line), Ok(frame));
    }

    #[test]
    fn accepts_uppercase_hex() {
        let line = format!("ABCD{}", "0F".repeat(IV_LEN));
        let frame = EncryptedFrame::parse(&line).unwrap();
        assert_eq!(frame.ciphertext, vec![0xab, 0xcd]);
        assert_eq!(frame.iv, [0x0f; IV_LEN]);
    }

    #[test]
    fn rejects_missing_ciphertext_or_short_iv() {
        assert_eq!(
            EncryptedFrame::parse(&"00".repeat(IV_LEN)),
            Err(CodecError::FrameTooShort(IV_HEX_LEN))
        );
        assert_eq!(
            EncryptedFrame::parse("abcdef"),
            Err(CodecError::FrameTooShort(6))
        );
    }

    #[test]
    fn rejects_non_hex() {
        let line = format!("zz{}", "00".repeat(IV_LEN));
        assert_eq!(EncryptedFrame::parse(&line), Err(CodecError::InvalidHex));

        let odd = format!("abc{}", "00".repeat(IV_LEN));
        assert_eq!(EncryptedFrame::parse(&odd), Err(CodecError::InvalidHex));

        let multibyte = format!("ab{}é", "0".repeat(IV_HEX_LEN - 1));
        assert_eq!(EncryptedFrame::parse(&multibyte), Err(CodecError::InvalidHex));
    }
}
