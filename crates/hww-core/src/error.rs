use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("link_error: {0}")]
    Link(anyhow::Error),
    #[error("codec_error: {0}")]
    Codec(#[from] hww_codec::CodecError),
    #[error("crypto_error: {0}")]
    Crypto(#[from] hww_crypto::CryptoError),
    #[error("handshake_not_started")]
    HandshakeNotStarted,
    #[error("unknown_command: {0}")]
    UnknownCommand(String),
}

impl From<anyhow::Error> for ChannelError {
    fn from(err: anyhow::Error) -> Self {
        ChannelError::Link(err)
    }
}

impl ChannelError {
    /// True when the error means no shared key has been agreed yet.
    pub fn is_missing_secret(&self) -> bool {
        matches!(
            self,
            ChannelError::Crypto(hww_crypto::CryptoError::NoSecureSession)
        )
    }
}
