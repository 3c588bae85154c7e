use hww_core::ChannelError;
use thiserror::Error;

use crate::pending::RequestKind;

/// High-level category for a [`SignerError`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SignerErrorKind {
    /// The serial link failed or went away.
    Transport,
    /// A line could not be framed, encoded or decrypted.
    Protocol,
    /// An encrypted command was attempted before the key exchange finished.
    SecurityPrecondition,
    /// The caller asked for something the current state does not allow.
    Usage,
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("transport error: {0}")]
    Transport(anyhow::Error),
    #[error("protocol error: {0}")]
    Protocol(ChannelError),
    #[error("secure session not established")]
    NoSecureSession,
    #[error("{0} request already in flight")]
    RequestInFlight(RequestKind),
    #[error("no signing flow in progress")]
    NoSigningFlow,
    #[error("a signing flow is in progress")]
    SigningInProgress,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("device disconnected")]
    Disconnected,
}

pub type SignerResult<T> = std::result::Result<T, SignerError>;

impl From<ChannelError> for SignerError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Link(err) => SignerError::Transport(err),
            err if err.is_missing_secret() => SignerError::NoSecureSession,
            err => SignerError::Protocol(err),
        }
    }
}

impl SignerError {
    pub fn kind(&self) -> SignerErrorKind {
        match self {
            Self::Transport(_) | Self::Disconnected => SignerErrorKind::Transport,
            Self::Protocol(_) => SignerErrorKind::Protocol,
            Self::NoSecureSession => SignerErrorKind::SecurityPrecondition,
            Self::RequestInFlight(_)
            | Self::NoSigningFlow
            | Self::SigningInProgress
            | Self::InvalidInput(_) => SignerErrorKind::Usage,
        }
    }

    /// Short uppercase code for logs and scripted callers.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            SignerErrorKind::Transport => "TRANSPORT",
            SignerErrorKind::Protocol => "PROTOCOL",
            SignerErrorKind::SecurityPrecondition => "SECURITY",
            SignerErrorKind::Usage => "USAGE",
        }
    }
}
