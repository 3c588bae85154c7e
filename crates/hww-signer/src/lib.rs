//! Host-side session state machine for serial hardware-wallet signers.

pub mod error;
mod pending;
mod signer;
mod state;
pub mod types;

pub use error::{SignerError, SignerErrorKind, SignerResult};
pub use pending::{Pending, RequestKind};
pub use signer::HwwSigner;
pub use state::Phase;
pub use types::{
    Network, Notice, NoticeLevel, Notifier, SignedPsbt, SignerConfig, SignerEvent, SigningFlow,
    TracingNotifier, Transaction, TxOutput, XpubResult,
};
