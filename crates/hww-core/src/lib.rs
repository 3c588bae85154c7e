//! Command channel for serial hardware-wallet signers.
//!
//! Sits between the raw byte link and the signer state machine: it frames
//! lines, runs the key exchange and encrypts or decrypts each command.

pub mod channel;
pub mod command;
pub mod error;
pub mod link;
pub mod session;

pub use channel::{CommandChannel, Inbound, split_command};
pub use command::Command;
pub use error::ChannelError;
pub use hww_codec::{CodecError, EncryptedFrame};
pub use hww_crypto::{CryptoError, EphemeralKey, SharedKey};
pub use link::{LineReader, LineWriter, LinkReader, LinkWriter, StreamReader, StreamWriter, split_stream};
pub use session::Session;
