//! Line framing for the serial signer wire protocol.

pub mod frame;
pub mod line;

pub use frame::{EncryptedFrame, IV_HEX_LEN, IV_LEN};
pub use line::{CodecError, LineDecoder, MAX_LINE_LEN, encode_line};
