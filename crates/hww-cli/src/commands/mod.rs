pub mod common;
pub mod session;
pub mod sign;
pub mod xpub;
