use std::fmt;

use hww_crypto::{EphemeralKey, SharedKey};

/// Per-connection secrets. Both keys wipe themselves when dropped.
#[derive(Default)]
pub struct Session {
    pub shared_secret: Option<SharedKey>,
    pub ephemeral: Option<EphemeralKey>,
    pub authenticated: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_secure(&self) -> bool {
        self.shared_secret.is_some()
    }

    pub fn reset(&mut self) {
        self.shared_secret = None;
        self.ephemeral = None;
        self.authenticated = false;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("secure", &self.shared_secret.is_some())
            .field("key_exchange_pending", &self.ephemeral.is_some())
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_everything() {
        let mut session = Session {
            shared_secret: Some(SharedKey::from_bytes([1; 32])),
            ephemeral: Some(EphemeralKey::generate()),
            authenticated: true,
        };
        session.reset();
        assert!(session.shared_secret.is_none());
        assert!(session.ephemeral.is_none());
        assert!(!session.authenticated);
    }

    #[test]
    fn debug_hides_keys() {
        let session = Session {
            shared_secret: Some(SharedKey::from_bytes([0x5a; 32])),
            ..Session::default()
        };
        let rendered = format!("{session:?}");
        assert!(rendered.contains("secure: true"));
        assert!(!rendered.contains("5a"));
    }
}
