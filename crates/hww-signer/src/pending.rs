use std::fmt;

use tokio::sync::oneshot;

use crate::error::SignerError;

/// Request kinds that wait for a matching response from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Handshake,
    Login,
    SendPsbt,
    Xpub,
    Sign,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Handshake => "handshake",
            RequestKind::Login => "login",
            RequestKind::SendPsbt => "send psbt",
            RequestKind::Xpub => "xpub",
            RequestKind::Sign => "sign",
        })
    }
}

/// One outstanding request of a kind plus any passive observers.
#[derive(Debug)]
pub(crate) struct PendingSlot<T> {
    kind: RequestKind,
    in_flight: bool,
    waiters: Vec<oneshot::Sender<T>>,
}

impl<T: Clone> PendingSlot<T> {
    pub(crate) fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            in_flight: false,
            waiters: Vec::new(),
        }
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Marks a request as sent. Fails if one of the same kind is still open.
    pub(crate) fn begin(&mut self) -> Result<Pending<T>, SignerError> {
        if self.in_flight {
            return Err(SignerError::RequestInFlight(self.kind));
        }
        self.in_flight = true;
        Ok(self.subscribe())
    }

    /// Waits for the next resolution without starting a request.
    pub(crate) fn subscribe(&mut self) -> Pending<T> {
        self.waiters.retain(|waiter| !waiter.is_closed());
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Pending::Waiting(rx)
    }

    pub(crate) fn resolve(&mut self, value: T) {
        self.in_flight = false;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(value.clone());
        }
    }

    /// Drops every waiter; they observe [`SignerError::Disconnected`].
    pub(crate) fn abort(&mut self) {
        self.in_flight = false;
        self.waiters.clear();
    }
}

/// Result of a request that completes when the device answers.
#[derive(Debug)]
pub enum Pending<T> {
    Ready(T),
    Waiting(oneshot::Receiver<T>),
}

impl<T> Pending<T> {
    pub async fn wait(self) -> Result<T, SignerError> {
        match self {
            Pending::Ready(value) => Ok(value),
            Pending::Waiting(rx) => rx.await.map_err(|_| SignerError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_reaches_request_and_observers() {
        let mut slot = PendingSlot::new(RequestKind::Login);
        let request = slot.begin().unwrap();
        let observer = slot.subscribe();

        slot.resolve(true);
        assert!(!slot.is_in_flight());
        assert!(request.wait().await.unwrap());
        assert!(observer.wait().await.unwrap());
    }

    #[test]
    fn second_request_is_rejected() {
        let mut slot = PendingSlot::<bool>::new(RequestKind::SendPsbt);
        let _first = slot.begin().unwrap();
        assert!(matches!(
            slot.begin(),
            Err(SignerError::RequestInFlight(RequestKind::SendPsbt))
        ));
        slot.resolve(false);
        assert!(slot.begin().is_ok());
    }

    #[tokio::test]
    async fn abort_reports_disconnect() {
        let mut slot = PendingSlot::<u8>::new(RequestKind::Xpub);
        let pending = slot.begin().unwrap();
        slot.abort();
        assert!(matches!(pending.wait().await, Err(SignerError::Disconnected)));
        assert!(slot.begin().is_ok());
    }

    #[tokio::test]
    async fn dropped_observers_are_pruned() {
        let mut slot = PendingSlot::<bool>::new(RequestKind::Xpub);
        let request = slot.begin().unwrap();
        for _ in 0..1_000 {
            drop(slot.subscribe());
        }
        assert_eq!(slot.waiters.len(), 2);

        slot.resolve(true);
        assert!(request.wait().await.unwrap());
    }

    #[tokio::test]
    async fn ready_needs_no_device() {
        assert_eq!(Pending::Ready(7).wait().await.unwrap(), 7);
    }
}
