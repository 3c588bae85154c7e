use std::sync::Arc;

use hww_core::{Command, LineReader, LineWriter, LinkReader, LinkWriter};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    error::{SignerError, SignerResult},
    pending::Pending,
    state::{Phase, SignerState},
    types::{
        Notice, Notifier, SignedPsbt, SignerConfig, SignerEvent, SigningFlow, Transaction,
        XpubResult,
    },
};

type BoxedWriter = LineWriter<Box<dyn LinkWriter>>;

/// Cloneable handle to one signer connection.
///
/// Spawn [`HwwSigner::run`] on the reading half of the link, then issue
/// commands from any task. Responses are matched by command tag.
#[derive(Clone)]
pub struct HwwSigner {
    inner: Arc<Inner>,
}

struct Inner {
    config: SignerConfig,
    state: Mutex<SignerState>,
    writer: AsyncMutex<BoxedWriter>,
    notifier: Arc<dyn Notifier>,
}

impl HwwSigner {
    pub fn new<W, N>(config: SignerConfig, writer: W, notifier: N) -> Self
    where
        W: LinkWriter + 'static,
        N: Notifier + 'static,
    {
        let writer: Box<dyn LinkWriter> = Box::new(writer);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(SignerState::default()),
                writer: AsyncMutex::new(LineWriter::new(writer)),
                notifier: Arc::new(notifier),
            }),
        }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.inner.config
    }

    /// Starts the key exchange. Resolves `true` once the device's public key
    /// has been accepted.
    pub async fn connect(&self) -> SignerResult<Pending<bool>> {
        let (line, pending) = {
            let mut state = self.inner.state.lock();
            let pending = state.handshake.begin()?;
            state.flow = None;
            state.login.abort();
            state.psbt_sent.abort();
            state.xpub.abort();
            state.sign.abort();
            let line = state.channel.handshake_line();
            state.set_phase(Phase::KeyExchanging);
            (line, pending)
        };

        debug!("sending key exchange");
        if let Err(err) = self.write_line(&line).await {
            self.inner.state.lock().handshake.abort();
            self.warn("Failed to send DH Public Key to device!", &err);
            return Err(err);
        }
        Ok(pending)
    }

    pub async fn login(&self, password: Zeroizing<String>) -> SignerResult<Pending<bool>> {
        let pending = self.inner.state.lock().login.begin()?;
        if let Err(err) = self.send(Command::Password, &[password.as_str()]).await {
            self.inner.state.lock().login.abort();
            self.warn("Failed to send password to Hardware Wallet!", &err);
            return Err(err);
        }
        Ok(pending)
    }

    pub async fn logout(&self) -> SignerResult<()> {
        self.send(Command::PasswordClear, &[])
            .await
            .inspect_err(|err| self.warn("Failed to logout from Hardware Wallet!", err))
    }

    /// Asks the device to show its password prompt.
    pub async fn prompt_password(&self) -> SignerResult<()> {
        self.send(Command::Password, &[])
            .await
            .inspect_err(|err| self.warn("Failed to connect to Hardware Wallet!", err))
    }

    /// Asks the device to show its wipe prompt.
    pub async fn prompt_wipe(&self) -> SignerResult<()> {
        self.send(Command::Wipe, &[])
            .await
            .inspect_err(|err| self.warn("Failed to connect to Hardware Wallet!", err))
    }

    pub async fn help(&self) -> SignerResult<()> {
        self.send(Command::Help, &[])
            .await
            .inspect_err(|err| self.warn("Failed to ask for help!", err))
    }

    /// Sends a PSBT for review. Resolves `true` when the device accepted it
    /// and is showing the first output.
    pub async fn send_psbt(
        &self,
        psbt_base64: &str,
        transaction: Transaction,
    ) -> SignerResult<Pending<bool>> {
        let psbt = single_token(psbt_base64, "psbt")?;
        let network = self.inner.config.network;

        let pending = {
            let mut state = self.inner.state.lock();
            let pending = state.psbt_sent.begin()?;
            state.flow = Some(SigningFlow::new(transaction));
            pending
        };

        if let Err(err) = self.send(Command::SendPsbt, &[network.as_str(), psbt]).await {
            let mut state = self.inner.state.lock();
            if let Some(flow) = state.flow.as_mut() {
                flow.sending = false;
            }
            state.psbt_sent.abort();
            drop(state);
            self.warn("Failed to send data to serial port!", &err);
            return Err(err);
        }
        Ok(pending)
    }

    /// Moves to the next output, or to the fee once every output was seen.
    pub async fn confirm_next(&self) -> SignerResult<()> {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Signing {
                return Err(SignerError::NoSigningFlow);
            }
            let flow = state.flow.as_mut().ok_or(SignerError::NoSigningFlow)?;
            flow.confirm_next();
        }
        self.send(Command::ConfirmNext, &[]).await
    }

    pub async fn sign_psbt(&self) -> SignerResult<Pending<Option<SignedPsbt>>> {
        let pending = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Signing || state.flow.is_none() {
                return Err(SignerError::NoSigningFlow);
            }
            let pending = state.sign.begin()?;
            if let Some(flow) = state.flow.as_mut() {
                flow.signing = true;
            }
            pending
        };

        if let Err(err) = self.send(Command::SignPsbt, &[]).await {
            let mut state = self.inner.state.lock();
            if let Some(flow) = state.flow.as_mut() {
                flow.signing = false;
            }
            state.sign.abort();
            drop(state);
            self.warn("Failed to sign PSBT!", &err);
            return Err(err);
        }
        Ok(pending)
    }

    /// Local state only changes once the device echoes `CANCEL`.
    pub async fn cancel(&self) -> SignerResult<()> {
        self.send(Command::Cancel, &[])
            .await
            .inspect_err(|err| self.warn("Failed to send cancel!", err))
    }

    pub async fn fetch_xpub(&self, derivation_path: &str) -> SignerResult<Pending<XpubResult>> {
        let path = single_token(derivation_path, "derivation path")?;
        let network = self.inner.config.network;

        let pending = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Signing {
                return Err(SignerError::SigningInProgress);
            }
            let pending = state.xpub.begin()?;
            state.set_phase(Phase::FetchingXpub);
            pending
        };

        if let Err(err) = self.send(Command::Xpub, &[network.as_str(), path]).await {
            let mut state = self.inner.state.lock();
            state.xpub.abort();
            state.settle();
            drop(state);
            self.warn("Failed to fetch XPub!", &err);
            return Err(err);
        }
        Ok(pending)
    }

    pub async fn show_seed(&self) -> SignerResult<()> {
        let position = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Signing {
                return Err(SignerError::SigningInProgress);
            }
            state.seed_position = 1;
            state.set_phase(Phase::ShowingSeed);
            state.seed_position
        };
        self.send_seed_position(position).await
    }

    pub async fn next_seed_word(&self) -> SignerResult<()> {
        let position = {
            let mut state = self.inner.state.lock();
            state.seed_position += 1;
            state.seed_position
        };
        self.send_seed_position(position).await
    }

    pub async fn prev_seed_word(&self) -> SignerResult<()> {
        let position = {
            let mut state = self.inner.state.lock();
            state.seed_position = state.seed_position.saturating_sub(1).max(1);
            state.seed_position
        };
        self.send_seed_position(position).await
    }

    /// Leaves the seed view; the device is not involved.
    pub fn hide_seed(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::ShowingSeed {
            state.settle();
        }
    }

    async fn send_seed_position(&self, position: u32) -> SignerResult<()> {
        let position = position.to_string();
        self.send(Command::Seed, &[position.as_str()])
            .await
            .inspect_err(|err| self.warn("Failed to show seed!", err))
    }

    pub async fn wipe(&self, password: Zeroizing<String>) -> SignerResult<()> {
        self.inner.state.lock().set_phase(Phase::Wiping);
        let result = self.send(Command::Wipe, &[password.as_str()]).await;
        if let Err(err) = &result {
            self.inner.state.lock().settle();
            self.warn("Failed to wipe wallet!", err);
        }
        result
    }

    /// Replaces the device seed, then sets its password.
    pub async fn restore(
        &self,
        mnemonic: Zeroizing<String>,
        password: Zeroizing<String>,
    ) -> SignerResult<()> {
        let words = mnemonic.split_whitespace().count();
        if words == 0 {
            return Err(SignerError::InvalidInput("empty mnemonic".into()));
        }
        // Collapse runs of whitespace so the device sees single-space separated words.
        let mnemonic = Zeroizing::new(mnemonic.split_whitespace().collect::<Vec<_>>().join(" "));

        self.inner.state.lock().set_phase(Phase::Restoring);
        let result = async {
            self.send(Command::Restore, &[mnemonic.as_str()]).await?;
            self.send(Command::Password, &[password.as_str()]).await
        }
        .await;

        if let Err(err) = &result {
            self.inner.state.lock().settle();
            self.warn("Failed to restore from seed!", err);
        } else {
            info!(words, "restore sent");
        }
        result
    }

    /// Feeds one inbound line through the state machine.
    pub fn handle_line(&self, line: &str) {
        let events = {
            let mut state = self.inner.state.lock();
            let inbound = state.channel.decode(line);
            state.dispatch(inbound)
        };
        self.emit(events);
    }

    /// Reads lines until the link closes, then resets the session.
    pub async fn run<L: LinkReader>(&self, mut reader: LineReader<L>) {
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => {
                    info!("link closed by device");
                    break;
                }
                Err(err) => {
                    warn!(%err, "link read failed");
                    self.notify(
                        Notice::warning("Serial port communication error!")
                            .with_caption(err.to_string()),
                    );
                    break;
                }
            }
        }

        self.disconnect();
        self.notify(Notice::warning("Disconnected from serial port!"));
    }

    /// Forgets keys, authentication and pending requests.
    pub fn disconnect(&self) {
        self.inner.state.lock().reset();
        debug!("session reset");
    }

    /// Shuts the writing half down and resets the session.
    pub async fn close(&self) -> SignerResult<()> {
        let result = self.inner.writer.lock().await.close().await;
        self.disconnect();
        result.map_err(SignerError::from)
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// `true` from [`HwwSigner::connect`] until the session is reset. An
    /// open link that has not started a key exchange is not connected.
    pub fn is_connected(&self) -> bool {
        self.phase() != Phase::Disconnected
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().is_authenticated()
    }

    pub fn is_secure(&self) -> bool {
        self.inner.state.lock().channel.session().is_secure()
    }

    pub fn signing_flow(&self) -> Option<SigningFlow> {
        self.inner.state.lock().flow.clone()
    }

    pub fn seed_position(&self) -> u32 {
        self.inner.state.lock().seed_position
    }

    /// Resolves `false` right away when logged in, otherwise with the
    /// outcome of the next password response.
    pub fn is_authenticating(&self) -> Pending<bool> {
        let mut state = self.inner.state.lock();
        if state.is_authenticated() {
            return Pending::Ready(false);
        }
        state.login.subscribe()
    }

    /// Resolves `false` right away unless a PSBT is waiting for its
    /// acknowledgment.
    pub fn is_sending_psbt(&self) -> Pending<bool> {
        let mut state = self.inner.state.lock();
        let sending = state.flow.as_ref().is_some_and(|flow| flow.sending);
        if !sending {
            return Pending::Ready(false);
        }
        state.psbt_sent.subscribe()
    }

    /// Resolves with the next xpub response.
    pub fn is_fetching_xpub(&self) -> Pending<XpubResult> {
        self.inner.state.lock().xpub.subscribe()
    }

    pub fn is_request_in_flight(&self) -> bool {
        let state = self.inner.state.lock();
        state.handshake.is_in_flight()
            || state.login.is_in_flight()
            || state.psbt_sent.is_in_flight()
            || state.xpub.is_in_flight()
            || state.sign.is_in_flight()
    }

    async fn send(&self, command: Command, args: &[&str]) -> SignerResult<()> {
        let line = self.inner.state.lock().channel.encode_command(command, args)?;
        debug!(%command, "sending command");
        self.write_line(&line).await
    }

    async fn write_line(&self, line: &str) -> SignerResult<()> {
        self.inner.writer.lock().await.write_line(line).await?;
        Ok(())
    }

    fn warn(&self, message: &str, err: &SignerError) {
        warn!(%err, code = err.code(), "{message}");
        self.notify(Notice::warning(message).with_caption(err.to_string()));
    }

    fn notify(&self, notice: Notice) {
        self.inner.notifier.notify(SignerEvent::Notice(notice));
    }

    fn emit(&self, events: Vec<SignerEvent>) {
        for event in events {
            self.inner.notifier.notify(event);
        }
    }
}

/// Rejects empty values and values that would split into several wire arguments.
fn single_token<'a>(value: &'a str, what: &str) -> SignerResult<&'a str> {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(SignerError::InvalidInput(format!(
            "{what} must be a single non-empty token"
        )));
    }
    Ok(value)
}
