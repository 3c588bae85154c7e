use hww_core::{Command, CommandChannel, Inbound, split_command};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    pending::{PendingSlot, RequestKind},
    types::{Notice, SignedPsbt, SignerEvent, SigningFlow, XpubResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Disconnected,
    KeyExchanging,
    Authenticating,
    Authenticated,
    Signing,
    FetchingXpub,
    ShowingSeed,
    Restoring,
    Wiping,
}

const SUCCESS: &str = "1";

#[derive(Debug)]
pub(crate) struct SignerState {
    pub channel: CommandChannel,
    pub phase: Phase,
    pub flow: Option<SigningFlow>,
    pub seed_position: u32,
    pub handshake: PendingSlot<bool>,
    pub login: PendingSlot<bool>,
    pub psbt_sent: PendingSlot<bool>,
    pub xpub: PendingSlot<XpubResult>,
    pub sign: PendingSlot<Option<SignedPsbt>>,
}

impl Default for SignerState {
    fn default() -> Self {
        Self {
            channel: CommandChannel::new(),
            phase: Phase::Disconnected,
            flow: None,
            seed_position: 1,
            handshake: PendingSlot::new(RequestKind::Handshake),
            login: PendingSlot::new(RequestKind::Login),
            psbt_sent: PendingSlot::new(RequestKind::SendPsbt),
            xpub: PendingSlot::new(RequestKind::Xpub),
            sign: PendingSlot::new(RequestKind::Sign),
        }
    }
}

impl SignerState {
    pub fn is_authenticated(&self) -> bool {
        self.channel.session().authenticated
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(from = ?self.phase, to = ?phase, "phase changed");
            self.phase = phase;
        }
    }

    /// Phase to return to once a device operation has finished.
    pub fn idle_phase(&self) -> Phase {
        let session = self.channel.session();
        if session.authenticated && self.phase == Phase::Signing && self.flow.is_some() {
            Phase::Signing
        } else if session.authenticated {
            Phase::Authenticated
        } else if session.is_secure() {
            Phase::Authenticating
        } else if self.phase == Phase::Disconnected {
            Phase::Disconnected
        } else {
            Phase::KeyExchanging
        }
    }

    pub fn settle(&mut self) {
        let phase = self.idle_phase();
        self.set_phase(phase);
    }

    /// Drops keys, the signing flow and every pending request.
    pub fn reset(&mut self) {
        self.channel.session_mut().reset();
        self.flow = None;
        self.seed_position = 1;
        self.handshake.abort();
        self.login.abort();
        self.psbt_sent.abort();
        self.xpub.abort();
        self.sign.abort();
        self.set_phase(Phase::Disconnected);
    }

    /// Applies one inbound line and returns the events to publish.
    pub fn dispatch(&mut self, inbound: Inbound) -> Vec<SignerEvent> {
        let mut events = Vec::new();
        match inbound {
            Inbound::Message { command, data } => {
                if !command.carries_secret() && command != Command::Log {
                    debug!(%command, data = data.as_str(), "device response");
                } else {
                    debug!(%command, "device response");
                }
                self.on_message(command, &data, &mut events);
            }
            Inbound::Unknown { command, .. } => {
                warn!(%command, "ignoring unknown command from device");
            }
            Inbound::Error(message) => {
                warn!(%message, "undecodable line from device");
                events.push(notice(
                    Notice::warning("Failed to decrypt message from device!").with_caption(message),
                ));
            }
        }
        events
    }

    fn on_message(&mut self, command: Command, data: &str, events: &mut Vec<SignerEvent>) {
        match command {
            Command::DhExchange => self.on_key_exchange(data, events),
            Command::Password => self.on_login(data, events),
            Command::PasswordClear => self.on_logout(data, events),
            Command::SendPsbt => self.on_psbt_sent(data, events),
            Command::SignPsbt => self.on_signed(data, events),
            Command::Xpub => self.on_xpub(data, events),
            Command::Seed => self.on_seed_word(data, events),
            Command::Wipe => self.on_wipe(data, events),
            Command::Restore => self.on_restore(data, events),
            Command::Cancel => self.on_cancelled(events),
            Command::Log => {
                info!(target: "hww::device", "{data}");
                events.push(SignerEvent::DeviceLog(data.to_owned()));
            }
            Command::ConfirmNext | Command::Help => {
                debug!(%command, "no handler for device echo");
            }
        }
    }

    fn on_key_exchange(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        if data.split_whitespace().next().is_none() {
            events.push(notice(
                Notice::warning("Failed to exchange DH secret!").with_caption("empty public key"),
            ));
            self.handshake.resolve(false);
            return;
        }

        match self.channel.complete_handshake(data) {
            Ok(()) => {
                self.set_phase(Phase::Authenticating);
                events.push(notice(Notice::success("Secure session created!")));
                self.handshake.resolve(true);
            }
            Err(err) => {
                warn!(%err, "key exchange failed");
                events.push(notice(
                    Notice::warning("Failed to exchange DH secret!").with_caption(err.to_string()),
                ));
                self.handshake.resolve(false);
            }
        }
    }

    fn on_login(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        let authenticated = data == SUCCESS;
        self.channel.session_mut().authenticated = authenticated;
        self.settle();

        events.push(notice(if authenticated {
            Notice::success("Login successful!")
        } else {
            Notice::warning("Wrong password, try again!")
        }));
        self.login.resolve(authenticated);
    }

    fn on_logout(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        if data == SUCCESS {
            self.channel.session_mut().authenticated = false;
            self.flow = None;
            self.settle();
            events.push(notice(Notice::success("Logged out")));
        } else {
            events.push(notice(Notice::warning(
                "Failed to logout from Hardware Wallet",
            )));
        }
    }

    fn on_psbt_sent(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        let accepted = data == SUCCESS;
        match self.flow.as_mut() {
            Some(flow) if accepted => {
                flow.acknowledge_send();
                self.set_phase(Phase::Signing);
            }
            Some(flow) => {
                flow.sending = false;
                events.push(notice(
                    Notice::warning("Failed to send PSBT!").with_caption(data),
                ));
            }
            None => {
                warn!("psbt acknowledgment without a signing flow");
            }
        }
        self.psbt_sent.resolve(accepted && self.flow.is_some());
    }

    fn on_signed(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        self.flow = None;
        self.settle();

        let mut parts = data.split_whitespace();
        let count = parts.next();
        let psbt = parts.next();
        let signed = match (count, psbt) {
            (Some(count), Some(psbt)) if count != "0" => match count.parse::<u32>() {
                Ok(signed_inputs) => Some(SignedPsbt {
                    psbt: psbt.to_owned(),
                    signed_inputs,
                }),
                Err(_) => {
                    warn!(count, "sign response carries a non-numeric input count");
                    None
                }
            },
            _ => None,
        };

        match &signed {
            Some(result) => {
                events.push(SignerEvent::SignedPsbt(result.clone()));
                events.push(notice(
                    Notice::success("Transaction signed")
                        .with_caption(format!("Inputs signed: {}", result.signed_inputs)),
                ));
            }
            None => events.push(notice(
                Notice::warning("No input signed!").with_caption("Are you using the right seed?"),
            )),
        }
        self.sign.resolve(signed);
    }

    fn on_xpub(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        if self.phase == Phase::FetchingXpub {
            self.settle();
        }

        let parts: Vec<&str> = data.split_whitespace().collect();
        let result = match parts.as_slice() {
            [status, xpub, fingerprint, ..] if *status == SUCCESS => XpubResult {
                xpub: (*xpub).to_owned(),
                fingerprint: (*fingerprint).to_owned(),
            },
            _ => {
                events.push(notice(
                    Notice::warning("Failed to fetch XPub!").with_caption(data),
                ));
                XpubResult::default()
            }
        };
        self.xpub.resolve(result);
    }

    fn on_seed_word(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        let (status, word) = split_command(data);
        if status == SUCCESS && !word.is_empty() {
            events.push(SignerEvent::SeedWord {
                position: self.seed_position,
                word: Zeroizing::new(word.to_owned()),
            });
        } else {
            events.push(notice(Notice::warning("Failed to show seed!")));
        }
    }

    fn on_wipe(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        if data == SUCCESS {
            self.channel.session_mut().authenticated = false;
            self.flow = None;
            events.push(notice(Notice::success("Wallet wiped!")));
        } else {
            events.push(notice(Notice::warning("Failed to wipe wallet!")));
        }
        self.settle();
    }

    /// The PASSWORD that follows RESTORE settles the phase on success.
    fn on_restore(&mut self, data: &str, events: &mut Vec<SignerEvent>) {
        if data == SUCCESS {
            events.push(notice(Notice::success("Wallet restored!")));
        } else {
            events.push(notice(
                Notice::warning("Failed to restore from seed!").with_caption(data),
            ));
            if self.phase == Phase::Restoring {
                self.settle();
            }
        }
    }

    fn on_cancelled(&mut self, events: &mut Vec<SignerEvent>) {
        if let Some(flow) = self.flow.take() {
            if flow.sending {
                self.psbt_sent.resolve(false);
            }
            if flow.signing {
                self.sign.resolve(None);
            }
        }
        self.settle();
        events.push(notice(Notice::warning("Operation cancelled")));
    }
}

fn notice(notice: Notice) -> SignerEvent {
    SignerEvent::Notice(notice)
}
