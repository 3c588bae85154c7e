use std::fmt;

use hww_codec::{EncryptedFrame, IV_LEN};
use hww_crypto::{CipherCodec, EphemeralKey};
use rand::Rng;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{command::Command, error::ChannelError, session::Session};

/// A decoded inbound line.
pub enum Inbound {
    Message {
        command: Command,
        data: Zeroizing<String>,
    },
    /// Decrypted fine, but the tag is not one we know.
    Unknown {
        command: String,
        data: Zeroizing<String>,
    },
    /// The line could not be decoded at all.
    Error(String),
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inbound::Message { command, data } => f
                .debug_struct("Message")
                .field("command", command)
                .field("data_len", &data.len())
                .finish(),
            Inbound::Unknown { command, data } => f
                .debug_struct("Unknown")
                .field("command", command)
                .field("data_len", &data.len())
                .finish(),
            Inbound::Error(message) => f.debug_tuple("Error").field(message).finish(),
        }
    }
}

/// Encrypts outgoing commands and decodes inbound lines for one connection.
#[derive(Debug, Default)]
pub struct CommandChannel {
    session: Session,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Starts a fresh key exchange and returns the plaintext handshake line.
    ///
    /// Any previous shared secret is discarded.
    pub fn handshake_line(&mut self) -> String {
        let key = EphemeralKey::generate();
        let line = format!("{} {}", Command::DhExchange, key.public_hex());
        self.session.reset();
        self.session.ephemeral = Some(key);
        line
    }

    /// Finishes the key exchange from the device's `DH_EXCHANGE` payload.
    pub fn complete_handshake(&mut self, data: &str) -> Result<(), ChannelError> {
        let ephemeral = self
            .session
            .ephemeral
            .as_ref()
            .ok_or(ChannelError::HandshakeNotStarted)?;
        let peer = data.split_whitespace().next().unwrap_or_default();
        let shared = ephemeral.complete(peer)?;

        self.session.shared_secret = Some(shared);
        self.session.ephemeral = None;
        debug!("shared secret established");
        Ok(())
    }

    pub fn encode_command(&self, command: Command, args: &[&str]) -> Result<String, ChannelError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill(&mut iv);
        self.encode_command_with_iv(command, args, &iv)
    }

    pub fn encode_command_with_iv(
        &self,
        command: Command,
        args: &[&str],
        iv: &[u8; IV_LEN],
    ) -> Result<String, ChannelError> {
        let mut message = Zeroizing::new(String::from(command.as_str()));
        for arg in args {
            message.push(' ');
            message.push_str(arg);
        }

        if command == Command::DhExchange {
            return Ok(message.as_str().to_owned());
        }

        let codec = CipherCodec::for_session(self.session.shared_secret.as_ref())?;
        let ciphertext = codec.encode(&message, iv)?;
        let line = EncryptedFrame::new(ciphertext, *iv).to_line();
        debug!(%command, frame_len = line.len(), "encoded command");
        Ok(line)
    }

    pub fn decode(&self, line: &str) -> Inbound {
        let line = line.trim();
        let (head, rest) = split_command(line);
        if let Ok(command) = head.parse::<Command>()
            && command.is_plaintext()
        {
            return Inbound::Message {
                command,
                data: Zeroizing::new(rest.to_owned()),
            };
        }

        let plaintext = match self.decrypt(line) {
            Ok(plaintext) => plaintext,
            Err(err) => return Inbound::Error(err.to_string()),
        };

        let (head, rest) = split_command(&plaintext);
        let data = Zeroizing::new(rest.to_owned());
        match head.parse::<Command>() {
            Ok(command) => Inbound::Message { command, data },
            Err(_) => Inbound::Unknown {
                command: head.to_owned(),
                data,
            },
        }
    }

    fn decrypt(&self, line: &str) -> Result<Zeroizing<String>, ChannelError> {
        let codec = CipherCodec::for_session(self.session.shared_secret.as_ref())?;
        let frame = EncryptedFrame::parse(line)?;
        Ok(codec.decode(&frame.ciphertext, &frame.iv)?)
    }
}

/// Splits `"<command> <data>"` at the first space; `data` is trimmed.
pub fn split_command(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(' ') {
        Some((command, data)) => (command, data.trim()),
        None => (text.trim_end(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired() -> (CommandChannel, CommandChannel) {
        let mut host = CommandChannel::new();
        let mut device = CommandChannel::new();

        let host_hello = host.handshake_line();
        let device_hello = device.handshake_line();

        let Inbound::Message { command, data } = device.decode(&host_hello) else {
            panic!("handshake line must decode as plaintext");
        };
        assert_eq!(command, Command::DhExchange);
        device.complete_handshake(&data).unwrap();

        let Inbound::Message { data, .. } = host.decode(&device_hello) else {
            panic!("handshake line must decode as plaintext");
        };
        host.complete_handshake(&data).unwrap();

        (host, device)
    }

    #[test]
    fn handshake_line_shape() {
        let mut channel = CommandChannel::new();
        let line = channel.handshake_line();
        let (command, key) = split_command(&line);
        assert_eq!(command, "DH_EXCHANGE");
        assert_eq!(key.len(), 128);
        assert!(channel.session().ephemeral.is_some());
        assert!(!channel.session().is_secure());
    }

    #[test]
    fn both_sides_agree_and_drop_ephemeral() {
        let (host, device) = paired();
        assert!(host.session().is_secure());
        assert!(host.session().ephemeral.is_none());
        assert_eq!(host.session().shared_secret, device.session().shared_secret);
    }

    #[test]
    fn commands_round_trip_through_the_peer() {
        let (host, device) = paired();
        let line = host
            .encode_command(Command::SendPsbt, &["testnet", "cHNidP8BAH0C"])
            .unwrap();
        assert!(line.chars().all(|c| c.is_ascii_hexdigit()));

        match device.decode(&line) {
            Inbound::Message { command, data } => {
                assert_eq!(command, Command::SendPsbt);
                assert_eq!(data.as_str(), "testnet cHNidP8BAH0C");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fixed_iv_is_the_frame_suffix() {
        let (host, _) = paired();
        let iv = [0xa5; IV_LEN];
        let line = host
            .encode_command_with_iv(Command::Help, &[], &iv)
            .unwrap();
        assert!(line.ends_with(&"a5".repeat(IV_LEN)));
        // "4 HELP" fits one block.
        assert_eq!(line.len(), 32 + 32);
    }

    #[test]
    fn encrypted_send_requires_secret() {
        let channel = CommandChannel::new();
        let err = channel.encode_command(Command::Xpub, &[]).unwrap_err();
        assert!(err.is_missing_secret());
    }

    #[test]
    fn handshake_bypasses_encryption() {
        let channel = CommandChannel::new();
        assert_eq!(
            channel
                .encode_command(Command::DhExchange, &["abcd"])
                .unwrap(),
            "DH_EXCHANGE abcd"
        );
    }

    #[test]
    fn log_lines_stay_plaintext_after_handshake() {
        let (host, _) = paired();
        match host.decode("LOG  battery low \r") {
            Inbound::Message { command, data } => {
                assert_eq!(command, Command::Log);
                assert_eq!(data.as_str(), "battery low");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn undecodable_lines_become_errors() {
        let (host, _) = paired();
        assert!(matches!(host.decode("zz"), Inbound::Error(_)));
        assert!(matches!(
            host.decode(&"00".repeat(40)),
            Inbound::Error(_)
        ));

        let fresh = CommandChannel::new();
        assert!(matches!(
            fresh.decode(&"00".repeat(32)),
            Inbound::Error(message) if message.contains("secure session")
        ));
    }

    #[test]
    fn unknown_tags_are_surfaced() {
        let (host, device) = paired();
        let key = host.session().shared_secret.clone().unwrap();
        let iv = [1u8; IV_LEN];
        let ciphertext = CipherCodec::new(&key).encode("REBOOT now", &iv).unwrap();
        let line = EncryptedFrame::new(ciphertext, iv).to_line();

        match device.decode(&line) {
            Inbound::Unknown { command, data } => {
                assert_eq!(command, "REBOOT");
                assert_eq!(data.as_str(), "now");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_peer_key_keeps_exchange_open() {
        let mut channel = CommandChannel::new();
        channel.handshake_line();
        assert!(matches!(
            channel.complete_handshake("nothex"),
            Err(ChannelError::Crypto(_))
        ));
        assert!(!channel.session().is_secure());
        assert!(channel.session().ephemeral.is_some());

        let mut fresh = CommandChannel::new();
        assert!(matches!(
            fresh.complete_handshake("00"),
            Err(ChannelError::HandshakeNotStarted)
        ));
    }

    #[test]
    fn split_command_trims_data() {
        assert_eq!(split_command("SIGN_PSBT  2 abc  "), ("SIGN_PSBT", "2 abc"));
        assert_eq!(split_command("CANCEL"), ("CANCEL", ""));
        assert_eq!(split_command(""), ("", ""));
    }
}
