use std::{fmt, str::FromStr};

use crate::error::ChannelError;

/// Command tags understood by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SignPsbt,
    Password,
    PasswordClear,
    SendPsbt,
    Wipe,
    Xpub,
    Seed,
    DhExchange,
    ConfirmNext,
    Cancel,
    Restore,
    Help,
    Log,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::SignPsbt,
        Command::Password,
        Command::PasswordClear,
        Command::SendPsbt,
        Command::Wipe,
        Command::Xpub,
        Command::Seed,
        Command::DhExchange,
        Command::ConfirmNext,
        Command::Cancel,
        Command::Restore,
        Command::Help,
        Command::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SignPsbt => "SIGN_PSBT",
            Command::Password => "PASSWORD",
            Command::PasswordClear => "PASSWORD_CLEAR",
            Command::SendPsbt => "SEND_PSBT",
            Command::Wipe => "WIPE",
            Command::Xpub => "XPUB",
            Command::Seed => "SEED",
            Command::DhExchange => "DH_EXCHANGE",
            Command::ConfirmNext => "CONFIRM_NEXT",
            Command::Cancel => "CANCEL",
            Command::Restore => "RESTORE",
            Command::Help => "HELP",
            Command::Log => "LOG",
        }
    }

    /// Lines carrying these tags are never encrypted.
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Command::DhExchange | Command::Log)
    }

    /// Arguments of these commands are secrets and must not reach the logs.
    pub fn carries_secret(&self) -> bool {
        matches!(
            self,
            Command::Password | Command::Wipe | Command::Restore | Command::Seed
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| ChannelError::UnknownCommand(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_back() {
        for command in Command::ALL {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert!(matches!(
            "xpub".parse::<Command>(),
            Err(ChannelError::UnknownCommand(tag)) if tag == "xpub"
        ));
    }

    #[test]
    fn only_handshake_and_log_are_plaintext() {
        let plaintext: Vec<_> = Command::ALL
            .into_iter()
            .filter(Command::is_plaintext)
            .collect();
        assert_eq!(plaintext, vec![Command::DhExchange, Command::Log]);
    }
}
