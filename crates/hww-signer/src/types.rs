use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::SignerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Spelling used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            other => Err(SignerError::InvalidInput(format!("unknown network `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignerConfig {
    /// Sent with `SEND_PSBT` and `XPUB`.
    pub network: Network,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    /// Satoshis.
    pub amount: u64,
}

/// What the user confirms on the device, output by output and then the fee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub fee: u64,
}

impl Transaction {
    pub fn from_json(json: &str) -> Result<Self, SignerError> {
        serde_json::from_str(json).map_err(|err| SignerError::InvalidInput(err.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpubResult {
    pub xpub: String,
    pub fingerprint: String,
}

impl XpubResult {
    pub fn is_empty(&self) -> bool {
        self.xpub.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPsbt {
    /// Base64, as returned by the device.
    pub psbt: String,
    pub signed_inputs: u32,
}

/// Signing flow of one PSBT, from send to the sign response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningFlow {
    pub transaction: Transaction,
    pub confirmed_output_index: usize,
    pub fee_confirmation_pending: bool,
    pub sending: bool,
    pub signing: bool,
}

impl SigningFlow {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            confirmed_output_index: 0,
            fee_confirmation_pending: false,
            sending: true,
            signing: false,
        }
    }

    /// Output the device is currently showing, `None` once all were confirmed.
    pub fn current_output(&self) -> Option<&TxOutput> {
        if self.fee_confirmation_pending {
            return None;
        }
        self.transaction.outputs.get(self.confirmed_output_index)
    }

    pub fn confirm_next(&mut self) {
        self.confirmed_output_index += 1;
        if self.confirmed_output_index >= self.transaction.outputs.len() {
            self.fee_confirmation_pending = true;
        }
    }

    pub(crate) fn acknowledge_send(&mut self) {
        self.confirmed_output_index = 0;
        self.fee_confirmation_pending = false;
        self.sending = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub caption: Option<String>,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            caption: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.caption {
            Some(caption) => write!(f, "{} ({caption})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

pub enum SignerEvent {
    Notice(Notice),
    SignedPsbt(SignedPsbt),
    SeedWord {
        position: u32,
        word: Zeroizing<String>,
    },
    DeviceLog(String),
}

impl fmt::Debug for SignerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notice(notice) => f.debug_tuple("Notice").field(notice).finish(),
            Self::SignedPsbt(signed) => f.debug_tuple("SignedPsbt").field(signed).finish(),
            Self::SeedWord { position, .. } => f
                .debug_struct("SeedWord")
                .field("position", position)
                .finish_non_exhaustive(),
            Self::DeviceLog(text) => f.debug_tuple("DeviceLog").field(text).finish(),
        }
    }
}

/// Receives everything the signer wants to show the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: SignerEvent);
}

impl<F> Notifier for F
where
    F: Fn(SignerEvent) + Send + Sync,
{
    fn notify(&self, event: SignerEvent) {
        self(event)
    }
}

/// Writes events to the tracing subscriber and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: SignerEvent) {
        match event {
            SignerEvent::Notice(notice) => match notice.level {
                NoticeLevel::Success => info!(%notice, "device notice"),
                NoticeLevel::Warning => warn!(%notice, "device notice"),
            },
            SignerEvent::SignedPsbt(signed) => {
                info!(signed_inputs = signed.signed_inputs, "psbt signed")
            }
            SignerEvent::SeedWord { position, .. } => info!(position, "seed word shown"),
            SignerEvent::DeviceLog(text) => info!(target: "hww::device", "{text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_outputs() -> Transaction {
        Transaction::from_json(
            r#"{"outputs":[{"address":"tb1qa","amount":1000},{"address":"tb1qb","amount":2500}],"fee":150}"#,
        )
        .unwrap()
    }

    #[test]
    fn transaction_json() {
        let tx = two_outputs();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].amount, 2500);
        assert_eq!(tx.fee, 150);

        let no_fee = Transaction::from_json(r#"{"outputs":[]}"#).unwrap();
        assert_eq!(no_fee.fee, 0);

        assert!(matches!(
            Transaction::from_json("{"),
            Err(SignerError::InvalidInput(_))
        ));
    }

    #[test]
    fn fee_confirmation_follows_last_output() {
        let mut flow = SigningFlow::new(two_outputs());
        assert_eq!(flow.current_output().unwrap().address, "tb1qa");

        flow.confirm_next();
        assert!(!flow.fee_confirmation_pending);
        assert_eq!(flow.current_output().unwrap().address, "tb1qb");

        flow.confirm_next();
        assert!(flow.fee_confirmation_pending);
        assert!(flow.current_output().is_none());

        flow.confirm_next();
        assert_eq!(flow.confirmed_output_index, 3);
        assert!(flow.fee_confirmation_pending);
    }

    #[test]
    fn network_parsing() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("regtest".parse::<Network>().is_err());
        assert_eq!(Network::Testnet.to_string(), "Testnet");
    }

    #[test]
    fn seed_word_debug_is_redacted() {
        let event = SignerEvent::SeedWord {
            position: 3,
            word: Zeroizing::new("abandon".into()),
        };
        let rendered = format!("{event:?}");
        assert!(rendered.contains("position: 3"));
        assert!(!rendered.contains("abandon"));
    }

    #[test]
    fn notice_display() {
        let notice = Notice::warning("No input signed!").with_caption("Are you using the right seed?");
        assert_eq!(
            notice.to_string(),
            "No input signed! (Are you using the right seed?)"
        );
    }
}
