use std::env;
use std::path::PathBuf;

use hww_signer::Network;

/// Overrides the serial device used when `--port` is not given.
pub const PORT_ENV: &str = "HWW_PORT";

#[cfg(target_os = "macos")]
const FALLBACK_PORT: &str = "/dev/cu.usbserial-0001";
#[cfg(not(target_os = "macos"))]
const FALLBACK_PORT: &str = "/dev/ttyUSB0";

pub fn default_port() -> PathBuf {
    env::var_os(PORT_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_PORT))
}

/// BIP84 account 0 for the network.
pub fn default_xpub_path(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "m/84'/0'/0'",
        Network::Testnet => "m/84'/1'/0'",
    }
}
