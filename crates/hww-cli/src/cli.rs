use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use hww_signer::Network;

#[derive(Parser, Debug)]
#[command(name = "hww")]
#[command(about = "Host for serial hardware-wallet signers")]
pub struct Cli {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a secure session and start the interactive shell.
    Connect(ConnectArgs),
    /// Log in and print the account xpub.
    Xpub(XpubArgs),
    /// Review and sign a PSBT.
    Sign(SignArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Serial device; defaults to $HWW_PORT.
    #[arg(long, conflicts_with = "tcp")]
    pub port: Option<PathBuf>,
    /// host:port of an emulator instead of a serial device.
    #[arg(long)]
    pub tcp: Option<String>,
    #[arg(long, default_value = "mainnet")]
    pub network: Network,
    #[arg(long, default_value_t = 60)]
    pub response_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub handshake_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct XpubArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Derivation path; BIP84 account 0 when omitted.
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// File holding the base64 PSBT.
    #[arg(long)]
    pub psbt: PathBuf,
    /// JSON with the outputs to confirm: {"outputs":[{"address":..,"amount":..}],"fee":..}
    #[arg(long)]
    pub tx: PathBuf,
    /// Where to write the signed PSBT; printed when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,
}
