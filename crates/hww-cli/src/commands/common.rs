use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hww_core::{LineReader, LinkReader, LinkWriter, StreamReader, StreamWriter};
use hww_signer::{
    HwwSigner, NoticeLevel, Pending, SignerConfig, SignerEvent, SigningFlow, Transaction,
};
use tokio::{net::TcpStream, task::JoinHandle, time::timeout};
use tracing::{debug, info};

use crate::cli::ConnectArgs;
use crate::config::default_port;
use crate::ui::prompt_secret;

type Link = (Box<dyn LinkReader>, Box<dyn LinkWriter>);

/// An open link with a completed key exchange and a running read loop.
pub struct Connection {
    pub signer: HwwSigner,
    reader: JoinHandle<()>,
    response_timeout: Duration,
}

impl Connection {
    pub async fn open(args: &ConnectArgs) -> Result<Self> {
        let (link_reader, link_writer) = open_link(args).await?;

        let config = SignerConfig {
            network: args.network,
        };
        let signer = HwwSigner::new(config, link_writer, print_event);

        let runner = signer.clone();
        let reader = tokio::spawn(async move {
            runner.run(LineReader::new(link_reader)).await;
        });

        println!("Starting secure session...");
        let pending = signer
            .connect()
            .await
            .context("failed to send key exchange")?;
        let accepted = timeout(
            Duration::from_secs(args.handshake_timeout_secs),
            pending.wait(),
        )
        .await
        .context("timed out waiting for the device public key")?
        .context("key exchange failed")?;
        if !accepted {
            reader.abort();
            bail!("device public key was rejected");
        }
        info!(network = %args.network, "secure session established");

        Ok(Self {
            signer,
            reader,
            response_timeout: Duration::from_secs(args.response_timeout_secs),
        })
    }

    /// Waits for a device response within the configured timeout.
    pub async fn wait<T>(&self, pending: Pending<T>, what: &str) -> Result<T> {
        timeout(self.response_timeout, pending.wait())
            .await
            .with_context(|| format!("timed out waiting for {what}"))?
            .with_context(|| format!("{what} failed"))
    }

    pub async fn login(&self) -> Result<()> {
        let password = prompt_secret("Password: ")?;
        let pending = self.signer.login(password).await.context("failed to send password")?;
        if !self.wait(pending, "login").await? {
            bail!("wrong password");
        }
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        let result = self.signer.close().await;
        self.reader.abort();
        result.context("failed to close link")
    }
}

async fn open_link(args: &ConnectArgs) -> Result<Link> {
    if let Some(addr) = &args.tcp {
        println!("Connecting to {addr}...");
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("cannot connect to {addr}"))?;
        let (read, write) = stream.into_split();
        return Ok((
            Box::new(StreamReader::new(read)),
            Box::new(StreamWriter::new(write)),
        ));
    }

    let port = args.port.clone().unwrap_or_else(default_port);
    println!("Opening serial port {}...", port.display());
    open_serial(&port).await
}

/// A tty opened twice so reads and writes do not wait on each other.
/// Line settings (baud rate) are left to the OS, e.g. `stty -F <port> 115200 raw`.
async fn open_serial(port: &Path) -> Result<Link> {
    let read = tokio::fs::OpenOptions::new()
        .read(true)
        .open(port)
        .await
        .with_context(|| format!("cannot open serial port {}", port.display()))?;
    let write = tokio::fs::OpenOptions::new()
        .write(true)
        .open(port)
        .await
        .with_context(|| format!("cannot open serial port {} for writing", port.display()))?;
    debug!(port = %port.display(), "serial port opened");

    Ok((
        Box::new(StreamReader::new(read)),
        Box::new(StreamWriter::new(write)),
    ))
}

pub fn read_transaction(psbt: &Path, tx: &Path) -> Result<(String, Transaction)> {
    let psbt_base64 = std::fs::read_to_string(psbt)
        .with_context(|| format!("reading psbt file: {}", psbt.display()))?;
    let tx_json = std::fs::read_to_string(tx)
        .with_context(|| format!("reading tx file: {}", tx.display()))?;
    let transaction = Transaction::from_json(&tx_json).context("failed to parse tx JSON")?;
    Ok((psbt_base64.trim().to_owned(), transaction))
}

/// What the device is asking the user to confirm right now.
pub fn describe_flow(flow: &SigningFlow) -> String {
    let outputs = &flow.transaction.outputs;
    match flow.current_output() {
        Some(output) => format!(
            "Output {}/{}: {} sat to {}",
            flow.confirmed_output_index + 1,
            outputs.len(),
            output.amount,
            output.address
        ),
        None => format!("Fee: {} sat", flow.transaction.fee),
    }
}

fn print_event(event: SignerEvent) {
    match event {
        SignerEvent::Notice(notice) => match notice.level {
            NoticeLevel::Success => println!("[ok] {notice}"),
            NoticeLevel::Warning => println!("[!] {notice}"),
        },
        SignerEvent::SignedPsbt(signed) => {
            println!("Signed PSBT ({} input(s)):", signed.signed_inputs);
            println!("{}", signed.psbt);
        }
        SignerEvent::SeedWord { position, word } => {
            println!("Seed word #{position}: {}", word.as_str());
        }
        SignerEvent::DeviceLog(text) => println!("[device] {text}"),
    }
}
