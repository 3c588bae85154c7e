use std::path::Path;

use anyhow::{Context, Result, bail};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context as ReadlineContext, Editor, Helper};
use tracing::debug;

use crate::cli::ConnectArgs;
use crate::commands::common::{Connection, describe_flow, read_transaction};
use crate::config::default_xpub_path;
use crate::ui::{prompt_confirm, prompt_secret};

const ROOT_COMMANDS: &[&str] = &[
    "cancel", "confirm", "exit", "help", "login", "logout", "next", "password", "prev", "quit",
    "restore", "seed", "send", "sign", "status", "wipe", "xpub",
];

const USAGE: &str = "\
login                         log in with the device password
logout                        clear the device password session
password                      show the password prompt on the device
xpub [path]                   fetch the account xpub
send <psbt-file> <tx-json>    send a PSBT for review
confirm                       confirm the output shown on the device
sign [out-file]               sign the reviewed PSBT
cancel                        cancel the current device operation
seed | next | prev | hide     page through the seed words
wipe                          wipe the device
restore                       restore the device from a mnemonic
status                        show session state
help                          this text, plus the device help screen
exit                          close the session";

#[derive(Clone, Default)]
struct ReplHelper;

impl Helper for ReplHelper {}
impl Validator for ReplHelper {}
impl Highlighter for ReplHelper {}

impl Hinter for ReplHelper {
    type Hint = String;
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &ReadlineContext<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(completion_pairs(line, pos))
    }
}

pub async fn run(args: ConnectArgs) -> Result<()> {
    let connection = Connection::open(&args).await?;
    println!("Interactive session started. Type `help` for commands.");

    let mut editor = build_editor()?;
    let result = loop {
        match editor.readline("hww> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Secrets are prompted separately, so history only holds command words.
                let _ = editor.add_history_entry(line);

                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break Ok(());
                }
                if let Err(err) = handle_line(&connection, line).await {
                    eprintln!("Error: {err:#}");
                }
                if !connection.signer.is_connected() {
                    break Err(anyhow::anyhow!("device disconnected"));
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!();
                break Ok(());
            }
            Err(err) => break Err(err).context("failed to read interactive input"),
        }
    };

    connection.close().await?;
    result
}

fn build_editor() -> Result<Editor<ReplHelper, DefaultHistory>> {
    let mut editor = Editor::<ReplHelper, DefaultHistory>::new()
        .context("failed to initialize interactive editor")?;
    editor.set_helper(Some(ReplHelper));
    Ok(editor)
}

fn completion_pairs(line: &str, pos: usize) -> (usize, Vec<Pair>) {
    let prefix = &line[..pos];
    if prefix.trim_start().contains(char::is_whitespace) {
        return (pos, Vec::new());
    }

    let start = prefix.len() - prefix.trim_start().len();
    let token = &prefix[start..];
    let pairs = ROOT_COMMANDS
        .iter()
        .filter(|candidate| candidate.starts_with(token))
        .map(|candidate| Pair {
            display: candidate.to_string(),
            replacement: candidate.to_string(),
        })
        .collect();
    (start, pairs)
}

async fn handle_line(connection: &Connection, line: &str) -> Result<()> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = parts.split_first() else {
        return Ok(());
    };
    let signer = &connection.signer;
    debug!(command, "repl command");

    match command {
        "help" => {
            println!("{USAGE}");
            signer.help().await?;
        }
        "status" => print_status(connection),
        "login" => {
            connection.login().await?;
        }
        "logout" => signer.logout().await?,
        "password" => signer.prompt_password().await?,
        "xpub" => {
            let path = args
                .first()
                .copied()
                .unwrap_or_else(|| default_xpub_path(signer.config().network));
            let pending = signer.fetch_xpub(path).await?;
            let result = connection.wait(pending, "xpub").await?;
            if !result.is_empty() {
                println!("xpub: {}", result.xpub);
                println!("fingerprint: {}", result.fingerprint);
            }
        }
        "send" => {
            let [psbt, tx] = args else {
                bail!("usage: send <psbt-file> <tx-json-file>");
            };
            let (psbt_base64, transaction) = read_transaction(Path::new(psbt), Path::new(tx))?;
            let pending = signer.send_psbt(&psbt_base64, transaction).await?;
            if connection.wait(pending, "psbt acknowledgment").await? {
                print_flow(connection);
            }
        }
        "confirm" => {
            signer.confirm_next().await?;
            print_flow(connection);
        }
        "sign" => {
            let pending = signer.sign_psbt().await?;
            if let Some(signed) = connection.wait(pending, "signature").await?
                && let Some(out) = args.first()
            {
                std::fs::write(out, &signed.psbt)
                    .with_context(|| format!("writing signed psbt to {out}"))?;
                println!("Signed PSBT written to {out}");
            }
        }
        "cancel" => signer.cancel().await?,
        "seed" => signer.show_seed().await?,
        "next" => signer.next_seed_word().await?,
        "prev" => signer.prev_seed_word().await?,
        "hide" => signer.hide_seed(),
        "wipe" => {
            signer.prompt_wipe().await?;
            if !prompt_confirm("Wipe the device? This cannot be undone.")? {
                return Ok(());
            }
            let password = prompt_secret("Password: ")?;
            signer.wipe(password).await?;
        }
        "restore" => {
            signer.prompt_wipe().await?;
            let mnemonic = prompt_secret("Mnemonic: ")?;
            let password = prompt_secret("New password: ")?;
            let confirmed = prompt_secret("Repeat password: ")?;
            if *password != *confirmed {
                bail!("passwords do not match");
            }
            signer.restore(mnemonic, password).await?;
        }
        other => bail!("unknown command '{other}', try `help`"),
    }
    Ok(())
}

fn print_flow(connection: &Connection) {
    if let Some(flow) = connection.signer.signing_flow() {
        println!("{}", describe_flow(&flow));
    }
}

fn print_status(connection: &Connection) {
    let signer = &connection.signer;
    println!("phase: {:?}", signer.phase());
    println!("network: {}", signer.config().network);
    println!("secure: {}", signer.is_secure());
    println!("authenticated: {}", signer.is_authenticated());
    match signer.signing_flow() {
        Some(flow) => println!("signing: {}", describe_flow(&flow)),
        None => println!("signing: none"),
    }
}
