use anyhow::{Result, bail};
use hww_signer::SignedPsbt;

use crate::cli::SignArgs;
use crate::commands::common::{Connection, describe_flow, read_transaction};
use crate::ui::prompt_confirm;

pub async fn run(args: SignArgs) -> Result<()> {
    let (psbt_base64, transaction) = read_transaction(&args.psbt, &args.tx)?;
    if transaction.outputs.is_empty() {
        bail!("{} lists no outputs to confirm", args.tx.display());
    }

    let connection = Connection::open(&args.connect).await?;
    let result = review_and_sign(&connection, &psbt_base64, transaction).await;
    connection.close().await?;

    let signed = result?;
    match &args.out {
        Some(out) => {
            std::fs::write(out, &signed.psbt)?;
            println!("Signed PSBT written to {}", out.display());
        }
        None => println!("{}", signed.psbt),
    }
    Ok(())
}

async fn review_and_sign(
    connection: &Connection,
    psbt_base64: &str,
    transaction: hww_signer::Transaction,
) -> Result<SignedPsbt> {
    let signer = &connection.signer;
    connection.login().await?;

    let pending = signer.send_psbt(psbt_base64, transaction).await?;
    if !connection.wait(pending, "psbt acknowledgment").await? {
        bail!("device rejected the psbt");
    }

    // Every output and then the fee must be accepted on the host before signing.
    loop {
        let Some(flow) = signer.signing_flow() else {
            bail!("signing was cancelled on the device");
        };
        let fee_step = flow.current_output().is_none();
        if !prompt_confirm(&describe_flow(&flow))? {
            signer.cancel().await?;
            bail!("signing cancelled");
        }
        if fee_step {
            break;
        }
        signer.confirm_next().await?;
    }

    let pending = signer.sign_psbt().await?;
    match connection.wait(pending, "signature").await? {
        Some(signed) => Ok(signed),
        None => bail!("no input signed, is the device holding the right seed?"),
    }
}
