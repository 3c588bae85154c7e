use anyhow::{Result, bail};

use crate::cli::XpubArgs;
use crate::commands::common::Connection;
use crate::config::default_xpub_path;

pub async fn run(args: XpubArgs) -> Result<()> {
    let path = args
        .path
        .clone()
        .unwrap_or_else(|| default_xpub_path(args.connect.network).to_owned());

    let connection = Connection::open(&args.connect).await?;
    let result = fetch(&connection, &path).await;
    connection.close().await?;

    let xpub = result?;
    println!("{}", xpub.xpub);
    println!("fingerprint: {}", xpub.fingerprint);
    Ok(())
}

async fn fetch(connection: &Connection, path: &str) -> Result<hww_signer::XpubResult> {
    connection.login().await?;
    let pending = connection.signer.fetch_xpub(path).await?;
    let xpub = connection.wait(pending, "xpub").await?;
    if xpub.is_empty() {
        bail!("device did not return an xpub for {path}");
    }
    Ok(xpub)
}
