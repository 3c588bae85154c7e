use std::io::{self, Write};

use zeroize::Zeroizing;

pub fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Reads a password or mnemonic. The buffer is wiped when dropped.
pub fn prompt_secret(prompt: &str) -> io::Result<Zeroizing<String>> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut input = Zeroizing::new(String::new());
    io::stdin().read_line(&mut input)?;
    Ok(Zeroizing::new(input.trim().to_owned()))
}

pub fn prompt_confirm(prompt: &str) -> io::Result<bool> {
    let answer = prompt_line(&format!("{prompt} [y/N] "))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}
