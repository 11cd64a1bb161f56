//! Wallet encryption and spend protection commands

use anyhow::Result;

use super::{print_success, print_warning, prompt_new_password, prompt_password, Context};

/// Encrypt a plaintext wallet with a new master password
pub fn encrypt(ctx: &Context) -> Result<()> {
    let mut client = ctx.open()?;
    if client.wallet_info().encrypted {
        print_warning("Wallet is already encrypted.");
        return Ok(());
    }

    println!("Choose a master password. It cannot be recovered if lost.");
    let password = prompt_new_password("Enter new password: ")?;
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    client.encrypt_wallet(&password)?;
    print_success("Wallet encrypted");
    Ok(())
}

/// Set or clear the spend protection
pub fn spend(ctx: &Context, kind: Option<&str>, value: &str) -> Result<()> {
    let mut client = ctx.open()?;

    let password = if client.wallet_info().encrypted {
        let password = prompt_password("Enter wallet password: ")?;
        client.unlock(&password)?;
        password
    } else {
        String::new()
    };

    client.set_spend(kind, value, &password)?;
    match kind {
        Some(kind) if kind != "None" => print_success(&format!("Spend protection set: {}", kind)),
        _ => print_success("Spend protection cleared"),
    }
    Ok(())
}
