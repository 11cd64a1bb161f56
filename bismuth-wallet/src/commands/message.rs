//! Message signing and encryption commands

use anyhow::Result;

use super::Context;

/// Sign `message` with the selected address
pub fn sign(ctx: &Context, message: &str) -> Result<()> {
    let client = ctx.open_unlocked()?;
    let signature = client.sign_message(message)?;

    println!("{}", signature);
    Ok(())
}

/// Encrypt `message` for `recipient`
pub async fn encrypt(ctx: &Context, recipient: &str, message: &str) -> Result<()> {
    let mut client = ctx.open_unlocked()?;
    let ciphertext = client.encrypt_message(message, recipient).await?;

    println!("{}", ciphertext);
    Ok(())
}

/// Decrypt a message sent to the selected address
pub fn decrypt(ctx: &Context, ciphertext: &str) -> Result<()> {
    let client = ctx.open_unlocked()?;
    let message = client.decrypt_message(ciphertext)?;

    println!("{}", message);
    Ok(())
}
