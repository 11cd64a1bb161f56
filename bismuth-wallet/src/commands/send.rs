//! Send transaction command

use anyhow::{anyhow, Result};

use super::{print_error, print_success, prompt_confirm, Context};
use crate::keys::is_valid_address;
use crate::transaction::{format_amount, parse_amount, SendOutcome, TransactionPipeline};

/// Run the send command
pub async fn run(
    ctx: &Context,
    recipient: &str,
    amount: &str,
    operation: &str,
    memo: &str,
    skip_confirm: bool,
) -> Result<()> {
    if !is_valid_address(recipient) {
        return Err(anyhow!("Invalid recipient address: {}", recipient));
    }

    let units = parse_amount(amount)?;
    TransactionPipeline::check_policy(recipient, memo)?;

    let mut client = ctx.open_unlocked()?;
    let sender = client
        .current_address()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No address selected"))?;

    // Measure clock drift before stamping
    if let Err(e) = client.status().await {
        tracing::warn!("Could not read server status: {}", e);
    }

    println!();
    println!("Transaction details:");
    println!("  From:      {}", sender);
    println!("  Recipient: {}", recipient);
    println!("  Amount:    {} BIS", format_amount(units));
    if !operation.is_empty() {
        println!("  Operation: {}", operation);
    }
    if !memo.is_empty() {
        println!("  Memo:      {}", memo);
    }

    if !skip_confirm {
        println!();
        if !prompt_confirm("Send this transaction?")? {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!();
    println!("Submitting transaction...");
    match client.send(recipient, units, operation, memo).await? {
        SendOutcome::Accepted { txid } => {
            println!();
            print_success("Transaction submitted!");
            println!("  Transaction ID: {}", txid);
        }
        SendOutcome::Failed { reason } => {
            print_error(&format!("Transaction failed: {}", reason));
        }
    }

    Ok(())
}
