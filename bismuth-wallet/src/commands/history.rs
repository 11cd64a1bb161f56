//! Transaction history command

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::Context;
use crate::transaction::{format_amount, TransactionEntry};

/// Run the history command
pub async fn run(ctx: &Context, limit: usize, offset: usize) -> Result<()> {
    let mut client = ctx.open_unlocked()?;
    let Some(address) = client.current_address().map(str::to_string) else {
        anyhow::bail!("No address selected");
    };

    let entries = client.latest_transactions(limit, offset).await?;

    println!();
    if entries.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<20} {:>10} {:>18} {:<10}  {}",
        "Time", "Block", "Amount", "Direction", "Counterparty"
    );
    println!("{}", "-".repeat(120));
    for entry in &entries {
        print_entry(&address, entry);
    }
    println!();
    println!("Showing {} transactions", entries.len());

    Ok(())
}

fn print_entry(address: &str, entry: &TransactionEntry) {
    let time = DateTime::<Utc>::from_timestamp(entry.timestamp as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    let (direction, counterparty) = if entry.recipient == address {
        ("in", entry.address.as_str())
    } else {
        ("out", entry.recipient.as_str())
    };

    let block = if entry.block_height < 0 {
        "mempool".to_string()
    } else {
        entry.block_height.to_string()
    };

    println!(
        "{:<20} {:>10} {:>18} {:<10}  {}",
        time,
        block,
        format_amount(entry.amount),
        direction,
        counterparty
    );
    if !entry.openfield.is_empty() {
        println!("{:<20} memo: {}", "", entry.openfield);
    }
}
