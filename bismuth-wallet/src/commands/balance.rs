//! Balance check command

use anyhow::Result;

use super::{print_success, print_warning, Context};
use crate::client::Balance;

/// Run the balance command
pub async fn run(ctx: &Context, all: bool) -> Result<()> {
    let mut client = ctx.open_unlocked()?;

    println!();
    println!("Connecting to network...");

    let balance = if all {
        client.global_balance().await?
    } else {
        client.balance().await?
    };

    println!();
    match balance {
        Balance::Amount(_) if all => {
            print_success(&format!("Balance (all addresses): {} BIS", balance))
        }
        Balance::Amount(_) => print_success(&format!("Balance: {} BIS", balance)),
        Balance::Unavailable => print_warning("Balance unavailable, no server answered."),
    }
    if let Some(address) = client.current_address() {
        println!("Address: {}", address);
    }
    println!();

    Ok(())
}
