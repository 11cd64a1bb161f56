//! Alias lookup commands

use anyhow::Result;

use super::Context;

/// Print the alias of each address
pub async fn resolve(ctx: &Context, addresses: &[String]) -> Result<()> {
    let mut client = ctx.open_unlocked()?;
    let aliases = client.resolve_aliases(addresses).await?;

    for (address, alias) in &aliases {
        if alias == address {
            println!("{}  (no alias)", address);
        } else {
            println!("{}  {}", address, alias);
        }
    }
    Ok(())
}

/// Is `alias` taken
pub async fn check(ctx: &Context, alias: &str) -> Result<()> {
    let mut client = ctx.open_unlocked()?;

    if client.alias_exists(alias).await? {
        println!("Alias {} is registered", alias);
    } else {
        println!("Alias {} is free", alias);
    }
    Ok(())
}
