//! Address management commands

use anyhow::Result;
use std::path::Path;

use super::{print_success, print_warning, prompt_password, Context};

/// List the wallet's addresses, selected first
pub fn list(ctx: &Context) -> Result<()> {
    let client = ctx.open_unlocked()?;
    let info = client.wallet_info();

    println!();
    println!("Wallet: {}", info.file.display());
    if info.encrypted {
        println!("Encrypted: yes");
    }
    println!();

    for record in client.addresses().iter() {
        let marker = if Some(record.address.as_str()) == client.current_address() {
            "*"
        } else {
            " "
        };
        if record.label.is_empty() {
            println!("{} {}", marker, record.address);
        } else {
            println!("{} {}  ({})", marker, record.address, record.label);
        }
    }
    println!();

    Ok(())
}

/// Add an address, deterministic when a password is given
pub fn new(ctx: &Context, label: &str, deterministic: bool, salt: &str) -> Result<()> {
    let mut client = ctx.open_unlocked()?;

    let password = if deterministic {
        prompt_password("Enter key derivation password: ")?
    } else {
        String::new()
    };

    let address = client.new_address(label, &password, salt)?;
    print_success(&format!("New address: {}", address));
    Ok(())
}

/// Make `address` the selected one
pub fn select(ctx: &Context, address: &str) -> Result<()> {
    let mut client = ctx.open_unlocked()?;
    client.set_address(address)?;

    print_success(&format!("Selected {}", address));
    if client.wallet_info().encrypted {
        print_warning("The selection of an encrypted wallet is not saved.");
    }
    Ok(())
}

/// Change the label of `address`
pub fn label(ctx: &Context, address: &str, label: &str) -> Result<()> {
    let mut client = ctx.open_unlocked()?;
    client.set_label(address, label)?;

    print_success("Label updated");
    Ok(())
}

/// Import a legacy key file
pub fn import(ctx: &Context, path: &Path, label: &str, encrypted: bool) -> Result<()> {
    let mut client = ctx.open_unlocked()?;

    let source_password = if encrypted {
        prompt_password("Enter key file password: ")?
    } else {
        String::new()
    };

    let address = client.import_key_file(path, label, &source_password)?;
    print_success(&format!("Imported {}", address));
    Ok(())
}
